//! Session log file plumbing: a single rotating-per-run log file under
//! the platform data directory, written through `tracing-appender`'s
//! non-blocking writer and primed with `log_panics::init()` so a panic
//! on either thread lands in the same file instead of only on stderr.
//!
//! `bevy::log::LogPlugin::custom_layer` is a plain `fn` pointer, not a
//! closure — it can't capture the log path, so the path is stashed in
//! a `static OnceLock<PathBuf>` and read back from inside the closure.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use bevy::app::{App, Plugin};
use bevy::log::LogPlugin;

static SESSION_LOG: OnceLock<PathBuf> = OnceLock::new();

/// Where the session log for `session_time` lives: a `{timestamp}.log`
/// file under the platform's `data_local_dir()`.
pub fn default_session_log_path(session_time: chrono::DateTime<chrono::Utc>) -> anyhow::Result<PathBuf> {
    let dirs = crate::config::project_directories()
        .ok_or_else(|| anyhow::anyhow!("could not determine platform project directories"))?;
    Ok(dirs
        .data_local_dir()
        .join(format!("{}.log", session_time.format("%Y%m%d-%H%M%S"))))
}

/// Creates the log file and files it into the process-wide static the
/// `LoggingPlugin` reads from. Must run exactly once, before
/// `LoggingPlugin` is added to the `App`.
pub fn init_session_log(path: PathBuf) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::File::create(&path)?;
    SESSION_LOG
        .set(path)
        .map_err(|_| anyhow::anyhow!("session log already initialized"))?;
    log_panics::init();
    Ok(())
}

pub fn session_log_path() -> Option<&'static Path> {
    SESSION_LOG.get().map(PathBuf::as_path)
}

/// Installs `bevy::log::LogPlugin` with a custom file-writing layer.
/// Requires [`init_session_log`] to have already run.
pub struct LoggingPlugin;

impl Plugin for LoggingPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(LogPlugin {
            filter: "wgpu=error,naga=error,deno_core=warn".to_string(),
            custom_layer: |_| {
                let path = SESSION_LOG
                    .get()
                    .expect("init_session_log must run before LoggingPlugin is added");
                let (non_blocking, guard) = tracing_appender::non_blocking(
                    std::fs::File::options()
                        .write(true)
                        .open(path)
                        .expect("failed to open session log file"),
                );
                // leaked deliberately: the writer must outlive the App,
                // and there is exactly one of these per process.
                Box::leak(guard.into());
                Some(Box::new(
                    bevy::log::tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                ))
            },
            ..Default::default()
        });
    }
}
