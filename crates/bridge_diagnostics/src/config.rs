//! `AppConfig`: queue capacities, frame-skip reporting, shutdown timing
//! and the storage root, loaded from a JSON file under the platform
//! config directory and overridable by CLI flags, file first then
//! flags.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub fn project_directories() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "scenebridge", "ScriptBridge")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub render_command_queue_capacity: usize,
    pub callback_queue_capacity: usize,
    /// Frame-skip warnings are rate-limited to every Nth occurrence.
    pub frame_skip_report_interval: u64,
    /// Worker shutdown poll cadence and ceiling, forwarded into
    /// `bridge_script::ScriptWorkerConfig` at startup.
    pub shutdown_poll_interval_ms: u64,
    pub shutdown_poll_ceiling_secs: u64,
    pub storage_root: PathBuf,
    /// Host window viewport, in pixels, that `"screen"` camera creation
    /// reads to size its orthographic bounds. There is
    /// no real window here (window creation is a non-goal), so this is
    /// the value a host would otherwise report at startup.
    pub viewport_width: f32,
    pub viewport_height: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            render_command_queue_capacity: 256,
            callback_queue_capacity: 256,
            frame_skip_report_interval: 60,
            shutdown_poll_interval_ms: 10,
            shutdown_poll_ceiling_secs: 5,
            storage_root: default_storage_root(),
            viewport_width: 1280.0,
            viewport_height: 720.0,
        }
    }
}

impl AppConfig {
    pub fn shutdown_poll_interval(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_interval_ms)
    }

    pub fn shutdown_poll_ceiling(&self) -> Duration {
        Duration::from_secs(self.shutdown_poll_ceiling_secs)
    }

    pub fn viewport_px(&self) -> (f32, f32) {
        (self.viewport_width, self.viewport_height)
    }
}

fn default_storage_root() -> PathBuf {
    project_directories()
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn config_file_path() -> Option<PathBuf> {
    project_directories().map(|dirs| dirs.config_dir().join("config.json"))
}

fn read_base_config() -> AppConfig {
    let Some(path) = config_file_path() else {
        return AppConfig::default();
    };
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_slice(&bytes) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(?path, "failed to parse config.json: {e}");
            AppConfig::default()
        }
    }
}

/// Merges the on-disk config with CLI overrides (any flag absent or
/// unparsable falls back to the file's value, then the default).
pub fn load_config(args: &mut pico_args::Arguments) -> AppConfig {
    let base = read_base_config();

    AppConfig {
        render_command_queue_capacity: args
            .value_from_str("--command-queue-capacity")
            .ok()
            .unwrap_or(base.render_command_queue_capacity),
        callback_queue_capacity: args
            .value_from_str("--callback-queue-capacity")
            .ok()
            .unwrap_or(base.callback_queue_capacity),
        frame_skip_report_interval: args
            .value_from_str("--frame-skip-report-interval")
            .ok()
            .unwrap_or(base.frame_skip_report_interval),
        shutdown_poll_interval_ms: args
            .value_from_str("--shutdown-poll-interval-ms")
            .ok()
            .unwrap_or(base.shutdown_poll_interval_ms),
        shutdown_poll_ceiling_secs: args
            .value_from_str("--shutdown-poll-ceiling-secs")
            .ok()
            .unwrap_or(base.shutdown_poll_ceiling_secs),
        storage_root: args
            .value_from_str::<_, String>("--storage-root")
            .ok()
            .map(PathBuf::from)
            .unwrap_or(base.storage_root),
        viewport_width: args
            .value_from_str("--viewport-width")
            .ok()
            .unwrap_or(base.viewport_width),
        viewport_height: args
            .value_from_str("--viewport-height")
            .ok()
            .unwrap_or(base.viewport_height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let config = AppConfig::default();
        assert_eq!(config.shutdown_poll_interval().as_millis() as u64, config.shutdown_poll_interval_ms);
        assert_eq!(config.shutdown_poll_ceiling().as_secs(), config.shutdown_poll_ceiling_secs);
    }

    #[test]
    fn cli_flags_override_defaults() {
        let mut args = pico_args::Arguments::from_vec(vec![
            "--command-queue-capacity".into(),
            "512".into(),
        ]);
        let config = load_config(&mut args);
        assert_eq!(config.render_command_queue_capacity, 512);
    }
}
