//! The bridge's ambient stack: session log file setup (`bevy::log`
//! plus `tracing-appender`), `AppConfig` loading, and the bridge's own
//! `bevy` diagnostics — the logging/config/observability layer that
//! sits alongside the scripting and rendering machinery regardless of
//! which scene features are in or out of scope.

mod config;
mod diagnostics;
mod logging;

pub use config::{load_config, project_directories, AppConfig};
pub use diagnostics::{
    BridgeDiagnosticsPlugin, COMMANDS_DISPATCHED, FRAME_SKIP_COUNT, FRAME_SKIP_MAX_STREAK,
    SCRIPT_EXCEPTION_COUNT,
};
pub use logging::{default_session_log_path, init_session_log, session_log_path, LoggingPlugin};
