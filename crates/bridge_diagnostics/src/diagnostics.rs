//! Frame-skip and script-exception counters exposed as `bevy`
//! `Diagnostic`s, alongside `FrameTimeDiagnosticsPlugin` the way the
//! teacher surfaces its own counters through `LogDiagnosticsPlugin`.
//! This is observability for the bridge itself — not the renderer's
//! debug-draw system, which stays out of scope.

use bevy::app::{App, Plugin};
use bevy::diagnostic::{Diagnostic, DiagnosticPath, RegisterDiagnostic};

pub const FRAME_SKIP_COUNT: DiagnosticPath = DiagnosticPath::const_new("bridge/frame_skip_count");
pub const FRAME_SKIP_MAX_STREAK: DiagnosticPath =
    DiagnosticPath::const_new("bridge/frame_skip_max_streak");
pub const COMMANDS_DISPATCHED: DiagnosticPath =
    DiagnosticPath::const_new("bridge/commands_dispatched");
pub const SCRIPT_EXCEPTION_COUNT: DiagnosticPath =
    DiagnosticPath::const_new("bridge/script_exception_count");

/// Registers the bridge's own diagnostics. `RenderLoop` is responsible
/// for calling `Diagnostics::add_measurement` against these paths once
/// per frame; this plugin only declares them.
pub struct BridgeDiagnosticsPlugin;

impl Plugin for BridgeDiagnosticsPlugin {
    fn build(&self, app: &mut App) {
        app.register_diagnostic(Diagnostic::new(FRAME_SKIP_COUNT).with_suffix("frames"));
        app.register_diagnostic(Diagnostic::new(FRAME_SKIP_MAX_STREAK).with_suffix("frames"));
        app.register_diagnostic(Diagnostic::new(COMMANDS_DISPATCHED).with_suffix("commands"));
        app.register_diagnostic(Diagnostic::new(SCRIPT_EXCEPTION_COUNT).with_suffix("exceptions"));
    }
}
