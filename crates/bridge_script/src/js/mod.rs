//! Worker thread body: builds the `deno_core` isolate, runs the
//! frame-start/frame-complete handshake that drives the main loop,
//! and drains the native→script `CallbackQueue` once per frame,
//! invoking each script function handle under a fresh `TryCatch`
//! before releasing it at shutdown, below.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use deno_core::{v8, Extension, JsRuntime, RuntimeOptions};
use tracing::error;

use bridge_queue::CallbackQueue;

use crate::{ScriptWorkerConfig, ScriptWorkerDeps, SharedSignal};

mod ops;

fn create_runtime() -> JsRuntime {
    let ext = Extension {
        name: "scenebridge",
        ops: ops::ops().into(),
        ..Default::default()
    };
    JsRuntime::new(RuntimeOptions {
        extensions: vec![ext],
        ..Default::default()
    })
}

pub(crate) fn run_worker(
    config: ScriptWorkerConfig,
    deps: ScriptWorkerDeps,
    signal: Arc<SharedSignal>,
    exception_count: Arc<AtomicU64>,
    total_frames: Arc<AtomicU64>,
) {
    let mut runtime = create_runtime();

    {
        let op_state = runtime.op_state();
        let mut op_state = op_state.borrow_mut();
        op_state.put(deps.entity_facade);
        op_state.put(deps.camera_facade);
        op_state.put(ops::CallbackRegistry::new());
    }

    // Installs the friendly API names before the scene script runs;
    // a failure here is a build-time bug in the bootstrap itself, not a
    // recoverable scene fault, so it's the one script load error that
    // panics rather than just being logged.
    runtime
        .execute_script("<bootstrap>", include_str!("bootstrap.js"))
        .expect("scripting bridge bootstrap failed to load");

    if let Err(e) = runtime.execute_script("<scene>", config.script_source) {
        error!(script = %config.script_name, "script load error: {e}");
        return;
    }

    let mut last_instant = Instant::now();
    loop {
        let mut guard = signal.state.lock().unwrap();
        while !guard.frame_requested && !guard.shutdown_requested {
            guard = signal.condvar.wait(guard).unwrap();
        }
        if guard.shutdown_requested {
            break;
        }
        guard.frame_requested = false;
        guard.frame_complete = false;
        drop(guard);

        let now = Instant::now();
        let dt = now.duration_since(last_instant).as_secs_f64();
        last_instant = now;

        invoke_phase(&mut runtime, "update", &[dt], &exception_count);
        invoke_phase(&mut runtime, "render", &[], &exception_count);
        drain_callbacks(&mut runtime, &deps.callbacks);

        let mut guard = signal.state.lock().unwrap();
        guard.frame_complete = true;
        signal.condvar.notify_all();
        drop(guard);

        total_frames.fetch_add(1, Ordering::Relaxed);
    }

    // release every persistent handle before the isolate tears down.
    runtime
        .op_state()
        .borrow_mut()
        .try_take::<ops::CallbackRegistry>();
}

/// Looks up `phase` (`"update"` or `"render"`) as a global function and
/// calls it under a fresh exception guard. A script that never defines
/// the phase is not an error — the frame simply does nothing for it.
fn invoke_phase(runtime: &mut JsRuntime, phase: &str, args: &[f64], exception_count: &AtomicU64) {
    let scope = &mut runtime.handle_scope();
    let tc_scope = &mut v8::TryCatch::new(scope);
    let context = tc_scope.get_current_context();
    let global = context.global(tc_scope);

    let Some(key) = v8::String::new(tc_scope, phase) else {
        return;
    };
    let Some(value) = global.get(tc_scope, key.into()) else {
        return;
    };
    let Ok(function) = v8::Local::<v8::Function>::try_from(value) else {
        return;
    };

    let undefined: v8::Local<v8::Value> = v8::undefined(tc_scope).into();
    let js_args: Vec<v8::Local<v8::Value>> = args
        .iter()
        .map(|n| v8::Number::new(tc_scope, *n).into())
        .collect();

    function.call(tc_scope, undefined, &js_args);

    if tc_scope.has_caught() {
        exception_count.fetch_add(1, Ordering::Relaxed);
        report_exception(tc_scope, phase);
        tc_scope.reset();
    }
}

fn drain_callbacks(runtime: &mut JsRuntime, callbacks: &CallbackQueue) {
    for token in callbacks.drain() {
        let handle = runtime
            .op_state()
            .borrow_mut()
            .borrow_mut::<ops::CallbackRegistry>()
            .remove(&token.callback.raw());
        let Some(callback) = handle else {
            continue;
        };
        invoke_callback(runtime, callback, token.result_id);
    }
}

fn invoke_callback(runtime: &mut JsRuntime, callback: v8::Global<v8::Function>, result_id: u64) {
    let scope = &mut runtime.handle_scope();
    let tc_scope = &mut v8::TryCatch::new(scope);
    let function = v8::Local::new(tc_scope, callback);
    let undefined: v8::Local<v8::Value> = v8::undefined(tc_scope).into();
    let arg: v8::Local<v8::Value> = v8::Number::new(tc_scope, result_id as f64).into();

    function.call(tc_scope, undefined, &[arg]);

    if tc_scope.has_caught() {
        report_exception(tc_scope, "callback");
        tc_scope.reset();
    }
}

fn report_exception(tc_scope: &mut v8::TryCatch<v8::HandleScope>, phase: &str) {
    let message = tc_scope.message();
    let (line, column, source_line) = match message {
        Some(message) => (
            message.get_line_number(tc_scope).unwrap_or(0),
            message.get_start_column(),
            message
                .get_source_line(tc_scope)
                .map(|s| s.to_rust_string_lossy(tc_scope))
                .unwrap_or_default(),
        ),
        None => (0, 0, String::new()),
    };
    let text = tc_scope
        .exception()
        .map(|e| e.to_rust_string_lossy(tc_scope))
        .unwrap_or_default();
    let stack = tc_scope
        .stack_trace()
        .map(|s| s.to_rust_string_lossy(tc_scope));

    error!(phase, line, column, source_line, stack = ?stack, "script exception: {text}");
}
