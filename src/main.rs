//! Process entry point for the `scenebridge` binary.
//!
//! Lifecycle is `construct -> startup -> shutdown -> destruct`,
//! invoked in that order and reversed on teardown, the way a single
//! `App` instance is built for the whole process:
//! construct reads config/CLI and wires up the process-scoped
//! singletons (snapshot stores, queues, facades); startup spawns the
//! `ScriptWorker` thread and assembles the `bevy` `App`; shutdown is
//! cooperative and runs inside `ScriptWorker`'s `Drop`, triggered
//! here by an `AppExit` that unwinds `App::run`; destruct is whatever
//! drops fall out of scope after `run()` returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bevy::app::AppExit;
use bevy::prelude::*;
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use bridge_diagnostics::{
    default_session_log_path, init_session_log, load_config, AppConfig, LoggingPlugin,
};
use bridge_dispatch::CommandDispatcher;
use bridge_facade::{new_shared_callback_allocator, CameraFacade, EntityFacade};
use bridge_queue::{CallbackQueue, RenderCommandQueue};
use bridge_render::{build_app, BridgeChannels, NoopPresenter, RenderLoopPlugin};
use bridge_script::{ScriptWorker, ScriptWorkerConfig, ScriptWorkerDeps};
use bridge_snapshot::{CameraSnapshotStore, EntitySnapshotStore};

const DEFAULT_SCRIPT: &str = include_str!("../demos/hello_scene.js");

/// Reads the scene entry point from `--script <path>`, or falls back to
/// the bundled demo. Reading the host's own entry-point file is not the
/// script-exposed file I/O — the script itself never sees a
/// filesystem API.
fn load_script(args: &mut pico_args::Arguments) -> anyhow::Result<(String, String)> {
    match args.opt_value_from_str::<_, String>("--script")? {
        Some(path) => {
            let source = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("failed to read script {path}: {e}"))?;
            Ok((path, source))
        }
        None => Ok(("<demo>".to_string(), DEFAULT_SCRIPT.to_string())),
    }
}

/// Shared with a `ctrlc` handler: a process-wide quitting flag observed
/// by the render loop, standing in for the windowing layer's close
/// signal and a scripted "quit" event, both external collaborators
/// this crate doesn't own.
#[derive(Resource, Clone)]
struct QuitFlag(Arc<AtomicBool>);

fn poll_quit_flag(flag: Res<QuitFlag>, mut exit: EventWriter<AppExit>) {
    if flag.0.load(Ordering::Relaxed) {
        exit.write(AppExit::Success);
    }
}

fn main() -> anyhow::Result<()> {
    // ---- construct ----
    let session_time = chrono::Utc::now();
    let log_path = default_session_log_path(session_time)?;
    init_session_log(log_path.clone())?;
    println!("scenebridge session log: {}", log_path.display());

    let mut args = pico_args::Arguments::from_env();
    let config: AppConfig = load_config(&mut args);
    let (script_name, script_source) = load_script(&mut args)?;
    let remaining = args.finish();
    if !remaining.is_empty() {
        anyhow::bail!(
            "unrecognized arguments: {}",
            remaining
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(" ")
        );
    }

    let entities = Arc::new(EntitySnapshotStore::new(true));
    let cameras = Arc::new(CameraSnapshotStore::new(true));
    let command_queue = Arc::new(RenderCommandQueue::new(config.render_command_queue_capacity));
    let callback_queue = Arc::new(CallbackQueue::new(config.callback_queue_capacity));
    let callback_ids = new_shared_callback_allocator();
    let entity_facade = Arc::new(EntityFacade::new(
        command_queue.clone(),
        entities.clone(),
        callback_ids.clone(),
    ));
    let camera_facade = Arc::new(CameraFacade::new(
        command_queue.clone(),
        cameras.clone(),
        callback_ids,
    ));

    let channels = BridgeChannels {
        entities: entities.clone(),
        cameras: cameras.clone(),
        command_queue,
        callback_queue,
        entity_facade: entity_facade.clone(),
        camera_facade: camera_facade.clone(),
    };

    let dispatcher = CommandDispatcher::new(entities, cameras, config.viewport_px());

    // ---- startup ----
    let worker = ScriptWorker::spawn(
        ScriptWorkerConfig {
            script_name,
            script_source,
            shutdown_poll_interval: config.shutdown_poll_interval(),
            shutdown_poll_ceiling: config.shutdown_poll_ceiling(),
        },
        ScriptWorkerDeps {
            entity_facade,
            camera_facade,
            callbacks: channels.callback_queue.clone(),
        },
    );

    let quitting = Arc::new(AtomicBool::new(false));
    let handler_flag = quitting.clone();
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::Relaxed))
        .map_err(|e| anyhow::anyhow!("failed to install Ctrl-C handler: {e}"))?;

    let mut app = build_app(RenderLoopPlugin {
        channels,
        dispatcher,
        worker,
        presenter: Box::new(NoopPresenter),
    });
    app.add_plugins(LoggingPlugin);
    app.insert_resource(config);
    app.insert_resource(QuitFlag(quitting));
    app.add_systems(Update, poll_quit_flag);

    info!("scenebridge starting");

    // ---- run / shutdown ----
    // `AppExit` unwinds `App::run`, which drops the `RenderLoopState`
    // resource and with it the `ScriptWorker`; its `Drop` impl runs a
    // cooperative shutdown poll before the process ever reaches
    // `destruct` below.
    app.run();

    // ---- destruct ----
    info!("scenebridge stopped");
    Ok(())
}
