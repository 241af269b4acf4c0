//! `RenderLoop`: the render thread's per-frame driver, expressed
//! as a fixed-cadence, headless `bevy` `App` — no window or GPU
//! pipeline, just `ScheduleRunnerPlugin` driving one system that owns
//! the swap/skip/drain/present ordering.

use std::sync::Arc;
use std::time::Duration;

use bevy::app::{App, PluginGroup, ScheduleRunnerPlugin, Update};
use bevy::diagnostic::{Diagnostics, FrameTimeDiagnosticsPlugin};
use bevy::prelude::{MinimalPlugins, ResMut, Resource};
use tracing::warn;

use bridge_diagnostics::{
    BridgeDiagnosticsPlugin, COMMANDS_DISPATCHED, FRAME_SKIP_COUNT, FRAME_SKIP_MAX_STREAK,
    SCRIPT_EXCEPTION_COUNT,
};
use bridge_dispatch::CommandDispatcher;
pub use bridge_dispatch::{MeshHandle, Vertex, VertexList};
use bridge_facade::{CameraFacade, EntityFacade};
use bridge_queue::{CallbackQueue, RenderCommandQueue};
use bridge_script::ScriptWorker;
use bridge_snapshot::{CameraSnapshotStore, EntitySnapshotStore};
use bridge_state::CameraBinding;

mod present;
pub use present::{DrawItem, FramePresenter, NoopPresenter};

/// Target frame period.
pub const TARGET_FRAME_PERIOD: Duration = Duration::from_nanos(1_000_000_000 / 60);

/// Frame-skip warnings are rate-limited to every Nth occurrence.
const SKIP_LOG_INTERVAL: u64 = 60;

/// The channel/store handles both threads share, bundled so the
/// process entry point only has to construct them once.
#[derive(Clone)]
pub struct BridgeChannels {
    pub entities: Arc<EntitySnapshotStore>,
    pub cameras: Arc<CameraSnapshotStore>,
    pub command_queue: Arc<RenderCommandQueue>,
    pub callback_queue: Arc<CallbackQueue>,
    pub entity_facade: Arc<EntityFacade>,
    pub camera_facade: Arc<CameraFacade>,
}

#[derive(Resource)]
struct RenderLoopState {
    channels: BridgeChannels,
    dispatcher: CommandDispatcher,
    worker: ScriptWorker,
    presenter: Box<dyn FramePresenter>,
    skip_count: u64,
    current_skip_streak: u64,
    max_skip_streak: u64,
}

/// Everything `RenderLoop` needs to own for the process's lifetime.
/// Consumed by [`install`](RenderLoopPlugin::install) rather than
/// implementing bevy's `Plugin` trait directly, since a `ScriptWorker`
/// and a boxed presenter aren't `Clone` the way ordinary plugin structs
/// are expected to be.
pub struct RenderLoopPlugin {
    pub channels: BridgeChannels,
    pub dispatcher: CommandDispatcher,
    pub worker: ScriptWorker,
    pub presenter: Box<dyn FramePresenter>,
}

impl RenderLoopPlugin {
    pub fn install(self, app: &mut App) {
        app.insert_resource(RenderLoopState {
            channels: self.channels,
            dispatcher: self.dispatcher,
            worker: self.worker,
            presenter: self.presenter,
            skip_count: 0,
            current_skip_streak: 0,
            max_skip_streak: 0,
        });
        app.add_plugins(BridgeDiagnosticsPlugin);
        app.add_systems(Update, drive_render_loop);
    }
}

/// Assembles the headless `App` that hosts `RenderLoop`: a fixed 60 Hz
/// schedule runner plus frame-time and bridge diagnostics, added
/// explicitly rather than pulled in by a default plugin group.
pub fn build_app(render_loop: RenderLoopPlugin) -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(TARGET_FRAME_PERIOD)));
    app.add_plugins(FrameTimeDiagnosticsPlugin::default());
    render_loop.install(&mut app);
    app
}

fn drive_render_loop(mut state: ResMut<RenderLoopState>, mut diagnostics: Diagnostics) {
    let state = &mut *state;

    // Step 1: drain render-thread command dispatch.
    let dispatched = state.dispatcher.dispatch_all(
        &state.channels.command_queue,
        &state.channels.entity_facade,
        &state.channels.camera_facade,
    );
    diagnostics.add_measurement(&COMMANDS_DISPATCHED, || dispatched as f64);

    // Step 2: swap-or-skip is the load-bearing invariant — this
    // thread never blocks on the worker either way.
    if state.worker.is_frame_complete() {
        state.channels.entities.swap();
        state.channels.cameras.swap();
        state.worker.trigger_frame();
        state.current_skip_streak = 0;
    } else {
        state.skip_count += 1;
        state.current_skip_streak += 1;
        state.max_skip_streak = state.max_skip_streak.max(state.current_skip_streak);
        if state.skip_count % SKIP_LOG_INTERVAL == 0 {
            warn!(
                skip_count = state.skip_count,
                streak = state.current_skip_streak,
                "render loop skipped the worker's frame again"
            );
        }
    }
    diagnostics.add_measurement(&FRAME_SKIP_COUNT, || state.skip_count as f64);
    diagnostics.add_measurement(&FRAME_SKIP_MAX_STREAK, || state.max_skip_streak as f64);
    diagnostics.add_measurement(&SCRIPT_EXCEPTION_COUNT, || {
        state.worker.exception_count() as f64
    });

    // Step 3: drain pending completion tokens from both facades.
    state
        .channels
        .entity_facade
        .execute_pending_callbacks(&state.channels.callback_queue);
    state
        .channels
        .camera_facade
        .execute_pending_callbacks(&state.channels.callback_queue);

    // Step 4: render world entities through the active world
    // camera, then screen entities through the active screen camera,
    // then hand off to whatever presents overlays/console.
    present_frame(
        &state.channels.entities,
        &state.channels.cameras,
        &state.dispatcher,
        state.presenter.as_mut(),
    );
    state.presenter.present_overlay();
}

/// The actual per-frame draw-list assembly, factored out of
/// `drive_render_loop` so it can be exercised without a live
/// `ScriptWorker` or a running `App`. Two independent passes, per
/// §4.2 step 4: world entities through the active world camera, then
/// screen entities through the active screen camera. Either pass is
/// skipped on its own if its camera isn't found — a screen-bound UI
/// overlay must still render while the active (world) camera is the
/// only one committed, and vice versa.
fn present_frame(
    entities: &EntitySnapshotStore,
    cameras: &CameraSnapshotStore,
    dispatcher: &CommandDispatcher,
    presenter: &mut dyn FramePresenter,
) {
    let front = entities.front_snapshot();
    let resources = dispatcher.resources().lock().unwrap();

    let items_for = |binding: CameraBinding| -> Vec<DrawItem> {
        front
            .iter()
            .filter(|(_, e)| e.active && e.camera_binding == binding)
            .filter_map(|(id, e)| {
                let handle = resources.handle_for(*id)?;
                let vertices = resources.vertices(handle)?;
                Some(DrawItem {
                    entity: *id,
                    vertices,
                    position: e.position,
                    orientation: e.orientation,
                    radius: e.radius,
                    color: e.color,
                })
            })
            .collect()
    };

    if let Some((_, derived)) = cameras.active_world_camera() {
        let items = items_for(CameraBinding::World);
        presenter.present_world(derived, &items);
    }
    if let Some((_, derived)) = cameras.active_screen_camera() {
        let items = items_for(CameraBinding::Screen);
        presenter.present_screen(derived, &items);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::prelude::Vec3;
    use bridge_facade::new_shared_callback_allocator;
    use bridge_ids::{CameraId, EntityId};
    use bridge_state::{CameraBinding, CameraKind, CameraKindRequest, CameraState, EntityState, Orientation, Rgba8};

    #[derive(Default)]
    struct CountingPresenter {
        world_calls: usize,
        screen_calls: usize,
        world_item_count: usize,
        screen_item_count: usize,
    }

    impl FramePresenter for CountingPresenter {
        fn present_world(&mut self, _camera: bridge_snapshot::DerivedCamera, items: &[DrawItem]) {
            self.world_calls += 1;
            self.world_item_count = items.len();
        }
        fn present_screen(&mut self, _camera: bridge_snapshot::DerivedCamera, items: &[DrawItem]) {
            self.screen_calls += 1;
            self.screen_item_count = items.len();
        }
    }

    struct Fixture {
        channels: BridgeChannels,
        dispatcher: CommandDispatcher,
    }

    fn fixture() -> Fixture {
        let command_queue = Arc::new(RenderCommandQueue::new(32));
        let callback_queue = Arc::new(CallbackQueue::new(32));
        let entities = Arc::new(EntitySnapshotStore::new(true));
        let cameras = Arc::new(CameraSnapshotStore::new(true));
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
        let dispatcher =
            CommandDispatcher::new(entities.clone(), cameras.clone(), (1280.0, 720.0));
        Fixture {
            channels: BridgeChannels {
                entities,
                cameras,
                command_queue,
                callback_queue,
                entity_facade,
                camera_facade,
            },
            dispatcher,
        }
    }

    #[test]
    fn no_camera_means_no_draw_calls() {
        let fixture = fixture();
        let mut presenter = CountingPresenter::default();
        present_frame(
            &fixture.channels.entities,
            &fixture.channels.cameras,
            &fixture.dispatcher,
            &mut presenter,
        );
        assert_eq!(presenter.world_calls, 0);
        assert_eq!(presenter.screen_calls, 0);
    }

    #[test]
    fn world_camera_renders_only_world_bound_entities() {
        let fixture = fixture();
        let camera = CameraId::from_raw(CameraId::BASE);
        fixture.channels.cameras.write_back(
            camera,
            CameraState::new(
                Vec3::ZERO,
                Orientation::IDENTITY,
                CameraKind::from_request(CameraKindRequest::World, (1280.0, 720.0)),
            ),
        );
        fixture.channels.cameras.set_active(camera);
        fixture.channels.cameras.swap();

        fixture
            .channels
            .entity_facade
            .create_mesh("cube".into(), Vec3::ZERO, 1.0, Rgba8::WHITE);
        fixture.dispatcher.dispatch_all(
            &fixture.channels.command_queue,
            &fixture.channels.entity_facade,
            &fixture.channels.camera_facade,
        );
        fixture.channels.entities.swap();

        let mut presenter = CountingPresenter::default();
        present_frame(
            &fixture.channels.entities,
            &fixture.channels.cameras,
            &fixture.dispatcher,
            &mut presenter,
        );
        assert_eq!(presenter.world_calls, 1);
        assert_eq!(presenter.screen_calls, 0);
        assert_eq!(presenter.world_item_count, 1);
    }

    #[test]
    fn screen_camera_excludes_world_bound_entities() {
        let fixture = fixture();
        let camera = CameraId::from_raw(CameraId::BASE);
        fixture.channels.cameras.write_back(
            camera,
            CameraState::new(
                Vec3::ZERO,
                Orientation::IDENTITY,
                CameraKind::from_request(CameraKindRequest::Screen, (1280.0, 720.0)),
            ),
        );
        fixture.channels.cameras.set_active(camera);
        fixture.channels.cameras.swap();

        fixture
            .channels
            .entity_facade
            .create_mesh("cube".into(), Vec3::ZERO, 1.0, Rgba8::WHITE);
        fixture.dispatcher.dispatch_all(
            &fixture.channels.command_queue,
            &fixture.channels.entity_facade,
            &fixture.channels.camera_facade,
        );
        fixture.channels.entities.swap();

        let mut presenter = CountingPresenter::default();
        present_frame(
            &fixture.channels.entities,
            &fixture.channels.cameras,
            &fixture.dispatcher,
            &mut presenter,
        );
        assert_eq!(presenter.world_calls, 0);
        assert_eq!(presenter.screen_calls, 1);
        assert_eq!(presenter.screen_item_count, 0);
    }

    #[test]
    fn both_passes_render_when_a_world_camera_is_active_and_a_screen_camera_exists() {
        // Regression test: the active camera is a single id (usually the
        // world/player camera), so the screen pass must locate its own
        // camera independently instead of being skipped whenever the
        // active id happens to be a world camera.
        let fixture = fixture();
        let world_cam = CameraId::from_raw(CameraId::BASE);
        let screen_cam = CameraId::from_raw(CameraId::BASE + 1);
        fixture.channels.cameras.write_back(
            world_cam,
            CameraState::new(
                Vec3::ZERO,
                Orientation::IDENTITY,
                CameraKind::from_request(CameraKindRequest::World, (1280.0, 720.0)),
            ),
        );
        fixture.channels.cameras.write_back(
            screen_cam,
            CameraState::new(
                Vec3::ZERO,
                Orientation::IDENTITY,
                CameraKind::from_request(CameraKindRequest::Screen, (1280.0, 720.0)),
            ),
        );
        fixture.channels.cameras.set_active(world_cam);
        fixture.channels.cameras.swap();

        fixture
            .channels
            .entity_facade
            .create_mesh("cube".into(), Vec3::ZERO, 1.0, Rgba8::WHITE);
        fixture.dispatcher.dispatch_all(
            &fixture.channels.command_queue,
            &fixture.channels.entity_facade,
            &fixture.channels.camera_facade,
        );

        let ui_entity = EntityId::from_raw(500);
        let mut ui_state = EntityState::new("plane", Vec3::ZERO, 1.0, Rgba8::WHITE);
        ui_state.camera_binding = CameraBinding::Screen;
        fixture.channels.entities.write_back(ui_entity, ui_state);
        fixture
            .dispatcher
            .resources()
            .lock()
            .unwrap()
            .register_entity(ui_entity, "plane");

        fixture.channels.entities.swap();

        let mut presenter = CountingPresenter::default();
        present_frame(
            &fixture.channels.entities,
            &fixture.channels.cameras,
            &fixture.dispatcher,
            &mut presenter,
        );
        assert_eq!(presenter.world_calls, 1);
        assert_eq!(presenter.screen_calls, 1);
        assert_eq!(presenter.world_item_count, 1);
        assert_eq!(presenter.screen_item_count, 1);
    }
}
