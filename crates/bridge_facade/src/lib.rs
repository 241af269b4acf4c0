//! `EntityFacade`/`CameraFacade`: the only surface the script
//! calls. Each owns its own id generator and shares a `CallbackId ->
//! PendingEntry` table with the render thread's `CommandDispatcher`.
//!
//! The table intentionally stores only `{ready, result_id}` — plain
//! `Copy` data — rather than the script function handle itself.
//! Keeping the handle out of this shared, mutex-guarded table means
//! the render thread's write to `ready`/`result_id` never has to touch
//! anything isolate-owned; the handle lookup and invocation happen
//! entirely on the worker thread, inside `bridge_script`, keyed by the
//! same `CallbackId`. This enforces "worker-thread only" for the
//! handle by construction instead of by convention. See DESIGN.md for
//! the fuller rationale.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bevy::prelude::Vec3;
use tracing::warn;

use bridge_ids::{CallbackId, CameraId, EntityId, IdAllocator};
use bridge_queue::{CallbackQueue, RenderCommandQueue};
use bridge_snapshot::{CameraSnapshotStore, EntitySnapshotStore};
use bridge_state::{
    CameraKindRequest, CompletionToken, Orientation, RenderCommand, Rgba8,
};

#[derive(Debug, Clone, Copy, Default)]
struct PendingEntry {
    ready: bool,
    result_id: u64,
}

/// Shared `CallbackId` allocator: the domain is common to entity and
/// camera creation alike, so both facades draw from one counter.
pub type CallbackAllocator = Arc<IdAllocator<CallbackId>>;

fn new_callback_allocator() -> CallbackAllocator {
    Arc::new(IdAllocator::new())
}

pub struct EntityFacade {
    ids: IdAllocator<EntityId>,
    callback_ids: CallbackAllocator,
    pending: Mutex<HashMap<CallbackId, PendingEntry>>,
    queue: Arc<RenderCommandQueue>,
    snapshots: Arc<EntitySnapshotStore>,
}

impl EntityFacade {
    pub fn new(
        queue: Arc<RenderCommandQueue>,
        snapshots: Arc<EntitySnapshotStore>,
        callback_ids: CallbackAllocator,
    ) -> Self {
        Self {
            ids: IdAllocator::new(),
            callback_ids,
            pending: Mutex::new(HashMap::new()),
            queue,
            snapshots,
        }
    }

    /// Submission contract for create operations: allocate the
    /// target id and a callback id, record the pending entry as not
    /// ready, submit the command, and return the callback id
    /// immediately regardless of whether dispatch has happened yet.
    pub fn create_mesh(
        &self,
        archetype: String,
        position: Vec3,
        radius: f32,
        color: Rgba8,
    ) -> CallbackId {
        let entity = self.ids.alloc();
        let callback = self.callback_ids.alloc();
        self.pending
            .lock()
            .unwrap()
            .insert(callback, PendingEntry::default());

        let submitted = self.queue.try_submit(RenderCommand::CreateMesh {
            entity,
            archetype,
            position,
            radius,
            color,
            callback: Some(callback),
        });

        if !submitted {
            warn!(?entity, "render command queue full, createMesh dropped");
            self.notify_callback_ready(callback, 0);
        }

        callback
    }

    pub fn update_position(&self, entity: EntityId, position: Vec3) -> bool {
        self.submit_update(entity, Some(position), None, None)
    }

    /// `moveBy` resolved as a worker-side read-modify-write against the
    /// front snapshot: introduces a one-frame read lag but keeps the
    /// dispatcher free of delta math.
    pub fn move_by(&self, entity: EntityId, delta: Vec3) -> bool {
        let Some(current) = self.snapshots.get_front(entity) else {
            warn!(?entity, "moveBy on unknown entity");
            return false;
        };
        self.update_position(entity, current.position + delta)
    }

    pub fn update_orientation(&self, entity: EntityId, orientation: Orientation) -> bool {
        self.submit_update(entity, None, Some(orientation), None)
    }

    pub fn update_color(&self, entity: EntityId, color: Rgba8) -> bool {
        self.submit_update(entity, None, None, Some(color))
    }

    fn submit_update(
        &self,
        entity: EntityId,
        position: Option<Vec3>,
        orientation: Option<Orientation>,
        color: Option<Rgba8>,
    ) -> bool {
        self.queue.try_submit(RenderCommand::UpdateEntity {
            entity,
            position,
            orientation,
            color,
        })
    }

    pub fn destroy(&self, entity: EntityId) -> bool {
        self.queue
            .try_submit(RenderCommand::DestroyEntity { entity })
    }

    /// Called by `CommandDispatcher` on the render thread once a create
    /// command has actually been dispatched.
    pub fn notify_callback_ready(&self, callback: CallbackId, result_id: u64) {
        let mut pending = self.pending.lock().unwrap();
        if let Some(entry) = pending.get_mut(&callback) {
            entry.result_id = result_id;
            entry.ready = true;
        }
    }

    /// Called once per render frame: publishes a
    /// completion token for every ready entry and erases it. Returns
    /// the number of tokens published, purely for diagnostics.
    pub fn execute_pending_callbacks(&self, callbacks: &CallbackQueue) -> usize {
        let mut pending = self.pending.lock().unwrap();
        let ready: Vec<CallbackId> = pending
            .iter()
            .filter(|(_, e)| e.ready)
            .map(|(id, _)| *id)
            .collect();

        let mut published = 0;
        for callback in ready {
            if let Some(entry) = pending.remove(&callback) {
                if callbacks.try_submit(CompletionToken::success(callback, entry.result_id)) {
                    published += 1;
                } else {
                    warn!(?callback, "callback queue full, completion token dropped");
                }
            }
        }
        published
    }

    /// Shutdown discards whatever is still outstanding.
    pub fn discard_pending(&self) {
        self.pending.lock().unwrap().clear();
    }
}

pub struct CameraFacade {
    ids: IdAllocator<CameraId>,
    callback_ids: CallbackAllocator,
    pending: Mutex<HashMap<CallbackId, PendingEntry>>,
    queue: Arc<RenderCommandQueue>,
    snapshots: Arc<CameraSnapshotStore>,
}

impl CameraFacade {
    pub fn new(
        queue: Arc<RenderCommandQueue>,
        snapshots: Arc<CameraSnapshotStore>,
        callback_ids: CallbackAllocator,
    ) -> Self {
        Self {
            ids: IdAllocator::new(),
            callback_ids,
            pending: Mutex::new(HashMap::new()),
            queue,
            snapshots,
        }
    }

    pub fn create_camera(
        &self,
        position: Vec3,
        orientation: Orientation,
        kind: CameraKindRequest,
    ) -> CallbackId {
        let camera = self.ids.alloc();
        let callback = self.callback_ids.alloc();
        self.pending
            .lock()
            .unwrap()
            .insert(callback, PendingEntry::default());

        let submitted = self.queue.try_submit(RenderCommand::CreateCamera {
            camera,
            position,
            orientation,
            kind,
            callback: Some(callback),
        });

        if !submitted {
            warn!(?camera, "render command queue full, createCamera dropped");
            self.notify_callback_ready(callback, 0);
        }

        callback
    }

    pub fn move_camera(&self, camera: CameraId, position: Vec3) -> bool {
        self.submit_update(camera, position, None)
    }

    pub fn move_camera_by(&self, camera: CameraId, delta: Vec3) -> bool {
        let Some(current) = self.snapshots.states().get_front(camera) else {
            warn!(?camera, "moveCameraBy on unknown camera");
            return false;
        };
        self.move_camera(camera, current.position + delta)
    }

    pub fn look_at_camera(&self, camera: CameraId, target: Vec3) -> bool {
        let Some(current) = self.snapshots.states().get_front(camera) else {
            warn!(?camera, "lookAtCamera on unknown camera");
            return false;
        };
        let orientation = Orientation::looking_at(current.position, target, current.orientation.roll);
        self.submit_update(camera, current.position, Some(orientation))
    }

    fn submit_update(&self, camera: CameraId, position: Vec3, orientation: Option<Orientation>) -> bool {
        let orientation = orientation.unwrap_or_else(|| {
            self.snapshots
                .states()
                .get_front(camera)
                .map(|c| c.orientation)
                .unwrap_or_default()
        });
        self.queue.try_submit(RenderCommand::UpdateCamera {
            camera,
            position,
            orientation,
        })
    }

    pub fn update_camera_kind(&self, camera: CameraId, kind: CameraKindRequest) -> bool {
        self.queue
            .try_submit(RenderCommand::UpdateCameraKind { camera, kind })
    }

    /// These two commands carry no callback in the tagged union,
    /// but the script-facing API still returns a `CallbackId` for
    /// symmetry with the create operations. Since they cannot fail in
    /// any way the dispatcher needs to report back, we acknowledge
    /// immediately at submission time rather than waiting on dispatch.
    pub fn set_active_camera(&self, camera: CameraId) -> CallbackId {
        let callback = self.callback_ids.alloc();
        let submitted = self
            .queue
            .try_submit(RenderCommand::SetActiveCamera { camera });
        self.pending.lock().unwrap().insert(
            callback,
            PendingEntry {
                ready: true,
                result_id: if submitted { camera.raw() } else { 0 },
            },
        );
        callback
    }

    pub fn destroy_camera(&self, camera: CameraId) -> CallbackId {
        let callback = self.callback_ids.alloc();
        let submitted = self.queue.try_submit(RenderCommand::DestroyCamera { camera });
        self.pending.lock().unwrap().insert(
            callback,
            PendingEntry {
                ready: true,
                result_id: if submitted { camera.raw() } else { 0 },
            },
        );
        callback
    }

    pub fn notify_callback_ready(&self, callback: CallbackId, result_id: u64) {
        let mut pending = self.pending.lock().unwrap();
        if let Some(entry) = pending.get_mut(&callback) {
            entry.result_id = result_id;
            entry.ready = true;
        }
    }

    pub fn execute_pending_callbacks(&self, callbacks: &CallbackQueue) -> usize {
        let mut pending = self.pending.lock().unwrap();
        let ready: Vec<CallbackId> = pending
            .iter()
            .filter(|(_, e)| e.ready)
            .map(|(id, _)| *id)
            .collect();

        let mut published = 0;
        for callback in ready {
            if let Some(entry) = pending.remove(&callback) {
                if callbacks.try_submit(CompletionToken::success(callback, entry.result_id)) {
                    published += 1;
                } else {
                    warn!(?callback, "callback queue full, completion token dropped");
                }
            }
        }
        published
    }

    pub fn discard_pending(&self) {
        self.pending.lock().unwrap().clear();
    }
}

pub fn new_shared_callback_allocator() -> CallbackAllocator {
    new_callback_allocator()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facades() -> (EntityFacade, Arc<RenderCommandQueue>, Arc<EntitySnapshotStore>) {
        let queue = Arc::new(RenderCommandQueue::new(4));
        let snapshots = Arc::new(EntitySnapshotStore::new(true));
        let callbacks = new_shared_callback_allocator();
        (
            EntityFacade::new(queue.clone(), snapshots.clone(), callbacks),
            queue,
            snapshots,
        )
    }

    #[test]
    fn create_mesh_yields_one_completion_on_success() {
        let (facade, queue, _snapshots) = facades();
        let callback = facade.create_mesh("cube".into(), Vec3::ZERO, 1.0, Rgba8::WHITE);

        let commands = queue.drain();
        assert_eq!(commands.len(), 1);

        facade.notify_callback_ready(callback, 42);
        let callback_queue = CallbackQueue::new(4);
        let published = facade.execute_pending_callbacks(&callback_queue);
        assert_eq!(published, 1);

        let tokens = callback_queue.drain();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].callback, callback);
        assert_eq!(tokens[0].result_id, 42);
        assert!(!tokens[0].failed());
    }

    #[test]
    fn saturated_queue_still_yields_a_zero_completion() {
        let queue = Arc::new(RenderCommandQueue::new(0));
        let snapshots = Arc::new(EntitySnapshotStore::new(true));
        let facade = EntityFacade::new(queue, snapshots, new_shared_callback_allocator());

        let callback = facade.create_mesh("cube".into(), Vec3::ZERO, 1.0, Rgba8::WHITE);
        let callback_queue = CallbackQueue::new(4);
        facade.execute_pending_callbacks(&callback_queue);

        let tokens = callback_queue.drain();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].callback, callback);
        assert!(tokens[0].failed());
    }

    #[test]
    fn move_by_reads_front_snapshot_for_relative_offset() {
        let (facade, queue, snapshots) = facades();
        let entity = EntityId::from_raw(7);
        snapshots.write_back(
            entity,
            bridge_state::EntityState::new("cube", Vec3::new(1.0, 2.0, 3.0), 1.0, Rgba8::WHITE),
        );
        snapshots.swap();

        assert!(facade.move_by(entity, Vec3::new(1.0, 0.0, 0.0)));
        let commands = queue.drain();
        match &commands[0] {
            RenderCommand::UpdateEntity { position, .. } => {
                assert_eq!(*position, Some(Vec3::new(2.0, 2.0, 3.0)));
            }
            _ => panic!("expected UpdateEntity"),
        }
    }

    #[test]
    fn move_by_on_unknown_entity_fails_without_submitting() {
        let (facade, queue, _snapshots) = facades();
        assert!(!facade.move_by(EntityId::from_raw(999), Vec3::ONE));
        assert!(queue.drain().is_empty());
    }
}
