//! `CommandDispatcher` and `RenderResourceManager`: the
//! render-thread side of the bridge. The dispatcher is a single match
//! over `RenderCommand`'s tag — never a trait-object hierarchy —
//! and the resource manager owns the only mutable vertex data in the
//! process, entirely on the render thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bevy::prelude::Vec3;
use tracing::warn;

use bridge_facade::{CameraFacade, EntityFacade};
use bridge_ids::{CameraId, EntityId};
use bridge_queue::RenderCommandQueue;
use bridge_snapshot::{CameraSnapshotStore, EntitySnapshotStore};
use bridge_state::{CameraKind, CameraState, EntityState, RenderCommand};

mod mesh;
pub use mesh::{MeshHandle, Vertex, VertexList};

/// Maps `meshArchetype -> handle -> VertexList` and `EntityId -> handle`
///. Vertex data for an archetype is generated once and shared by
/// every entity that requests it; the per-entity `radius`/`color` fields
/// stay in `EntityState` for the renderer to apply at draw time rather
/// than being baked into the shared geometry, which is what makes
/// sharing sound across entities with different radii and colors.
pub struct RenderResourceManager {
    entity_handles: HashMap<EntityId, MeshHandle>,
    archetype_handles: HashMap<String, MeshHandle>,
    vertex_data: HashMap<MeshHandle, Arc<VertexList>>,
    next_handle: u32,
}

impl Default for RenderResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderResourceManager {
    pub fn new() -> Self {
        Self {
            entity_handles: HashMap::new(),
            archetype_handles: HashMap::new(),
            vertex_data: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Associate `entity` with a handle for `archetype`, generating the
    /// shared geometry on first use. Returns `MeshHandle::INVALID` for
    /// an unrecognized archetype.
    pub fn register_entity(&mut self, entity: EntityId, archetype: &str) -> MeshHandle {
        let Some(generator) = mesh::generator_for(archetype) else {
            return MeshHandle::INVALID;
        };

        let handle = match self.archetype_handles.get(archetype) {
            Some(handle) => *handle,
            None => {
                let handle = MeshHandle(self.next_handle);
                self.next_handle += 1;
                self.vertex_data.insert(handle, Arc::new(generator()));
                self.archetype_handles.insert(archetype.to_string(), handle);
                handle
            }
        };

        self.entity_handles.insert(entity, handle);
        handle
    }

    /// Removes only the `EntityId -> handle` entry; the vertex data
    /// stays cached for the lifetime of the process.
    pub fn unregister_entity(&mut self, entity: EntityId) {
        self.entity_handles.remove(&entity);
    }

    pub fn handle_for(&self, entity: EntityId) -> Option<MeshHandle> {
        self.entity_handles.get(&entity).copied()
    }

    pub fn vertices(&self, handle: MeshHandle) -> Option<Arc<VertexList>> {
        self.vertex_data.get(&handle).cloned()
    }
}

/// Drives one render thread's pass over a drained `RenderCommandQueue`
///. Soft-deletes are applied for one frame (`active = false`)
/// before the entry is actually removed from the snapshot store and
/// resource manager on the following dispatch, so the renderer always
/// gets a chance to observe the transition.
pub struct CommandDispatcher {
    entities: Arc<EntitySnapshotStore>,
    cameras: Arc<CameraSnapshotStore>,
    resources: Mutex<RenderResourceManager>,
    default_viewport_px: (f32, f32),
    pending_entity_removal: Mutex<Vec<EntityId>>,
    pending_camera_removal: Mutex<Vec<CameraId>>,
}

impl CommandDispatcher {
    pub fn new(
        entities: Arc<EntitySnapshotStore>,
        cameras: Arc<CameraSnapshotStore>,
        default_viewport_px: (f32, f32),
    ) -> Self {
        Self {
            entities,
            cameras,
            resources: Mutex::new(RenderResourceManager::new()),
            default_viewport_px,
            pending_entity_removal: Mutex::new(Vec::new()),
            pending_camera_removal: Mutex::new(Vec::new()),
        }
    }

    pub fn resources(&self) -> &Mutex<RenderResourceManager> {
        &self.resources
    }

    /// Drains `queue` and applies every command in FIFO order, reporting
    /// create completions through the facades. Returns the number of
    /// commands processed, purely for diagnostics.
    pub fn dispatch_all(
        &self,
        queue: &RenderCommandQueue,
        entity_facade: &EntityFacade,
        camera_facade: &CameraFacade,
    ) -> usize {
        self.hard_remove_pending();

        let commands = queue.drain();
        let count = commands.len();
        for command in commands {
            self.dispatch_one(command, entity_facade, camera_facade);
        }
        count
    }

    fn hard_remove_pending(&self) {
        let mut entities = self.pending_entity_removal.lock().unwrap();
        for entity in entities.drain(..) {
            self.entities.remove_back(entity);
            self.resources.lock().unwrap().unregister_entity(entity);
        }
        drop(entities);

        let mut cameras = self.pending_camera_removal.lock().unwrap();
        for camera in cameras.drain(..) {
            self.cameras.states().remove_back(camera);
        }
    }

    fn dispatch_one(
        &self,
        command: RenderCommand,
        entity_facade: &EntityFacade,
        camera_facade: &CameraFacade,
    ) {
        match command {
            RenderCommand::CreateMesh {
                entity,
                archetype,
                position,
                radius,
                color,
                callback,
            } => {
                let handle = self.resources.lock().unwrap().register_entity(entity, &archetype);
                if handle.is_valid() {
                    self.entities
                        .write_back(entity, EntityState::new(archetype, position, radius, color));
                    if let Some(callback) = callback {
                        entity_facade.notify_callback_ready(callback, entity.raw());
                    }
                } else {
                    warn!(%archetype, ?entity, "unknown mesh archetype, createMesh failed");
                    if let Some(callback) = callback {
                        entity_facade.notify_callback_ready(callback, 0);
                    }
                }
            }
            RenderCommand::UpdateEntity {
                entity,
                position,
                orientation,
                color,
            } => {
                let updated = self.entities.update_back(entity, |state| {
                    if let Some(position) = position {
                        state.position = position;
                    }
                    if let Some(orientation) = orientation {
                        state.orientation = orientation;
                    }
                    if let Some(color) = color {
                        state.color = color;
                    }
                });
                if !updated {
                    warn!(?entity, "updateEntity for unknown entity, dropped");
                }
            }
            RenderCommand::DestroyEntity { entity } => {
                let found = self.entities.update_back(entity, |state| state.active = false);
                if found {
                    self.pending_entity_removal.lock().unwrap().push(entity);
                } else {
                    warn!(?entity, "destroyEntity for unknown entity, dropped");
                }
            }
            RenderCommand::CreateCamera {
                camera,
                position,
                orientation,
                kind,
                callback,
            } => {
                let kind = CameraKind::from_request(kind, self.default_viewport_px);
                self.cameras
                    .write_back(camera, CameraState::new(position, orientation, kind));
                if let Some(callback) = callback {
                    camera_facade.notify_callback_ready(callback, camera.raw());
                }
            }
            RenderCommand::UpdateCamera {
                camera,
                position,
                orientation,
            } => {
                let updated = self.cameras.update_back(camera, |state| {
                    state.position = position;
                    state.orientation = orientation;
                });
                if !updated {
                    warn!(?camera, "updateCamera for unknown camera, dropped");
                }
            }
            RenderCommand::UpdateCameraKind { camera, kind } => {
                let viewport = self.default_viewport_px;
                let updated = self
                    .cameras
                    .update_back(camera, |state| state.kind = CameraKind::from_request(kind, viewport));
                if !updated {
                    warn!(?camera, "updateCameraKind for unknown camera, dropped");
                }
            }
            RenderCommand::SetActiveCamera { camera } => {
                self.cameras.set_active(camera);
            }
            RenderCommand::DestroyCamera { camera } => {
                let found = self.cameras.update_back(camera, |state| state.active = false);
                if found {
                    self.pending_camera_removal.lock().unwrap().push(camera);
                } else {
                    warn!(?camera, "destroyCamera for unknown camera, dropped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_facade::new_shared_callback_allocator;
    use bridge_queue::CallbackQueue;
    use bridge_state::{CameraKindRequest, Orientation, Rgba8};

    fn dispatcher() -> (
        CommandDispatcher,
        Arc<RenderCommandQueue>,
        EntityFacade,
        CameraFacade,
    ) {
        let queue = Arc::new(RenderCommandQueue::new(16));
        let entities = Arc::new(EntitySnapshotStore::new(true));
        let cameras = Arc::new(CameraSnapshotStore::new(true));
        let callback_ids = new_shared_callback_allocator();
        let entity_facade = EntityFacade::new(queue.clone(), entities.clone(), callback_ids.clone());
        let camera_facade = CameraFacade::new(queue.clone(), cameras.clone(), callback_ids);
        let dispatcher = CommandDispatcher::new(entities, cameras, (1280.0, 720.0));
        (dispatcher, queue, entity_facade, camera_facade)
    }

    #[test]
    fn known_archetype_creates_entity_and_acks_with_entity_id() {
        let (dispatcher, queue, entity_facade, camera_facade) = dispatcher();
        let callback = entity_facade.create_mesh("cube".into(), Vec3::ZERO, 1.0, Rgba8::WHITE);
        dispatcher.dispatch_all(&queue, &entity_facade, &camera_facade);

        let callback_queue = CallbackQueue::new(4);
        entity_facade.execute_pending_callbacks(&callback_queue);
        let tokens = callback_queue.drain();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].callback, callback);
        assert!(!tokens[0].failed());
        assert!(dispatcher.resources().lock().unwrap().handle_for(EntityId::from_raw(tokens[0].result_id)).is_some());
    }

    #[test]
    fn unknown_archetype_fails_and_registers_nothing() {
        let (dispatcher, queue, entity_facade, camera_facade) = dispatcher();
        let callback = entity_facade.create_mesh("teapot".into(), Vec3::ZERO, 1.0, Rgba8::WHITE);
        dispatcher.dispatch_all(&queue, &entity_facade, &camera_facade);

        let callback_queue = CallbackQueue::new(4);
        entity_facade.execute_pending_callbacks(&callback_queue);
        let tokens = callback_queue.drain();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].callback, callback);
        assert!(tokens[0].failed());
    }

    #[test]
    fn entities_sharing_an_archetype_share_one_handle() {
        let (dispatcher, queue, entity_facade, camera_facade) = dispatcher();
        entity_facade.create_mesh("cube".into(), Vec3::ZERO, 1.0, Rgba8::WHITE);
        entity_facade.create_mesh("cube".into(), Vec3::ONE, 2.0, Rgba8::WHITE);
        dispatcher.dispatch_all(&queue, &entity_facade, &camera_facade);

        let resources = dispatcher.resources().lock().unwrap();
        let handles: Vec<_> = (1..=2)
            .map(|raw| resources.handle_for(EntityId::from_raw(raw)).unwrap())
            .collect();
        assert_eq!(handles[0], handles[1]);
    }

    #[test]
    fn destroy_is_soft_for_one_dispatch_cycle() {
        let (dispatcher, queue, entity_facade, camera_facade) = dispatcher();
        entity_facade.create_mesh("cube".into(), Vec3::ZERO, 1.0, Rgba8::WHITE);
        dispatcher.dispatch_all(&queue, &entity_facade, &camera_facade);
        let entity = EntityId::from_raw(1);

        entity_facade.destroy(entity);
        dispatcher.dispatch_all(&queue, &entity_facade, &camera_facade);
        assert!(!dispatcher.entities.get_back(entity).unwrap().active);
        assert!(dispatcher.resources().lock().unwrap().handle_for(entity).is_some());

        dispatcher.dispatch_all(&queue, &entity_facade, &camera_facade);
        assert!(dispatcher.entities.get_back(entity).is_none());
        assert!(dispatcher.resources().lock().unwrap().handle_for(entity).is_none());
    }

    #[test]
    fn update_for_unknown_entity_is_silently_dropped() {
        let (dispatcher, queue, entity_facade, camera_facade) = dispatcher();
        entity_facade.update_position(EntityId::from_raw(999), Vec3::ONE);
        // must not panic, simply logs and drops
        dispatcher.dispatch_all(&queue, &entity_facade, &camera_facade);
    }

    #[test]
    fn create_camera_builds_world_perspective_by_default() {
        let (dispatcher, queue, entity_facade, camera_facade) = dispatcher();
        let callback = camera_facade.create_camera(Vec3::ZERO, Orientation::IDENTITY, CameraKindRequest::World);
        dispatcher.dispatch_all(&queue, &entity_facade, &camera_facade);

        let callback_queue = CallbackQueue::new(4);
        camera_facade.execute_pending_callbacks(&callback_queue);
        let tokens = callback_queue.drain();
        assert_eq!(tokens[0].callback, callback);
        assert!(!tokens[0].failed());

        let camera = CameraId::from_raw(tokens[0].result_id);
        let state = dispatcher.cameras.states().get_back(camera).unwrap();
        assert!(matches!(state.kind, CameraKind::Perspective(_)));
    }
}
