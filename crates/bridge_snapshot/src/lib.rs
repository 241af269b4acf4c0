//! Double-buffered snapshot stores.
//!
//! Both buffers of a store are only ever touched from the render
//! thread: the dispatcher mutates the back buffer, the renderer reads
//! the front, and `swap()` exchanges the two at the frame boundary. The
//! buffers are still guarded by mutexes (rather than bare `RefCell`s)
//! because the store types need to be `Send + Sync` to live as
//! resources in the bevy `App`, and because a mutex is cheap insurance
//! that matches the "guarded by a mutex" wording of the swap contract.
//!
//! Per-key dirty tracking keeps `swap()` at `O(|dirty|)` in the common
//! case: the front index is an atomic usize into a two-element buffer
//! array, so "pointer swap" is a single store, not a data copy.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use bevy::prelude::{Mat4, Quat, Vec3};

use bridge_ids::CameraId;
use bridge_state::{CameraBinding, CameraKind, CameraState, OrthographicParams, PerspectiveParams};

/// Generic double-buffered `Id -> V` map with per-key dirty tracking.
pub struct SnapshotStore<Id, V> {
    buffers: [Mutex<HashMap<Id, V>>; 2],
    front_idx: AtomicUsize,
    dirty: Mutex<HashSet<Id>>,
    dirty_tracking: bool,
}

impl<Id, V> SnapshotStore<Id, V>
where
    Id: Eq + Hash + Copy,
    V: Clone,
{
    pub fn new(dirty_tracking: bool) -> Self {
        Self {
            buffers: [Mutex::new(HashMap::new()), Mutex::new(HashMap::new())],
            front_idx: AtomicUsize::new(0),
            dirty: Mutex::new(HashSet::new()),
            dirty_tracking,
        }
    }

    fn front_index(&self) -> usize {
        self.front_idx.load(Ordering::Acquire)
    }

    fn back_index(&self) -> usize {
        1 - self.front_index()
    }

    /// Render-thread read of the front buffer. Valid at any time; never
    /// blocks on a write in progress on the back buffer.
    pub fn with_front<R>(&self, f: impl FnOnce(&HashMap<Id, V>) -> R) -> R {
        let front = self.buffers[self.front_index()].lock().unwrap();
        f(&front)
    }

    pub fn front_snapshot(&self) -> HashMap<Id, V> {
        self.with_front(|front| front.clone())
    }

    pub fn get_front(&self, id: Id) -> Option<V> {
        self.with_front(|front| front.get(&id).cloned())
    }

    /// Insert or overwrite an entry in the back buffer and mark it
    /// dirty. Used for create commands and for soft-delete (the caller
    /// just writes `active = false` into the existing value).
    pub fn write_back(&self, id: Id, value: V) {
        self.buffers[self.back_index()]
            .lock()
            .unwrap()
            .insert(id, value);
        self.dirty.lock().unwrap().insert(id);
    }

    /// Mutate an existing back-buffer entry in place. Returns `false`
    /// (and leaves the dirty set untouched) if the id is unknown, so
    /// callers can implement the "silent drop with warning" policy for
    /// stale updates.
    pub fn update_back(&self, id: Id, f: impl FnOnce(&mut V)) -> bool {
        let mut back = self.buffers[self.back_index()].lock().unwrap();
        let Some(entry) = back.get_mut(&id) else {
            return false;
        };
        f(entry);
        drop(back);
        self.dirty.lock().unwrap().insert(id);
        true
    }

    /// Remove an entry from the back buffer entirely and mark it dirty,
    /// so the next `swap()` removes it from the front buffer too. Used
    /// for the hard-delete half of the soft-delete lifecycle: the
    /// dispatcher sets `active = false` on one frame and calls this on
    /// the next, once the renderer has had a chance to observe it.
    pub fn remove_back(&self, id: Id) {
        self.buffers[self.back_index()].lock().unwrap().remove(&id);
        self.dirty.lock().unwrap().insert(id);
    }

    pub fn get_back(&self, id: Id) -> Option<V> {
        self.buffers[self.back_index()]
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
    }

    /// Atomic exchange of front/back at the frame boundary.
    pub fn swap(&self) {
        let mut dirty = self.dirty.lock().unwrap();
        let front_i = self.front_index();
        let back_i = 1 - front_i;

        if self.dirty_tracking {
            {
                let back = self.buffers[back_i].lock().unwrap();
                let mut front = self.buffers[front_i].lock().unwrap();
                for id in dirty.iter() {
                    match back.get(id) {
                        Some(v) => {
                            front.insert(*id, v.clone());
                        }
                        None => {
                            front.remove(id);
                        }
                    }
                }
            }

            // exchange pointers: the buffer that was `front` (now fully
            // synced with `back`) becomes the new front.
            self.front_idx.store(back_i, Ordering::Release);

            // mirror the same dirty entries into the new back buffer so
            // both agree on every key.
            {
                let new_front = self.buffers[back_i].lock().unwrap();
                let mut new_back = self.buffers[front_i].lock().unwrap();
                for id in dirty.iter() {
                    match new_front.get(id) {
                        Some(v) => {
                            new_back.insert(*id, v.clone());
                        }
                        None => {
                            new_back.remove(id);
                        }
                    }
                }
            }
        } else {
            let back = self.buffers[back_i].lock().unwrap();
            let mut front = self.buffers[front_i].lock().unwrap();
            *front = back.clone();
            drop(front);
            drop(back);
            self.front_idx.store(back_i, Ordering::Release);
        }

        dirty.clear();
    }
}

pub type EntitySnapshotStore = SnapshotStore<bridge_ids::EntityId, bridge_state::EntityState>;

/// A rebuilt projection + view pair for one camera, cached after every
/// swap. Pointers into the cache are only promised valid "until
/// the next swap" in the original design; in Rust we hand out owned
/// clones instead, which sidesteps the lifetime hazard entirely while
/// keeping the same call shape (`lookup_camera(id)`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedCamera {
    pub projection: Mat4,
    pub view: Mat4,
}

fn build_projection(kind: CameraKind) -> Mat4 {
    match kind {
        CameraKind::Perspective(PerspectiveParams {
            fov_degrees,
            aspect,
            near,
            far,
        }) => Mat4::perspective_rh(fov_degrees.to_radians(), aspect, near, far),
        CameraKind::Orthographic(OrthographicParams {
            left,
            bottom,
            right,
            top,
            near,
            far,
        }) => Mat4::orthographic_rh(left, right, bottom, top, near, far),
    }
}

/// Fixed 90deg CCW rotation about +Z that carries the world convention
/// (+X forward, +Y left, +Z up) into the render basis (I = +Y, J = -X,
/// K = +Z), per spec §6. Applied to every camera's world transform
/// before inverting into a view matrix.
fn camera_to_render_basis() -> Mat4 {
    Mat4::from_quat(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2))
}

fn build_view(position: Vec3, orientation: bridge_state::Orientation) -> Mat4 {
    let rotation = Quat::from_euler(
        bevy::math::EulerRot::YXZ,
        orientation.yaw.to_radians(),
        orientation.pitch.to_radians(),
        orientation.roll.to_radians(),
    );
    let camera_transform = Mat4::from_rotation_translation(rotation, position);
    (camera_to_render_basis() * camera_transform).inverse()
}

fn rebuild_one(state: &CameraState) -> DerivedCamera {
    DerivedCamera {
        projection: build_projection(state.kind),
        view: build_view(state.position, state.orientation),
    }
}

/// Camera store: the entity/camera double buffer plus the active-camera
/// id (a relaxed atomic, written only by dispatching `SetActiveCamera`)
/// and the derived `Camera` cache rebuilt after every swap.
pub struct CameraSnapshotStore {
    states: SnapshotStore<CameraId, CameraState>,
    active: AtomicU64,
    derived: Mutex<HashMap<CameraId, DerivedCamera>>,
}

impl CameraSnapshotStore {
    pub fn new(dirty_tracking: bool) -> Self {
        Self {
            states: SnapshotStore::new(dirty_tracking),
            active: AtomicU64::new(0),
            derived: Mutex::new(HashMap::new()),
        }
    }

    pub fn states(&self) -> &SnapshotStore<CameraId, CameraState> {
        &self.states
    }

    pub fn write_back(&self, id: CameraId, value: CameraState) {
        self.states.write_back(id, value);
    }

    pub fn update_back(&self, id: CameraId, f: impl FnOnce(&mut CameraState)) -> bool {
        self.states.update_back(id, f)
    }

    /// Takes effect only at the next swap.
    pub fn set_active(&self, id: CameraId) {
        self.active.store(id.raw(), Ordering::Relaxed);
    }

    pub fn active(&self) -> CameraId {
        CameraId::from_raw(self.active.load(Ordering::Relaxed))
    }

    /// Swap both the state buffer and rebuild the derived camera cache
    /// from the new front buffer.
    pub fn swap(&self) {
        self.states.swap();
        let front = self.states.front_snapshot();
        let mut derived = self.derived.lock().unwrap();
        derived.clear();
        for (id, state) in front.iter() {
            derived.insert(*id, rebuild_one(state));
        }
    }

    /// Valid until the next `swap()` call.
    pub fn lookup_camera(&self, id: CameraId) -> Option<DerivedCamera> {
        self.derived.lock().unwrap().get(&id).copied()
    }

    /// The active camera, if it is present and bound to the world
    /// (perspective) pass. `None` means the render loop skips world
    /// rendering this frame — the defined behaviour before the first
    /// `SetActiveCamera` commit, or if the active id names a screen
    /// camera instead.
    pub fn active_world_camera(&self) -> Option<(CameraId, DerivedCamera)> {
        let id = self.active();
        let state = self.states.get_front(id)?;
        if !state.active || state.kind.binding() != CameraBinding::World {
            return None;
        }
        self.lookup_camera(id).map(|camera| (id, camera))
    }

    /// Scans the front buffer for an active screen (orthographic)
    /// camera, since only one "active" id is tracked and it ordinarily
    /// names the world camera. There is usually at most one UI camera;
    /// picks the lowest id if more than one is active, for determinism.
    pub fn active_screen_camera(&self) -> Option<(CameraId, DerivedCamera)> {
        let front = self.states.front_snapshot();
        let id = front
            .iter()
            .filter(|(_, state)| state.active && state.kind.binding() == CameraBinding::Screen)
            .map(|(id, _)| *id)
            .min()?;
        self.lookup_camera(id).map(|camera| (id, camera))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_ids::EntityId;
    use bridge_state::{CameraKindRequest, EntityState, Orientation, Rgba8};

    fn entity(x: f32) -> EntityState {
        EntityState::new("cube", Vec3::new(x, 0.0, 0.0), 1.0, Rgba8::WHITE)
    }

    #[test]
    fn dirty_keys_agree_in_front_and_back_after_swap() {
        let store = EntitySnapshotStore::new(true);
        let id = EntityId::from_raw(1);
        store.write_back(id, entity(0.0));
        store.swap();

        assert_eq!(store.get_front(id), Some(entity(0.0)));

        store.update_back(id, |e| e.position.x = 5.0);
        store.swap();

        assert_eq!(store.get_front(id).unwrap().position.x, 5.0);
        assert_eq!(store.get_back(id).unwrap().position.x, 5.0);
    }

    #[test]
    fn untouched_keys_are_stable_across_swaps() {
        let store = EntitySnapshotStore::new(true);
        let id = EntityId::from_raw(1);
        store.write_back(id, entity(1.0));
        store.swap();
        // second swap with nothing dirty must not disturb the entry
        store.swap();
        assert_eq!(store.get_front(id), Some(entity(1.0)));
    }

    #[test]
    fn update_on_unknown_id_is_a_no_op() {
        let store = EntitySnapshotStore::new(true);
        let found = store.update_back(EntityId::from_raw(99), |e| e.position.x = 1.0);
        assert!(!found);
        assert!(store.get_front(EntityId::from_raw(99)).is_none());
    }

    #[test]
    fn two_successive_updates_equal_one() {
        let store = EntitySnapshotStore::new(true);
        let id = EntityId::from_raw(1);
        store.write_back(id, entity(0.0));
        store.swap();

        store.update_back(id, |e| e.position.x = 5.0);
        store.update_back(id, |e| e.position.x = 5.0);
        store.swap();

        assert_eq!(store.get_front(id).unwrap().position.x, 5.0);
    }

    #[test]
    fn active_camera_changes_only_at_swap_boundary() {
        let store = CameraSnapshotStore::new(true);
        let cam = CameraId::from_raw(1000);
        store.set_active(cam);
        // set_active is immediately observable on the atomic (it has no
        // buffering of its own) but the derived cache/front state is
        // still whatever the last swap produced.
        assert_eq!(store.active(), cam);
        assert!(store.lookup_camera(cam).is_none());
    }

    #[test]
    fn fallback_full_copy_without_dirty_tracking() {
        let store = EntitySnapshotStore::new(false);
        let id = EntityId::from_raw(1);
        store.write_back(id, entity(2.0));
        store.swap();
        assert_eq!(store.get_front(id), Some(entity(2.0)));
    }

    #[test]
    fn camera_to_render_basis_matches_spec_i_j_k() {
        let basis = camera_to_render_basis();
        assert_eq!(basis.transform_vector3(Vec3::X), Vec3::Y);
        assert_eq!(basis.transform_vector3(Vec3::Y), Vec3::NEG_X);
        assert_eq!(basis.transform_vector3(Vec3::Z), Vec3::Z);
    }

    #[test]
    fn active_world_camera_is_none_before_first_commit() {
        let store = CameraSnapshotStore::new(true);
        assert!(store.active_world_camera().is_none());
    }

    #[test]
    fn active_world_camera_requires_world_binding() {
        let store = CameraSnapshotStore::new(true);
        let screen_cam = CameraId::from_raw(CameraId::BASE);
        store.write_back(
            screen_cam,
            CameraState::new(
                Vec3::ZERO,
                Orientation::IDENTITY,
                CameraKind::from_request(CameraKindRequest::Screen, (1280.0, 720.0)),
            ),
        );
        store.set_active(screen_cam);
        store.swap();

        assert!(store.active_world_camera().is_none());
        assert!(store.active_screen_camera().is_some());
    }

    #[test]
    fn screen_camera_found_independently_of_the_active_id() {
        let store = CameraSnapshotStore::new(true);
        let world_cam = CameraId::from_raw(CameraId::BASE);
        let screen_cam = CameraId::from_raw(CameraId::BASE + 1);
        store.write_back(
            world_cam,
            CameraState::new(
                Vec3::ZERO,
                Orientation::IDENTITY,
                CameraKind::from_request(CameraKindRequest::World, (1280.0, 720.0)),
            ),
        );
        store.write_back(
            screen_cam,
            CameraState::new(
                Vec3::ZERO,
                Orientation::IDENTITY,
                CameraKind::from_request(CameraKindRequest::Screen, (1280.0, 720.0)),
            ),
        );
        store.set_active(world_cam);
        store.swap();

        let (found_world, _) = store.active_world_camera().unwrap();
        let (found_screen, _) = store.active_screen_camera().unwrap();
        assert_eq!(found_world, world_cam);
        assert_eq!(found_screen, screen_cam);
    }
}
