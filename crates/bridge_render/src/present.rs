//! The hand-off point between the bridge and an actual GPU backend.
//!
//! The render loop wants to render world entities, then screen
//! entities, then present debug overlays and the console, but the
//! shader/texture pipeline and the debug-draw primitives are both
//! explicit non-goals of this crate — they are owned by whatever
//! renderer embeds `RenderLoop`. `FramePresenter` is that seam: the loop
//! hands it the derived camera and draw list for each pass and a stub
//! implementation is used when nothing else is wired in.

use std::sync::Arc;

use bevy::prelude::Vec3;

use bridge_ids::EntityId;
use bridge_snapshot::DerivedCamera;
use bridge_state::{Orientation, Rgba8};

use crate::VertexList;

/// One entity's worth of what a backend needs to draw it: its shared
/// geometry plus the per-instance transform and tint that are kept out
/// of that shared geometry.
pub struct DrawItem {
    pub entity: EntityId,
    pub vertices: Arc<VertexList>,
    pub position: Vec3,
    pub orientation: Orientation,
    pub radius: f32,
    pub color: Rgba8,
}

/// Implemented by whatever owns the GPU backend. `RenderLoop` calls
/// these once per frame, world then screen then overlay; the default
/// [`NoopPresenter`] makes the crate buildable and testable with no
/// backend at all.
pub trait FramePresenter: Send + Sync + 'static {
    fn present_world(&mut self, camera: DerivedCamera, items: &[DrawItem]);
    fn present_screen(&mut self, camera: DerivedCamera, items: &[DrawItem]);
    /// Debug overlays and the developer console are both non-goals of
    /// this crate; this hook exists purely so a host renderer has
    /// somewhere to plug them in after the scene has been submitted.
    fn present_overlay(&mut self) {}
}

#[derive(Default)]
pub struct NoopPresenter;

impl FramePresenter for NoopPresenter {
    fn present_world(&mut self, _camera: DerivedCamera, _items: &[DrawItem]) {}
    fn present_screen(&mut self, _camera: DerivedCamera, _items: &[DrawItem]) {}
}
