//! Value types exchanged across the scripting bridge: entity/camera
//! state, the render-command tagged union and completion
//! tokens. Everything here is plain data — value-semantic and
//! freely copyable; none of it holds a pointer or handle back into
//! the script runtime.

use bevy::prelude::Vec3;

use bridge_ids::{CallbackId, CameraId, EntityId};

/// Yaw/pitch/roll in degrees, matching the script-facing API.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Orientation {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl Orientation {
    pub const IDENTITY: Orientation = Orientation {
        yaw: 0.0,
        pitch: 0.0,
        roll: 0.0,
    };

    /// Yaw/pitch facing `target` from `from`, keeping the existing roll
    /// (right-handed, +Z up). Used by both
    /// `lookAtCamera` and camera creation with a look-at target.
    pub fn looking_at(from: Vec3, target: Vec3, roll: f32) -> Orientation {
        let facing = (target - from).normalize_or_zero();
        Orientation {
            yaw: facing.x.atan2(facing.y).to_degrees(),
            pitch: facing.z.asin().to_degrees(),
            roll,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const WHITE: Rgba8 = Rgba8 {
        r: 255,
        g: 255,
        b: 255,
        a: 255,
    };
}

/// Which camera an entity is rendered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraBinding {
    #[default]
    World,
    Screen,
}

/// One entity's full state.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub position: Vec3,
    pub orientation: Orientation,
    pub color: Rgba8,
    pub radius: f32,
    pub mesh_archetype: String,
    pub camera_binding: CameraBinding,
    pub active: bool,
}

impl EntityState {
    pub fn new(mesh_archetype: impl Into<String>, position: Vec3, radius: f32, color: Rgba8) -> Self {
        Self {
            position,
            orientation: Orientation::IDENTITY,
            color,
            radius,
            mesh_archetype: mesh_archetype.into(),
            camera_binding: CameraBinding::World,
            active: true,
        }
    }
}

/// Which projection a camera uses; `World` cameras default to
/// perspective params, `Screen` cameras to orthographic ones sized from
/// the host window's viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraKindRequest {
    World,
    Screen,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveParams {
    pub fov_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for PerspectiveParams {
    fn default() -> Self {
        Self {
            fov_degrees: 60.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthographicParams {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
}

impl OrthographicParams {
    /// Orthographic bounds sized to a window viewport in pixels, as
    /// dispatched for `"screen"` cameras.
    pub fn from_viewport(width: f32, height: f32) -> Self {
        Self {
            left: 0.0,
            bottom: 0.0,
            right: width,
            top: height,
            near: 0.0,
            far: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraKind {
    Perspective(PerspectiveParams),
    Orthographic(OrthographicParams),
}

impl CameraKind {
    pub fn from_request(kind: CameraKindRequest, viewport_px: (f32, f32)) -> Self {
        match kind {
            CameraKindRequest::World => CameraKind::Perspective(PerspectiveParams::default()),
            CameraKindRequest::Screen => {
                CameraKind::Orthographic(OrthographicParams::from_viewport(viewport_px.0, viewport_px.1))
            }
        }
    }

    pub fn binding(&self) -> CameraBinding {
        match self {
            CameraKind::Perspective(_) => CameraBinding::World,
            CameraKind::Orthographic(_) => CameraBinding::Screen,
        }
    }
}

/// Normalized viewport rectangle, defaulting to the full framebuffer
/// `(0,0,1,1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedViewport {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl Default for NormalizedViewport {
    fn default() -> Self {
        Self {
            left: 0.0,
            bottom: 0.0,
            right: 1.0,
            top: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    pub orientation: Orientation,
    pub kind: CameraKind,
    pub viewport: NormalizedViewport,
    pub active: bool,
}

impl CameraState {
    pub fn new(position: Vec3, orientation: Orientation, kind: CameraKind) -> Self {
        Self {
            position,
            orientation,
            kind,
            viewport: NormalizedViewport::default(),
            active: true,
        }
    }
}

/// Tagged union of everything the script side can submit to the render
/// thread. Every variant carries its target id; the
/// dispatcher is a single match over this tag, never a trait-object
/// hierarchy.
#[derive(Debug, Clone)]
pub enum RenderCommand {
    CreateMesh {
        entity: EntityId,
        archetype: String,
        position: Vec3,
        radius: f32,
        color: Rgba8,
        callback: Option<CallbackId>,
    },
    UpdateEntity {
        entity: EntityId,
        position: Option<Vec3>,
        orientation: Option<Orientation>,
        color: Option<Rgba8>,
    },
    DestroyEntity {
        entity: EntityId,
    },
    CreateCamera {
        camera: CameraId,
        position: Vec3,
        orientation: Orientation,
        kind: CameraKindRequest,
        callback: Option<CallbackId>,
    },
    UpdateCamera {
        camera: CameraId,
        position: Vec3,
        orientation: Orientation,
    },
    UpdateCameraKind {
        camera: CameraId,
        kind: CameraKindRequest,
    },
    SetActiveCamera {
        camera: CameraId,
    },
    DestroyCamera {
        camera: CameraId,
    },
}

/// Completion published from native back to script. `result_id ==
/// 0` signals the operation failed (queue overflow, unknown archetype,
/// unknown id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionToken {
    pub callback: CallbackId,
    pub result_id: u64,
}

impl CompletionToken {
    pub fn success(callback: CallbackId, result_id: u64) -> Self {
        Self { callback, result_id }
    }

    pub fn failure(callback: CallbackId) -> Self {
        Self {
            callback,
            result_id: 0,
        }
    }

    pub fn failed(&self) -> bool {
        self.result_id == 0
    }
}
