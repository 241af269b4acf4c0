//! Procedural generation of the four built-in mesh archetypes.
//! Geometry is a flat, unindexed triangle list — there is no GPU vertex
//! or index buffer here, only the logical vertex data the render crate
//! later uploads; building an actual GPU pipeline is out of scope.

use bevy::prelude::Vec3;

use bridge_state::Rgba8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MeshHandle(pub(crate) u32);

impl MeshHandle {
    pub const INVALID: MeshHandle = MeshHandle(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: Rgba8,
}

pub type VertexList = Vec<Vertex>;

/// Returns the generator function for a known archetype name, or `None`
/// for anything the resource manager doesn't recognize.
pub fn generator_for(archetype: &str) -> Option<fn() -> VertexList> {
    match archetype {
        "cube" => Some(generate_cube as fn() -> VertexList),
        "sphere" => Some(generate_sphere as fn() -> VertexList),
        "grid" => Some(generate_grid as fn() -> VertexList),
        "plane" => Some(generate_plane as fn() -> VertexList),
        _ => None,
    }
}

fn quad(a: Vec3, b: Vec3, c: Vec3, d: Vec3, normal: Vec3, color: Rgba8) -> [Vertex; 6] {
    let v = |p: Vec3| Vertex {
        position: p,
        normal,
        color,
    };
    [v(a), v(b), v(c), v(a), v(c), v(d)]
}

/// Six quads, one per face, each tinted a distinct base color so the
/// faces of the shared unit cube are visually distinguishable.
/// The entity's actual runtime `color` is applied separately by the
/// renderer as a per-instance tint, not baked in here.
fn generate_cube() -> VertexList {
    const FACE_COLORS: [Rgba8; 6] = [
        Rgba8 { r: 220, g: 60, b: 60, a: 255 },  // +X
        Rgba8 { r: 60, g: 220, b: 60, a: 255 },  // +Y
        Rgba8 { r: 60, g: 60, b: 220, a: 255 },  // +Z
        Rgba8 { r: 220, g: 180, b: 60, a: 255 }, // -X
        Rgba8 { r: 60, g: 200, b: 200, a: 255 }, // -Y
        Rgba8 { r: 200, g: 60, b: 200, a: 255 }, // -Z
    ];

    let h = 0.5;
    let faces = [
        ([Vec3::new(h, -h, -h), Vec3::new(h, h, -h), Vec3::new(h, h, h), Vec3::new(h, -h, h)], Vec3::X),
        ([Vec3::new(-h, h, -h), Vec3::new(h, h, -h), Vec3::new(h, h, h), Vec3::new(-h, h, h)], Vec3::Y),
        ([Vec3::new(-h, -h, h), Vec3::new(h, -h, h), Vec3::new(h, h, h), Vec3::new(-h, h, h)], Vec3::Z),
        ([Vec3::new(-h, -h, h), Vec3::new(-h, h, h), Vec3::new(-h, h, -h), Vec3::new(-h, -h, -h)], Vec3::NEG_X),
        ([Vec3::new(-h, -h, h), Vec3::new(h, -h, h), Vec3::new(h, -h, -h), Vec3::new(-h, -h, -h)], Vec3::NEG_Y),
        ([Vec3::new(-h, -h, -h), Vec3::new(h, -h, -h), Vec3::new(h, h, -h), Vec3::new(-h, h, -h)], Vec3::NEG_Z),
    ];

    faces
        .into_iter()
        .zip(FACE_COLORS)
        .flat_map(|(([a, b, c, d], normal), color)| quad(a, b, c, d, normal, color))
        .collect()
}

const SPHERE_LON_SEGMENTS: usize = 32;
const SPHERE_LAT_SEGMENTS: usize = 16;

/// Lat-lon tessellation at 32x16, unit radius, neutral gray shading —
/// entities apply their own color at render time.
fn generate_sphere() -> VertexList {
    let color = Rgba8 {
        r: 200,
        g: 200,
        b: 200,
        a: 255,
    };
    let mut vertices = Vec::with_capacity(SPHERE_LON_SEGMENTS * SPHERE_LAT_SEGMENTS * 6);

    let point = |lat: usize, lon: usize| -> Vec3 {
        let theta = std::f32::consts::PI * lat as f32 / SPHERE_LAT_SEGMENTS as f32;
        let phi = std::f32::consts::TAU * lon as f32 / SPHERE_LON_SEGMENTS as f32;
        Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin()) * 0.5
    };

    for lat in 0..SPHERE_LAT_SEGMENTS {
        for lon in 0..SPHERE_LON_SEGMENTS {
            let p0 = point(lat, lon);
            let p1 = point(lat, lon + 1);
            let p2 = point(lat + 1, lon + 1);
            let p3 = point(lat + 1, lon);
            for (a, b, c) in [(p0, p1, p2), (p0, p2, p3)] {
                let normal = a.normalize_or_zero();
                vertices.push(Vertex { position: a, normal, color });
                vertices.push(Vertex { position: b, normal: b.normalize_or_zero(), color });
                vertices.push(Vertex { position: c, normal: c.normalize_or_zero(), color });
            }
        }
    }
    vertices
}

const GRID_HALF_EXTENT: i32 = 50;
const GRID_LINE_THICKNESS: f32 = 0.02;
const GRID_EMPHASIS_THICKNESS: f32 = 0.05;

/// Crossed axis-aligned boxes in the XZ plane, one unit apart, with
/// every 5th line rendered thicker ("ruled emphasis").
fn generate_grid() -> VertexList {
    let normal_color = Rgba8 { r: 120, g: 120, b: 120, a: 255 };
    let emphasis_color = Rgba8 { r: 220, g: 220, b: 220, a: 255 };
    let mut vertices = Vec::new();

    let mut push_line_box = |center: Vec3, half_extents: Vec3, color: Rgba8| {
        let h = half_extents;
        let a = center + Vec3::new(-h.x, 0.0, -h.z);
        let b = center + Vec3::new(h.x, 0.0, -h.z);
        let c = center + Vec3::new(h.x, 0.0, h.z);
        let d = center + Vec3::new(-h.x, 0.0, h.z);
        vertices.extend(quad(a, b, c, d, Vec3::Y, color));
    };

    for i in -GRID_HALF_EXTENT..=GRID_HALF_EXTENT {
        let emphasized = i % 5 == 0;
        let thickness = if emphasized { GRID_EMPHASIS_THICKNESS } else { GRID_LINE_THICKNESS };
        let color = if emphasized { emphasis_color } else { normal_color };

        push_line_box(
            Vec3::new(i as f32, 0.0, 0.0),
            Vec3::new(thickness, 0.0, GRID_HALF_EXTENT as f32),
            color,
        );
        push_line_box(
            Vec3::new(0.0, 0.0, i as f32),
            Vec3::new(GRID_HALF_EXTENT as f32, 0.0, thickness),
            color,
        );
    }

    vertices
}

/// A single unit quad in the XZ plane, facing +Y.
fn generate_plane() -> VertexList {
    let color = Rgba8 { r: 200, g: 200, b: 200, a: 255 };
    let h = 0.5;
    quad(
        Vec3::new(-h, 0.0, -h),
        Vec3::new(h, 0.0, -h),
        Vec3::new(h, 0.0, h),
        Vec3::new(-h, 0.0, h),
        Vec3::Y,
        color,
    )
    .to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_archetypes_have_no_generator() {
        assert!(generator_for("teapot").is_none());
    }

    #[test]
    fn cube_has_six_faces_of_six_vertices() {
        let vertices = generate_cube();
        assert_eq!(vertices.len(), 36);
    }

    #[test]
    fn sphere_matches_its_lat_lon_tessellation() {
        let vertices = generate_sphere();
        assert_eq!(vertices.len(), SPHERE_LON_SEGMENTS * SPHERE_LAT_SEGMENTS * 6);
    }

    #[test]
    fn grid_emphasizes_every_fifth_line() {
        // sanity: generation completes and produces a non-trivial mesh
        let vertices = generate_grid();
        assert!(!vertices.is_empty());
    }

    #[test]
    fn plane_is_a_single_quad() {
        assert_eq!(generate_plane().len(), 6);
    }
}
