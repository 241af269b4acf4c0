//! The script → native op surface. Every id crosses the boundary
//! as an `f64` (scripts have no integer type); arguments are flattened
//! primitives rather than nested objects, one calling convention
//! applied uniformly across the whole surface.
//!
//! Ops that hand back a `CallbackId` accept the script's callback
//! function as a `v8::Global<v8::Function>` directly; deno_core's op2
//! codegen threads it through without us touching a handle scope here,
//! and we immediately file it into the worker-thread-exclusive
//! [`CallbackRegistry`] keyed by that id.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use bevy::prelude::Vec3;
use deno_core::{op2, v8, OpDecl, OpState};

use bridge_facade::{CameraFacade, EntityFacade};
use bridge_ids::{CallbackId, CameraId, EntityId};
use bridge_state::{CameraKindRequest, Orientation, Rgba8};

/// Persistent script function handles, keyed by the `CallbackId` the
/// facade allocated for them. Lives only in this worker thread's
/// `OpState` and is never shared across threads.
pub type CallbackRegistry = HashMap<u64, v8::Global<v8::Function>>;

fn register_callback(state: &mut OpState, id: CallbackId, callback: v8::Global<v8::Function>) {
    state
        .try_borrow_mut::<CallbackRegistry>()
        .expect("CallbackRegistry not installed")
        .insert(id.raw(), callback);
}

fn color(r: f64, g: f64, b: f64, a: f64) -> Rgba8 {
    Rgba8 {
        r: r.clamp(0.0, 255.0) as u8,
        g: g.clamp(0.0, 255.0) as u8,
        b: b.clamp(0.0, 255.0) as u8,
        a: a.clamp(0.0, 255.0) as u8,
    }
}

fn camera_kind_request(kind: &str) -> CameraKindRequest {
    match kind {
        "screen" => CameraKindRequest::Screen,
        _ => CameraKindRequest::World,
    }
}

#[op2]
fn op_create_mesh(
    state: Rc<RefCell<OpState>>,
    #[string] archetype: String,
    x: f64,
    y: f64,
    z: f64,
    scale: f64,
    r: f64,
    g: f64,
    b: f64,
    a: f64,
    callback: v8::Global<v8::Function>,
) -> f64 {
    let mut state = state.borrow_mut();
    let facade = state.borrow::<Arc<EntityFacade>>().clone();
    let callback_id = facade.create_mesh(
        archetype,
        Vec3::new(x as f32, y as f32, z as f32),
        scale as f32,
        color(r, g, b, a),
    );
    register_callback(&mut state, callback_id, callback);
    callback_id.to_f64()
}

#[op2(fast)]
fn op_update_position(state: Rc<RefCell<OpState>>, id: f64, x: f64, y: f64, z: f64) {
    let facade = state.borrow().borrow::<Arc<EntityFacade>>().clone();
    facade.update_position(EntityId::from_f64(id), Vec3::new(x as f32, y as f32, z as f32));
}

#[op2(fast)]
fn op_move_by(state: Rc<RefCell<OpState>>, id: f64, dx: f64, dy: f64, dz: f64) {
    let facade = state.borrow().borrow::<Arc<EntityFacade>>().clone();
    facade.move_by(EntityId::from_f64(id), Vec3::new(dx as f32, dy as f32, dz as f32));
}

#[op2(fast)]
fn op_update_orientation(state: Rc<RefCell<OpState>>, id: f64, yaw: f64, pitch: f64, roll: f64) {
    let facade = state.borrow().borrow::<Arc<EntityFacade>>().clone();
    facade.update_orientation(
        EntityId::from_f64(id),
        Orientation {
            yaw: yaw as f32,
            pitch: pitch as f32,
            roll: roll as f32,
        },
    );
}

#[op2(fast)]
fn op_update_color(state: Rc<RefCell<OpState>>, id: f64, r: f64, g: f64, b: f64, a: f64) {
    let facade = state.borrow().borrow::<Arc<EntityFacade>>().clone();
    facade.update_color(EntityId::from_f64(id), color(r, g, b, a));
}

#[op2(fast)]
fn op_destroy(state: Rc<RefCell<OpState>>, id: f64) {
    let facade = state.borrow().borrow::<Arc<EntityFacade>>().clone();
    facade.destroy(EntityId::from_f64(id));
}

#[op2]
fn op_create_camera(
    state: Rc<RefCell<OpState>>,
    pos_x: f64,
    pos_y: f64,
    pos_z: f64,
    look_x: f64,
    look_y: f64,
    look_z: f64,
    #[string] kind: String,
    callback: v8::Global<v8::Function>,
) -> f64 {
    let mut state = state.borrow_mut();
    let facade = state.borrow::<Arc<CameraFacade>>().clone();
    let position = Vec3::new(pos_x as f32, pos_y as f32, pos_z as f32);
    let look_at = Vec3::new(look_x as f32, look_y as f32, look_z as f32);
    let orientation = Orientation::looking_at(position, look_at, 0.0);
    let callback_id = facade.create_camera(position, orientation, camera_kind_request(&kind));
    register_callback(&mut state, callback_id, callback);
    callback_id.to_f64()
}

#[op2(fast)]
fn op_move_camera(state: Rc<RefCell<OpState>>, id: f64, x: f64, y: f64, z: f64) {
    let facade = state.borrow().borrow::<Arc<CameraFacade>>().clone();
    facade.move_camera(CameraId::from_f64(id), Vec3::new(x as f32, y as f32, z as f32));
}

#[op2(fast)]
fn op_move_camera_by(state: Rc<RefCell<OpState>>, id: f64, dx: f64, dy: f64, dz: f64) {
    let facade = state.borrow().borrow::<Arc<CameraFacade>>().clone();
    facade.move_camera_by(CameraId::from_f64(id), Vec3::new(dx as f32, dy as f32, dz as f32));
}

#[op2(fast)]
fn op_look_at_camera(state: Rc<RefCell<OpState>>, id: f64, x: f64, y: f64, z: f64) {
    let facade = state.borrow().borrow::<Arc<CameraFacade>>().clone();
    facade.look_at_camera(CameraId::from_f64(id), Vec3::new(x as f32, y as f32, z as f32));
}

#[op2(fast)]
fn op_update_camera_kind(state: Rc<RefCell<OpState>>, id: f64, #[string] kind: String) {
    let facade = state.borrow().borrow::<Arc<CameraFacade>>().clone();
    facade.update_camera_kind(CameraId::from_f64(id), camera_kind_request(&kind));
}

#[op2]
fn op_set_active_camera(
    state: Rc<RefCell<OpState>>,
    id: f64,
    callback: v8::Global<v8::Function>,
) -> f64 {
    let mut state = state.borrow_mut();
    let facade = state.borrow::<Arc<CameraFacade>>().clone();
    let callback_id = facade.set_active_camera(CameraId::from_f64(id));
    register_callback(&mut state, callback_id, callback);
    callback_id.to_f64()
}

#[op2]
fn op_destroy_camera(
    state: Rc<RefCell<OpState>>,
    id: f64,
    callback: v8::Global<v8::Function>,
) -> f64 {
    let mut state = state.borrow_mut();
    let facade = state.borrow::<Arc<CameraFacade>>().clone();
    let callback_id = facade.destroy_camera(CameraId::from_f64(id));
    register_callback(&mut state, callback_id, callback);
    callback_id.to_f64()
}

#[op2(fast)]
fn op_log(#[string] message: String) {
    tracing::info!(target: "scene", "{message}");
}

pub fn ops() -> Vec<OpDecl> {
    vec![
        op_create_mesh(),
        op_update_position(),
        op_move_by(),
        op_update_orientation(),
        op_update_color(),
        op_destroy(),
        op_create_camera(),
        op_move_camera(),
        op_move_camera_by(),
        op_look_at_camera(),
        op_update_camera_kind(),
        op_set_active_camera(),
        op_destroy_camera(),
        op_log(),
    ]
}
