//! Double-integrator point-mass dynamics

use burn::prelude::*;

use crate::infra::{AgentState, Vec2};

/// Time derivative of the state: `[velocity, acceleration]`.
///
/// s: `[n, 4]` states, a: `[n, 2]` accelerations. Returns `[n, 4]`.
pub fn dynamics<B: Backend>(s: Tensor<B, 2>, a: Tensor<B, 2>) -> Tensor<B, 2> {
    let [n, _] = s.dims();
    let velocity = s.slice([0..n, 2..4]);
    Tensor::cat(vec![velocity, a], 1)
}

/// Explicit Euler step `s + dynamics(s, a) * dt`
pub fn integrate<B: Backend>(s: Tensor<B, 2>, a: Tensor<B, 2>, dt: f32) -> Tensor<B, 2> {
    s.clone() + dynamics(s, a).mul_scalar(dt)
}

impl AgentState {
    /// Advance one Euler step under acceleration `accel`
    pub fn step(&self, accel: Vec2, dt: f32) -> AgentState {
        AgentState {
            x: self.x + self.vx * dt,
            y: self.y + self.vy * dt,
            vx: self.vx + accel.x * dt,
            vy: self.vy + accel.y * dt,
        }
    }
}

/// Advance every agent one step in place
pub fn step_all(states: &mut [AgentState], actions: &[Vec2], dt: f32) {
    for (state, accel) in states.iter_mut().zip(actions) {
        *state = state.step(*accel, dt);
    }
}
