//! Conversions between host-side agent data and tensors, plus small tensor helpers

use burn::prelude::*;
use burn::tensor::ElementConversion;

use crate::infra::{AgentState, Vec2, flatten_goals, flatten_states};

/// Agent states as a `[n, 4]` tensor
pub fn states_to_tensor<B: Backend>(states: &[AgentState], device: &B::Device) -> Tensor<B, 2> {
    let flat = flatten_states(states);
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([states.len(), 4])
}

/// Goal positions as a `[n, 2]` tensor
pub fn goals_to_tensor<B: Backend>(goals: &[Vec2], device: &B::Device) -> Tensor<B, 2> {
    let flat = flatten_goals(goals);
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([goals.len(), 2])
}

/// Points as a `[n, 2]` tensor
pub fn points_to_tensor<B: Backend>(points: &[Vec2], device: &B::Device) -> Tensor<B, 2> {
    goals_to_tensor(points, device)
}

/// Row-major copy of a `[n, 2]` action tensor
pub fn tensor_to_actions<B: Backend>(actions: Tensor<B, 2>) -> Vec<Vec2> {
    let values = tensor_to_vec(actions);
    values
        .chunks_exact(2)
        .map(|a| Vec2::new(a[0], a[1]))
        .collect()
}

pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

pub fn bool_tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D, Bool>) -> Vec<bool> {
    tensor.into_data().iter::<bool>().collect()
}

/// Read a single-element tensor back to the host
pub fn scalar<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> f32 {
    tensor.into_scalar().elem::<f32>()
}

/// `[n, n]` identity matrix
pub fn identity<B: Backend>(n: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut values = vec![0.0f32; n * n];
    for i in 0..n {
        values[i * n + i] = 1.0;
    }
    Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape([n, n])
}

/// Pairwise differences `x[i, j] = s[i] - s[j]` of a `[n, c]` tensor
pub fn relative_states<B: Backend>(s: Tensor<B, 2>) -> Tensor<B, 3> {
    let [n, _] = s.dims();
    let rows = s.clone().unsqueeze_dim::<3>(1).repeat_dim(1, n);
    let cols = s.unsqueeze_dim::<3>(0).repeat_dim(0, n);
    rows - cols
}

/// Euclidean norm over the two position channels of a `[n, k, c]` tensor,
/// with `eps` added to each squared component. Returns `[n, k, 1]`.
pub fn planar_distance<B: Backend>(x: Tensor<B, 3>, eps: f32) -> Tensor<B, 3> {
    let [n, k, _] = x.dims();
    let pos = x.slice([0..n, 0..k, 0..2]);
    (pos.clone() * pos).add_scalar(eps).sum_dim(2).sqrt()
}

/// Element-wise logical and of two boolean tensors
pub fn bool_and<B: Backend, const D: usize>(
    a: Tensor<B, D, Bool>,
    b: Tensor<B, D, Bool>,
) -> Tensor<B, D, Bool> {
    (a.float() * b.float()).greater_elem(0.5)
}

/// Element-wise logical or of two boolean tensors
pub fn bool_or<B: Backend, const D: usize>(
    a: Tensor<B, D, Bool>,
    b: Tensor<B, D, Bool>,
) -> Tensor<B, D, Bool> {
    (a.float() + b.float()).greater_elem(0.5)
}
