//! Training losses for the certificate and the policy
//!
//! Every hinge term is gated by the observation mask, so neighbor slots
//! outside the observation radius never contribute. Denominators carry a
//! `1e-5` offset so an empty set yields a zero loss rather than a division by
//! zero; the matching accuracy is reported as `None`.

use burn::prelude::*;
use burn::tensor::activation::relu;

use super::certificate::CertificateNet;
use super::danger::DangerCriterion;
use super::dynamics::integrate;
use super::neighbors::NeighborSelection;
use super::tensors::{relative_states, scalar, tensor_to_vec};

const SET_OFFSET: f32 = 1e-5;

/// Margins `[dangerous, safe]` for the hinge terms
pub const DEFAULT_MARGINS: [f32; 2] = [1e-3, 0.0];

/// Hinge losses and accuracies over the dangerous and safe pair sets
#[derive(Debug, Clone)]
pub struct SetLoss<B: Backend> {
    pub loss_dang: Tensor<B, 1>,
    pub loss_safe: Tensor<B, 1>,
    /// `None` when no observed pair is dangerous
    pub acc_dang: Option<f32>,
    /// `None` when no observed pair is safe
    pub acc_safe: Option<f32>,
}

/// Relative weights of the loss terms in the total objective
#[derive(Debug, Clone)]
pub struct LossWeights {
    pub barrier_dang: f32,
    pub barrier_safe: f32,
    pub deriv_dang: f32,
    pub deriv_safe: f32,
    pub action: f32,
    pub formation: f32,
    /// Applied to the weighted sum
    pub scale: f32,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            barrier_dang: 2.0,
            barrier_safe: 1.0,
            deriv_dang: 2.0,
            deriv_safe: 1.0,
            action: 0.01,
            formation: 0.1,
            scale: 10.0,
        }
    }
}

impl LossWeights {
    pub fn total<B: Backend>(
        &self,
        barrier: &SetLoss<B>,
        derivative: &SetLoss<B>,
        action: Tensor<B, 1>,
        formation: Tensor<B, 1>,
    ) -> Tensor<B, 1> {
        let total = barrier.loss_dang.clone().mul_scalar(self.barrier_dang)
            + barrier.loss_safe.clone().mul_scalar(self.barrier_safe)
            + derivative.loss_dang.clone().mul_scalar(self.deriv_dang)
            + derivative.loss_safe.clone().mul_scalar(self.deriv_safe)
            + action.mul_scalar(self.action)
            + formation.mul_scalar(self.formation);
        total.mul_scalar(self.scale)
    }
}

/// Fraction of weighted entries that are hits, `None` for an empty set
fn accuracy<B: Backend>(hits: Tensor<B, 3>, weights: Tensor<B, 3>) -> Option<f32> {
    let count = scalar(weights.clone().detach().sum());
    if count > 0.0 {
        Some(scalar((hits * weights).detach().sum()) / count)
    } else {
        None
    }
}

/// Weighted mean of `values`; zero when the weights are all zero
fn masked_mean<B: Backend>(values: Tensor<B, 3>, weights: Tensor<B, 3>) -> Tensor<B, 1> {
    let count = weights.clone().sum().add_scalar(SET_OFFSET);
    (values * weights).sum() / count
}

/// Split observed slots into `(dangerous, safe)` float masks
fn partition<B: Backend>(
    s: Tensor<B, 2>,
    mask: Tensor<B, 3>,
    criterion: &DangerCriterion,
    neighbors: Option<&NeighborSelection<B>>,
) -> (Tensor<B, 3>, Tensor<B, 3>) {
    let mask = mask.detach();
    let dang = criterion.mask(s, neighbors).float();
    let safe = dang.clone().neg().add_scalar(1.0) * mask.clone();
    (dang * mask, safe)
}

/// Penalize `h >= 0` on dangerous pairs and `h <= 0` on safe pairs
pub fn barrier_loss<B: Backend>(
    h: Tensor<B, 3>,
    mask: Tensor<B, 3>,
    s: Tensor<B, 2>,
    criterion: &DangerCriterion,
    neighbors: Option<&NeighborSelection<B>>,
    margins: [f32; 2],
) -> SetLoss<B> {
    let (dang, safe) = partition(s, mask, criterion, neighbors);

    SetLoss {
        loss_dang: masked_mean(relu(h.clone().add_scalar(margins[0])), dang.clone()),
        loss_safe: masked_mean(relu(h.clone().neg().add_scalar(margins[1])), safe.clone()),
        acc_dang: accuracy(h.clone().lower_equal_elem(0.0).float(), dang),
        acc_safe: accuracy(h.greater_elem(0.0).float(), safe),
    }
}

/// Discrete barrier derivative `h(s_next) - h(s) + dt * alpha * h(s)` on the
/// same neighbor slots, plus the observation mask at `s_next`.
pub fn barrier_derivative<B: Backend>(
    cbf: &CertificateNet<B>,
    s: Tensor<B, 2>,
    a: Tensor<B, 2>,
    h: Tensor<B, 3>,
    neighbors: &NeighborSelection<B>,
    r: f32,
    dt: f32,
    alpha: f32,
) -> (Tensor<B, 3>, Tensor<B, 3>) {
    let s_next = integrate(s, a, dt);
    let next = cbf.forward(relative_states(s_next), r, Some(neighbors));
    let deriv = next.h - h.clone() + h.mul_scalar(dt * alpha);
    (deriv, next.mask)
}

/// Penalize a negative barrier derivative on every pair, over slots observed
/// both now and after the step.
///
/// Both sets use the hinge `relu(-d + margin)` and count `d >= 0` as a hit;
/// the sets differ only in their margin and normalization.
pub fn derivative_loss<B: Backend>(
    cbf: &CertificateNet<B>,
    s: Tensor<B, 2>,
    a: Tensor<B, 2>,
    h: Tensor<B, 3>,
    mask: Tensor<B, 3>,
    neighbors: &NeighborSelection<B>,
    criterion: &DangerCriterion,
    dt: f32,
    alpha: f32,
    margins: [f32; 2],
) -> SetLoss<B> {
    let (deriv, mask_next) =
        barrier_derivative(cbf, s.clone(), a, h, neighbors, criterion.radius, dt, alpha);
    let both = mask * mask_next.detach();
    let (dang, safe) = partition(s, both, criterion, Some(neighbors));
    let hits = deriv.clone().greater_equal_elem(0.0).float();

    SetLoss {
        loss_dang: masked_mean(relu(deriv.clone().neg().add_scalar(margins[0])), dang.clone()),
        loss_safe: masked_mean(relu(deriv.neg().add_scalar(margins[1])), safe.clone()),
        acc_dang: accuracy(hits.clone(), dang),
        acc_safe: accuracy(hits, safe),
    }
}

/// Reference action of the fixed LQR controller on `[p - goal, v]`, `[n, 2]`
pub fn reference_action<B: Backend>(s: Tensor<B, 2>, g: Tensor<B, 2>) -> Tensor<B, 2> {
    let [n, _] = s.dims();
    let goal_error = s.clone().slice([0..n, 0..2]) - g;
    let velocity = s.slice([0..n, 2..4]);
    (goal_error + velocity.mul_scalar(3.0f32.sqrt())).neg()
}

/// Mean distance between each agent and its desired formation slot
fn formation_gap<B: Backend>(s: Tensor<B, 2>, desired: Tensor<B, 2>) -> Tensor<B, 1> {
    let [n, _] = s.dims();
    let position = s.slice([0..n, 0..2]);
    let error = position - desired;
    (error.clone() * error).sum_dim(1).sqrt().mean()
}

/// `mean |‖a‖² - ‖a_ref‖²|` plus the mean distance to the desired formation.
///
/// Only magnitudes are matched: a network action pointing away from the
/// reference with the same norm scores zero.
pub fn action_imitation_loss<B: Backend>(
    s: Tensor<B, 2>,
    g: Tensor<B, 2>,
    a: Tensor<B, 2>,
    desired: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let a_ref = reference_action(s.clone(), g);
    let norm_ref = (a_ref.clone() * a_ref).sum_dim(1);
    let norm = (a.clone() * a).sum_dim(1);
    let imitation = (norm - norm_ref).abs().mean();
    imitation + formation_gap(s, desired)
}

/// Mean squared difference between actual and desired pairwise offsets
pub fn formation_loss<B: Backend>(s: Tensor<B, 2>, desired: Tensor<B, 2>) -> Tensor<B, 1> {
    let [n, _] = s.dims();
    let position = s.slice([0..n, 0..2]);
    let actual = relative_states(position);
    let target = relative_states(desired);
    let diff = actual - target;
    (diff.clone() * diff).mean()
}

/// Summary of the barrier derivative over all slots
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivativeStats {
    pub mean: f32,
    pub std: f32,
    /// Fraction of slots with a strictly negative derivative
    pub prob_neg: f32,
}

impl DerivativeStats {
    pub fn from_tensor<B: Backend>(deriv: Tensor<B, 3>) -> Self {
        let values = tensor_to_vec(deriv.detach());
        if values.is_empty() {
            return Self {
                mean: 0.0,
                std: 0.0,
                prob_neg: 0.0,
            };
        }
        let count = values.len() as f32;
        let mean = values.iter().sum::<f32>() / count;
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / count;
        let negatives = values.iter().filter(|&&v| v < 0.0).count() as f32;
        Self {
            mean,
            std: variance.sqrt(),
            prob_neg: negatives / count,
        }
    }
}

/// Diagnostics of the barrier derivative for action `a`
pub fn derivative_statistics<B: Backend>(
    cbf: &CertificateNet<B>,
    s: Tensor<B, 2>,
    a: Tensor<B, 2>,
    h: Tensor<B, 3>,
    neighbors: &NeighborSelection<B>,
    r: f32,
    dt: f32,
    alpha: f32,
) -> DerivativeStats {
    let (deriv, _) = barrier_derivative(cbf, s, a, h, neighbors, r, dt, alpha);
    DerivativeStats::from_tensor(deriv)
}
