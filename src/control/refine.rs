//! Test-time refinement of policy actions against the barrier condition

use burn::module::Module;
use burn::prelude::*;
use burn::tensor::activation::relu;
use burn::tensor::backend::AutodiffBackend;

use super::certificate::{CertificateNet, CertificateOutput};
use super::losses::barrier_derivative;
use crate::config::SwarmConfig;

/// Gradient descent on an additive action residual.
///
/// Each iteration lowers `Σ relu(-deriv)` over slots observed before and after
/// the step. The certificate is frozen; only the residual moves.
#[derive(Debug, Clone)]
pub struct SafetyRefiner {
    pub loops: usize,
    pub learning_rate: f32,
    pub radius: f32,
    pub time_step: f32,
    pub alpha: f32,
}

impl SafetyRefiner {
    pub fn new(config: &SwarmConfig) -> Self {
        Self {
            loops: config.refine_loops,
            learning_rate: config.refine_learning_rate,
            radius: config.dist_min_thres,
            time_step: config.time_step,
            alpha: config.alpha_cbf,
        }
    }

    /// Return `a + residual` after exactly `loops` iterations
    pub fn refine<B: AutodiffBackend>(
        &self,
        cbf: &CertificateNet<B>,
        s: Tensor<B, 2>,
        a: Tensor<B, 2>,
        certificate: &CertificateOutput<B>,
    ) -> Tensor<B, 2> {
        let cbf = cbf.clone().no_grad();
        let s = s.detach();
        let a = a.detach();
        let h = certificate.h.clone().detach();
        let mask = certificate.mask.clone().detach();

        let mut residual = Tensor::<B, 2>::zeros(a.dims(), &a.device());
        for _ in 0..self.loops {
            let leaf = residual.clone().detach().require_grad();
            let (deriv, mask_next) = barrier_derivative(
                &cbf,
                s.clone(),
                a.clone() + leaf.clone(),
                h.clone(),
                &certificate.neighbors,
                self.radius,
                self.time_step,
                self.alpha,
            );
            let violation = relu((deriv * mask.clone() * mask_next).neg()).sum();

            let grads = violation.backward();
            if let Some(grad) = leaf.grad(&grads) {
                residual = residual.detach()
                    - Tensor::<B, 2>::from_inner(grad).mul_scalar(self.learning_rate);
            }
        }

        a + residual.detach()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::certificate::testing::distance_certificate;
    use crate::control::dynamics::step_all;
    use crate::control::policy::{PolicyConfig, PolicyNet};
    use crate::control::tensors::{
        goals_to_tensor, relative_states, states_to_tensor, tensor_to_actions, tensor_to_vec,
    };
    use crate::infra::{AgentState, Vec2};
    use burn::backend::{Autodiff, NdArray};

    type B = Autodiff<NdArray>;

    fn refiner(loops: usize) -> SafetyRefiner {
        SafetyRefiner {
            loops,
            learning_rate: 1.0,
            radius: 0.1,
            time_step: 0.1,
            alpha: 1.0,
        }
    }

    fn pair() -> Vec<AgentState> {
        vec![
            AgentState::at_rest(Vec2::new(0.0, 0.0)),
            AgentState::at_rest(Vec2::new(0.4, 0.0)),
        ]
    }

    #[test]
    fn test_feasible_action_is_a_fixed_point() {
        let device = Default::default();
        let cbf = distance_certificate::<B>(&device, 1.0, 1.0);
        let s = states_to_tensor::<B>(&pair(), &device);
        let certificate = cbf.forward(relative_states(s.clone()), 0.1, None);

        // Equal accelerations leave the relative velocity at zero
        let a = Tensor::<B, 2>::from_floats([[-0.5, 0.2], [-0.5, 0.2]], &device);
        let once = refiner(40).refine(&cbf, s.clone(), a.clone(), &certificate);
        let twice = refiner(40).refine(&cbf, s, once.clone(), &certificate);

        assert_eq!(tensor_to_vec(once.clone()), tensor_to_vec(a));
        assert_eq!(tensor_to_vec(twice), tensor_to_vec(once));
    }

    #[test]
    fn test_zero_loops_returns_input() {
        let device = Default::default();
        let cbf = distance_certificate::<B>(&device, 1.0, 1.0);
        let s = states_to_tensor::<B>(&pair(), &device);
        let certificate = cbf.forward(relative_states(s.clone()), 0.1, None);
        let a = Tensor::<B, 2>::from_floats([[5.0, 0.0], [0.0, 0.0]], &device);

        let refined = refiner(0).refine(&cbf, s, a.clone(), &certificate);
        assert_eq!(tensor_to_vec(refined), tensor_to_vec(a));
    }

    #[test]
    fn test_closing_action_is_slowed() {
        let device = Default::default();
        let cbf = distance_certificate::<B>(&device, 1.0, 1.0);
        let s = states_to_tensor::<B>(&pair(), &device);
        let certificate = cbf.forward(relative_states(s.clone()), 0.1, None);

        // Agent 0 accelerates hard toward agent 1
        let a = Tensor::<B, 2>::from_floats([[5.0, 0.0], [0.0, 0.0]], &device);
        let refined = tensor_to_vec(refiner(100).refine(&cbf, s.clone(), a, &certificate));

        let closing = refined[0] - refined[2];
        assert!(refined[0] < 5.0);
        assert!(refined[2] > 0.0);
        assert!(closing <= 0.31 && closing >= 0.09, "closing = {}", closing);
        assert_eq!(refined[1], 0.0);
        assert_eq!(refined[3], 0.0);

        let refined = Tensor::<B, 1>::from_floats(refined.as_slice(), &device).reshape([2, 2]);
        let (deriv, _) = barrier_derivative(
            &cbf,
            s,
            refined,
            certificate.h.clone(),
            &certificate.neighbors,
            0.1,
            0.1,
            1.0,
        );
        // Off-diagonal slots satisfy the barrier condition after refinement
        let deriv = tensor_to_vec(deriv);
        assert!(deriv[1] >= -1e-4);
        assert!(deriv[2] >= -1e-4);
    }

    #[test]
    fn test_unit_square_step_keeps_separation() {
        let device = Default::default();
        let r = 0.2;
        let dt = 0.1;
        let mut states = vec![
            AgentState::at_rest(Vec2::new(0.0, 0.0)),
            AgentState::at_rest(Vec2::new(1.0, 0.0)),
            AgentState::at_rest(Vec2::new(1.0, 1.0)),
            AgentState::at_rest(Vec2::new(0.0, 1.0)),
        ];
        let goals = vec![
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
        ];

        let cbf = distance_certificate::<B>(&device, 0.0, 1.0);
        let policy = PolicyNet::<B>::new(&device, &PolicyConfig::default());
        let refiner = SafetyRefiner {
            loops: 40,
            learning_rate: 1.0,
            radius: r,
            time_step: dt,
            alpha: 1.0,
        };

        let s = states_to_tensor::<B>(&states, &device);
        let g = goals_to_tensor::<B>(&goals, &device);
        let certificate = cbf.forward(relative_states(s.clone()), r, None);
        let a = policy.forward(s.clone(), g, Some(&certificate.neighbors), None);
        let a = refiner.refine(&cbf, s, a, &certificate);

        step_all(&mut states, &tensor_to_actions(a), dt);
        for (i, p) in states.iter().enumerate() {
            for q in states.iter().skip(i + 1) {
                assert!(p.position().distance(&q.position()) >= r);
            }
        }
    }
}
