//! Time-to-collision classification of agent pairs into dangerous and safe sets
//!
//! For a pair with relative position `(x, y)` and relative velocity `(vx, vy)`
//! the separation along a straight-line extrapolation satisfies
//! `γ + βt + αt² = r²`, with `α = vx² + vy²`, `β = 2(x·vx + y·vy)` and
//! `γ = x² + y² − r²`. A pair is dangerous when it is already inside the
//! radius (`γ < 0`) or when the quadratic has two positive roots and the first
//! one arrives before the horizon. The root test is done with comparisons only.
//!
//! The tensor form runs on neighbor-pruned tensors inside the training graph.
//! The plain form audits complete rollouts on the host. Both evaluate the same
//! f32 expressions in the same order and classify identically.

use burn::prelude::*;

use super::certificate::CertificateNet;
use super::neighbors::{NeighborSelection, select_neighbors};
use super::tensors::{bool_and, bool_or, identity, relative_states};
use crate::config::SwarmConfig;
use crate::infra::AgentState;

/// Radius and horizon used to label pairs
#[derive(Debug, Clone, Copy)]
pub struct DangerCriterion {
    pub radius: f32,
    pub ttc: f32,
    pub top_k: usize,
}

impl DangerCriterion {
    /// Labels used while training the networks
    pub fn training(config: &SwarmConfig) -> Self {
        Self {
            radius: config.dist_min_thres,
            ttc: config.time_to_collision,
            top_k: config.top_k,
        }
    }

    /// Stricter-radius, shorter-horizon labels used to audit rollouts
    pub fn audit(config: &SwarmConfig) -> Self {
        Self {
            radius: config.dist_min_check,
            ttc: config.time_to_collision_check,
            top_k: config.top_k,
        }
    }

    /// Prune to the same neighbor count as `cbf`
    pub fn matching<B: Backend>(self, cbf: &CertificateNet<B>) -> Self {
        Self {
            top_k: cbf.top_k(),
            ..self
        }
    }

    pub fn mask<B: Backend>(
        &self,
        s: Tensor<B, 2>,
        neighbors: Option<&NeighborSelection<B>>,
    ) -> Tensor<B, 3, Bool> {
        danger_mask(s, self.radius, self.ttc, self.top_k, neighbors)
    }

    pub fn safety_ratios(&self, states: &[AgentState]) -> Vec<f32> {
        safety_ratios(states, self.radius, self.ttc)
    }
}

/// Dangerous-pair mask over the (pruned) neighbor slots, `[n, k, 1]`.
///
/// With `neighbors` the mask covers exactly those slots and `top_k` is
/// ignored.
///
/// The self pair is shifted by one unit in x and y before the test so it is
/// never classified as dangerous.
pub fn danger_mask<B: Backend>(
    s: Tensor<B, 2>,
    r: f32,
    ttc: f32,
    top_k: usize,
    neighbors: Option<&NeighborSelection<B>>,
) -> Tensor<B, 3, Bool> {
    let s = s.detach();
    let [n, _] = s.dims();
    let device = s.device();

    // A supplied selection fixes the slot count
    let top_k = neighbors.map_or(top_k, |selection| selection.slots(n));

    let eye = identity::<B>(n, &device).unsqueeze_dim::<3>(2);
    let s_diff = Tensor::cat(vec![relative_states(s), eye], 2);
    let (s_diff, _) = select_neighbors(s_diff, top_k, neighbors);
    let [n, k, _] = s_diff.dims();

    let channel = |c: usize| s_diff.clone().slice([0..n, 0..k, c..c + 1]);
    let eye = channel(4);
    let x = channel(0) + eye.clone();
    let y = channel(1) + eye;
    let vx = channel(2);
    let vy = channel(3);

    let alpha = vx.clone() * vx.clone() + vy.clone() * vy.clone();
    let beta = (x.clone() * vx + y.clone() * vy).mul_scalar(2.0);
    let gamma = (x.clone() * x + y.clone() * y).sub_scalar(r * r);
    let dist_dangerous = gamma.clone().lower_elem(0.0);

    let discriminant = beta.clone() * beta.clone() - alpha.clone().mul_scalar(4.0) * gamma.clone();
    let has_two_positive_roots = bool_and(
        discriminant.clone().greater_elem(0.0),
        bool_and(gamma.greater_elem(0.0), beta.clone().lower_elem(0.0)),
    );

    let two_alpha_ttc = alpha.mul_scalar(2.0).mul_scalar(ttc);
    let shifted = beta.clone() + two_alpha_ttc.clone();
    let root_less_than_ttc = bool_or(
        (beta.neg() - two_alpha_ttc).lower_elem(0.0),
        (shifted.clone() * shifted).lower(discriminant),
    );

    bool_or(
        dist_dangerous,
        bool_and(has_two_positive_roots, root_less_than_ttc),
    )
}

/// Classify a single ordered pair from its relative state
pub fn pair_is_dangerous(x: f32, y: f32, vx: f32, vy: f32, r: f32, ttc: f32) -> bool {
    let alpha = vx * vx + vy * vy;
    let beta = 2.0 * (x * vx + y * vy);
    let gamma = x * x + y * y - r * r;
    if gamma < 0.0 {
        return true;
    }

    let discriminant = beta * beta - 4.0 * alpha * gamma;
    let has_two_positive_roots = discriminant > 0.0 && gamma > 0.0 && beta < 0.0;
    let shifted = beta + 2.0 * alpha * ttc;
    let root_less_than_ttc = -beta - 2.0 * alpha * ttc < 0.0 || shifted * shifted < discriminant;
    has_two_positive_roots && root_less_than_ttc
}

/// Dangerous-pair mask over the full `n x n` pairing, `mask[i][j]`
pub fn danger_mask_plain(states: &[AgentState], r: f32, ttc: f32) -> Vec<Vec<bool>> {
    states
        .iter()
        .enumerate()
        .map(|(i, a)| {
            states
                .iter()
                .enumerate()
                .map(|(j, b)| {
                    let eye = if i == j { 1.0 } else { 0.0 };
                    pair_is_dangerous(
                        (a.x - b.x) + eye,
                        (a.y - b.y) + eye,
                        a.vx - b.vx,
                        a.vy - b.vy,
                        r,
                        ttc,
                    )
                })
                .collect()
        })
        .collect()
}

/// Per-agent fraction of pairs that are safe
pub fn safety_ratios(states: &[AgentState], r: f32, ttc: f32) -> Vec<f32> {
    let n = states.len() as f32;
    danger_mask_plain(states, r, ttc)
        .iter()
        .map(|row| 1.0 - row.iter().filter(|&&d| d).count() as f32 / n)
        .collect()
}

/// Fraction of agents with no dangerous pair at all
pub fn fully_safe_fraction(states: &[AgentState], r: f32, ttc: f32) -> f32 {
    let ratios = safety_ratios(states, r, ttc);
    if ratios.is_empty() {
        return 1.0;
    }
    ratios.iter().filter(|&&s| s == 1.0).count() as f32 / ratios.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::tensors::{bool_tensor_to_vec, states_to_tensor};
    use crate::infra::Vec2;
    use burn::backend::NdArray;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    type B = NdArray;

    fn random_states(rng: &mut StdRng, n: usize) -> Vec<AgentState> {
        (0..n)
            .map(|_| AgentState {
                x: rng.random_range(0.0..0.6),
                y: rng.random_range(0.0..0.6),
                vx: rng.random_range(-1.0..1.0),
                vy: rng.random_range(-1.0..1.0),
            })
            .collect()
    }

    #[test]
    fn test_inside_radius_is_dangerous() {
        let states = vec![
            AgentState::at_rest(Vec2::new(0.0, 0.0)),
            AgentState::at_rest(Vec2::new(0.05, 0.0)),
            AgentState::at_rest(Vec2::new(3.0, 0.0)),
        ];
        let plain = danger_mask_plain(&states, 0.1, 1.0);
        assert!(plain[0][1] && plain[1][0]);
        assert!(!plain[0][2] && !plain[2][1]);

        let device = Default::default();
        let tensor = danger_mask(states_to_tensor::<B>(&states, &device), 0.1, 1.0, 12, None);
        let tensor = bool_tensor_to_vec(tensor);
        assert!(tensor[1] && tensor[3]);
    }

    #[test]
    fn test_supplied_selection_sets_slot_count() {
        let mut rng = StdRng::seed_from_u64(3);
        let states = random_states(&mut rng, 5);
        let device = Default::default();
        let s = states_to_tensor::<B>(&states, &device);

        let (_, pruned) = select_neighbors(relative_states(s.clone()), 3, None);
        let mask = danger_mask(s.clone(), 0.1, 1.0, 12, Some(&pruned));
        assert_eq!(mask.dims(), [5, 3, 1]);

        let (_, all) = select_neighbors(relative_states(s.clone()), 12, None);
        let mask = danger_mask(s, 0.1, 1.0, 2, Some(&all));
        assert_eq!(mask.dims(), [5, 5, 1]);
    }

    #[test]
    fn test_static_pairs_outside_radius_are_safe() {
        let states = vec![
            AgentState::at_rest(Vec2::new(0.0, 0.0)),
            AgentState::at_rest(Vec2::new(0.2, 0.0)),
            AgentState::at_rest(Vec2::new(0.0, 0.1)),
        ];
        let plain = danger_mask_plain(&states, 0.1, 5.0);
        assert!(plain.iter().flatten().all(|&d| !d));
    }

    #[test]
    fn test_self_pair_is_safe() {
        let states = vec![AgentState { x: 0.3, y: 0.3, vx: 2.0, vy: -1.0 }];
        assert!(!danger_mask_plain(&states, 0.5, 10.0)[0][0]);
    }

    #[test]
    fn test_approach_within_horizon() {
        // Closing at 1.0 from 1.0 apart: contact with r = 0.1 after 0.9
        let states = vec![
            AgentState { x: 0.0, y: 0.0, vx: 0.5, vy: 0.0 },
            AgentState { x: 1.0, y: 0.0, vx: -0.5, vy: 0.0 },
        ];
        assert!(danger_mask_plain(&states, 0.1, 1.0)[0][1]);
        assert!(!danger_mask_plain(&states, 0.1, 0.5)[0][1]);

        // Receding pairs never collide
        let receding = vec![
            AgentState { x: 0.0, y: 0.0, vx: -0.5, vy: 0.0 },
            AgentState { x: 1.0, y: 0.0, vx: 0.5, vy: 0.0 },
        ];
        assert!(!danger_mask_plain(&receding, 0.1, 100.0)[0][1]);
    }

    #[test]
    fn test_tensor_and_plain_forms_agree() {
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..10 {
            let states = random_states(&mut rng, 8);
            let plain: Vec<bool> = danger_mask_plain(&states, 0.1, 0.8)
                .into_iter()
                .flatten()
                .collect();
            let tensor = danger_mask(states_to_tensor::<B>(&states, &device), 0.1, 0.8, 12, None);
            assert_eq!(tensor.dims(), [8, 8, 1]);
            assert_eq!(bool_tensor_to_vec(tensor), plain);
        }
    }

    #[test]
    fn test_pruned_tensor_form_matches_plain_slots() {
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(5);
        let states = random_states(&mut rng, 10);
        let s = states_to_tensor::<B>(&states, &device);

        let (_, selection) =
            select_neighbors(relative_states(s.clone()), 4, None::<&NeighborSelection<B>>);
        let NeighborSelection::TopK(indices) = &selection else {
            panic!("expected pruning");
        };
        let indices: Vec<i64> = indices.clone().into_data().iter::<i64>().collect();

        let tensor = bool_tensor_to_vec(danger_mask(s, 0.15, 1.0, 4, Some(&selection)));
        let plain = danger_mask_plain(&states, 0.15, 1.0);
        for i in 0..10 {
            for slot in 0..4 {
                let j = indices[i * 4 + slot] as usize;
                assert_eq!(tensor[i * 4 + slot], plain[i][j]);
            }
        }
    }

    #[test]
    fn test_safety_ratios() {
        let states = vec![
            AgentState::at_rest(Vec2::new(0.0, 0.0)),
            AgentState::at_rest(Vec2::new(0.05, 0.0)),
            AgentState::at_rest(Vec2::new(3.0, 0.0)),
            AgentState::at_rest(Vec2::new(6.0, 0.0)),
        ];
        let ratios = safety_ratios(&states, 0.1, 1.0);
        assert!((ratios[0] - 0.75).abs() < 1e-6);
        assert!((ratios[2] - 1.0).abs() < 1e-6);
        assert!((fully_safe_fraction(&states, 0.1, 1.0) - 0.5).abs() < 1e-6);
    }
}
