//! Decentralized policy network producing per-agent accelerations

use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;

use super::certificate::linear_parameters;
use super::neighbors::{NeighborSelection, select_neighbors};
use super::tensors::{planar_distance, points_to_tensor, relative_states};
use crate::infra::circular_formation;

/// Configuration for the policy network
#[derive(Debug, Config)]
pub struct PolicyConfig {
    /// Width of the pointwise neighbor encoder
    pub encoder_size: usize,
    /// Width of the hidden fully-connected layer
    pub hidden_size: usize,
    /// Smallest feedback gain the network can output
    pub gain_floor: f32,
    /// Range of feedback gains above the floor
    pub gain_span: f32,
    /// Agents closer than this to their goal get zero action
    pub stop_threshold: f32,
    /// Maximum neighbors per agent
    pub top_k: usize,
    /// Neighbors at or beyond this distance are ignored
    pub obs_radius: f32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            encoder_size: 64,
            hidden_size: 64,
            gain_floor: 0.2,
            gain_span: 2.0,
            stop_threshold: 0.05,
            top_k: 12,
            obs_radius: 1.0,
        }
    }
}

/// Pulls the first `members` agents into a circle around agent 0.
///
/// Agent 0 leads; agents `1..members` are assigned evenly spaced points on a
/// circle of `radius` around the leader's current position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormationBias {
    pub members: usize,
    pub radius: f32,
    pub gain: f32,
}

impl FormationBias {
    pub fn new(members: usize, radius: f32) -> Self {
        Self {
            members,
            radius,
            gain: 1.0,
        }
    }
}

#[derive(Module, Debug)]
pub struct PolicyNet<B: Backend> {
    conv_1: Linear<B>,
    fc_1: Linear<B>,
    fc_2: Linear<B>,
    activation: Relu,
    gain_floor: f32,
    gain_span: f32,
    stop_threshold: f32,
    top_k: usize,
    obs_radius: f32,
}

impl<B: Backend> PolicyNet<B> {
    pub fn new(device: &B::Device, config: &PolicyConfig) -> Self {
        Self {
            conv_1: LinearConfig::new(4, config.encoder_size).init(device),
            fc_1: LinearConfig::new(config.encoder_size + 4, config.hidden_size).init(device),
            fc_2: LinearConfig::new(config.hidden_size, 4).init(device),
            activation: Relu::new(),
            gain_floor: config.gain_floor,
            gain_span: config.gain_span,
            stop_threshold: config.stop_threshold,
            top_k: config.top_k,
            obs_radius: config.obs_radius,
        }
    }

    /// Feedback gains `[k1, k2, k3, k4]` per agent, `[n, 4]`
    pub fn gains(
        &self,
        s: Tensor<B, 2>,
        g: Tensor<B, 2>,
        neighbors: Option<&NeighborSelection<B>>,
    ) -> Tensor<B, 2> {
        let [n, _] = s.dims();
        let goal_error = s.clone().slice([0..n, 0..2]) - g;
        let velocity = s.clone().slice([0..n, 2..4]);

        let (x, _) = select_neighbors(relative_states(s), self.top_k, neighbors);
        let dist = planar_distance(x.clone().detach(), 0.0);
        let mask = dist.lower_elem(self.obs_radius).float();

        let encoded = self.activation.forward(self.conv_1.forward(x));
        let [_, _, width] = encoded.dims();
        let pooled = (encoded * mask.repeat_dim(2, width))
            .max_dim(1)
            .reshape([n, width]);

        let features = Tensor::cat(vec![pooled, goal_error, velocity], 1);
        let hidden = self.activation.forward(self.fc_1.forward(features));
        sigmoid(self.fc_2.forward(hidden))
            .mul_scalar(self.gain_span)
            .add_scalar(self.gain_floor)
    }

    /// Accelerations `[n, 2]` for states `s` `[n, 4]` and goals `g` `[n, 2]`.
    ///
    /// Each axis uses linear feedback `-(k_p * (p - goal) + k_v * v)` with
    /// learned gains. Agents within the stop threshold of their goal output
    /// exactly zero.
    pub fn forward(
        &self,
        s: Tensor<B, 2>,
        g: Tensor<B, 2>,
        neighbors: Option<&NeighborSelection<B>>,
        formation: Option<&FormationBias>,
    ) -> Tensor<B, 2> {
        let [n, _] = s.dims();
        let position = s.clone().slice([0..n, 0..2]);
        let goal_error = position.clone() - g.clone();
        let velocity = s.clone().slice([0..n, 2..4]);

        let gains = self.gains(s, g, neighbors);
        let gain = |c: usize| gains.clone().slice([0..n, c..c + 1]);
        let axis = |t: &Tensor<B, 2>, c: usize| t.clone().slice([0..n, c..c + 1]);

        let a_x = (gain(0) * axis(&goal_error, 0) + gain(1) * axis(&velocity, 0)).neg();
        let a_y = (gain(2) * axis(&goal_error, 1) + gain(3) * axis(&velocity, 1)).neg();
        let mut action = Tensor::cat(vec![a_x, a_y], 1);

        if let Some(bias) = formation {
            action = action + formation_correction(position, bias);
        }

        let goal_dist = (goal_error.clone() * goal_error)
            .detach()
            .sum_dim(1)
            .sqrt();
        let moving = goal_dist.greater_elem(self.stop_threshold).float();
        action * moving.repeat_dim(1, 2)
    }

    /// All weights and biases, flattened in layer order
    pub fn flat_parameters(&self) -> Vec<f32> {
        [&self.conv_1, &self.fc_1, &self.fc_2]
            .into_iter()
            .flat_map(linear_parameters)
            .collect()
    }
}

/// Desired formation offsets from the leader, `[n, 2]`, zero outside the group
fn formation_offsets(n: usize, bias: &FormationBias) -> (Vec<f32>, Vec<f32>) {
    let members = bias.members.min(n);
    let mut offsets = vec![0.0; n * 2];
    let mut weights = vec![0.0; n * 2];
    for (i, p) in circular_formation(members.saturating_sub(1), bias.radius)
        .iter()
        .enumerate()
    {
        let row = (i + 1) * 2;
        offsets[row] = p.x;
        offsets[row + 1] = p.y;
        weights[row] = 1.0;
        weights[row + 1] = 1.0;
    }
    (offsets, weights)
}

/// Proportional term steering each follower toward its slot around the leader
pub fn formation_correction<B: Backend>(position: Tensor<B, 2>, bias: &FormationBias) -> Tensor<B, 2> {
    let [n, _] = position.dims();
    let device = position.device();
    let (offsets, weights) = formation_offsets(n, bias);
    let offsets = Tensor::<B, 1>::from_floats(offsets.as_slice(), &device).reshape([n, 2]);
    let weights = Tensor::<B, 1>::from_floats(weights.as_slice(), &device).reshape([n, 2]);

    let leader = position.clone().slice([0..1, 0..2]).detach().repeat_dim(0, n);
    let desired = leader + offsets;
    (desired - position).mul_scalar(bias.gain) * weights
}

/// Desired absolute positions for a whole swarm arranged on a circle, `[n, 2]`
pub fn circle_targets<B: Backend>(n: usize, radius: f32, device: &B::Device) -> Tensor<B, 2> {
    points_to_tensor(&circular_formation(n, radius), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::tensors::{goals_to_tensor, states_to_tensor, tensor_to_vec};
    use crate::infra::{AgentState, Vec2};
    use burn::backend::NdArray;

    type B = NdArray;

    fn scene() -> (Vec<AgentState>, Vec<Vec2>) {
        let states = vec![
            AgentState { x: 0.0, y: 0.0, vx: 0.0, vy: 0.0 },
            AgentState { x: 0.4, y: 0.1, vx: 0.0, vy: 0.0 },
            AgentState { x: 0.2, y: 0.6, vx: 0.0, vy: 0.0 },
            AgentState { x: 1.0, y: 1.0, vx: 0.0, vy: 0.0 },
        ];
        let goals = vec![
            Vec2::new(1.0, 1.0),
            Vec2::new(-0.5, 0.3),
            Vec2::new(0.2, 0.0),
            Vec2::new(1.02, 1.0),
        ];
        (states, goals)
    }

    #[test]
    fn test_action_shape_and_stop_mask() {
        let device = Default::default();
        let net = PolicyNet::<B>::new(&device, &PolicyConfig::default());
        let (states, goals) = scene();

        let a = net.forward(
            states_to_tensor::<B>(&states, &device),
            goals_to_tensor::<B>(&goals, &device),
            None,
            None,
        );
        assert_eq!(a.dims(), [4, 2]);
        let a = tensor_to_vec(a);
        // Agent 3 is 0.02 from its goal
        assert_eq!(&a[6..8], &[0.0, 0.0]);
    }

    #[test]
    fn test_gains_are_bounded() {
        let device = Default::default();
        let config = PolicyConfig::default();
        let net = PolicyNet::<B>::new(&device, &config);
        let (states, goals) = scene();

        let gains = tensor_to_vec(net.gains(
            states_to_tensor::<B>(&states, &device),
            goals_to_tensor::<B>(&goals, &device),
            None,
        ));
        assert_eq!(gains.len(), 16);
        for k in gains {
            assert!(k >= config.gain_floor && k <= config.gain_floor + config.gain_span);
        }
    }

    #[test]
    fn test_agents_at_rest_accelerate_toward_goal() {
        let device = Default::default();
        let net = PolicyNet::<B>::new(&device, &PolicyConfig::default());
        let (states, goals) = scene();

        let a = tensor_to_actions_of(&net, &states, &goals, &device);
        for i in 0..3 {
            let to_goal = goals[i] - states[i].position();
            assert!(a[i].x * to_goal.x >= 0.0);
            assert!(a[i].y * to_goal.y >= 0.0);
            assert!(a[i].norm() > 0.0);
        }
    }

    fn tensor_to_actions_of(
        net: &PolicyNet<B>,
        states: &[AgentState],
        goals: &[Vec2],
        device: &<B as Backend>::Device,
    ) -> Vec<Vec2> {
        crate::control::tensors::tensor_to_actions(net.forward(
            states_to_tensor::<B>(states, device),
            goals_to_tensor::<B>(goals, device),
            None,
            None,
        ))
    }

    #[test]
    fn test_formation_correction_points_toward_slot() {
        let device = Default::default();
        let position = Tensor::<B, 2>::from_floats([[0.0, 0.0], [0.0, 0.0], [2.0, 2.0]], &device);
        let bias = FormationBias::new(2, 0.5);
        let correction = tensor_to_vec(formation_correction(position, &bias));

        // Leader and non-members are untouched
        assert_eq!(&correction[0..2], &[0.0, 0.0]);
        assert_eq!(&correction[4..6], &[0.0, 0.0]);
        // The single follower's slot is at angle 0 on the circle
        assert!((correction[2] - 0.5).abs() < 1e-6);
        assert!(correction[3].abs() < 1e-6);
    }

    #[test]
    fn test_circle_targets() {
        let device = Default::default();
        let targets = tensor_to_vec(circle_targets::<B>(4, 0.5, &device));
        assert_eq!(targets.len(), 8);
        assert!((targets[0] - 0.5).abs() < 1e-6);
    }
}
