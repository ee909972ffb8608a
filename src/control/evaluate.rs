//! Evaluation episodes comparing the refined learned controller to the LQR baseline

use std::time::Instant;

use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::baseline::LqrBaseline;
use super::certificate::CertificateConfig;
use super::danger::DangerCriterion;
use super::dynamics::{integrate, step_all};
use super::formation::{FormationKeeper, formation_error};
use super::losses::{barrier_loss, derivative_loss, derivative_statistics};
use super::metrics::{Accuracies, EpisodeReport, EvaluationMetrics, distance_reward, safety_reward};
use super::model::{CheckpointScope, SwarmModel};
use super::policy::{FormationBias, PolicyConfig};
use super::refine::SafetyRefiner;
use super::tensors::{goals_to_tensor, relative_states, states_to_tensor, tensor_to_actions};
use crate::config::SwarmConfig;
use crate::error::SwarmError;
use crate::infra::{
    AgentState, Scenario, Vec2, formation_scenario, generate_random_scenario, mean_goal_distance,
};

/// Evaluation configuration
#[derive(Debug, Clone)]
pub struct EvalConfig {
    pub num_agents: usize,
    /// Number of episodes
    pub evaluate_steps: usize,
    /// Checkpoint to restore; a fresh model is evaluated when absent
    pub model_path: Option<String>,
    /// One agent in this many joins the formation group
    pub formation_share: usize,
    /// Start and goal separation as a multiple of the training radius
    pub separation_factor: f32,
    /// Ring radius the policy biases the formation group toward
    pub formation_radius: f32,
    pub seed: Option<u64>,
    pub swarm: SwarmConfig,
    pub certificate: CertificateConfig,
    pub policy: PolicyConfig,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            num_agents: 16,
            evaluate_steps: 5,
            model_path: None,
            formation_share: 4,
            separation_factor: 1.5,
            formation_radius: 0.5,
            seed: None,
            swarm: SwarmConfig::default(),
            certificate: CertificateConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

impl EvalConfig {
    /// Size of the formation group; the rest of the swarm moves independently
    pub fn formation_members(&self) -> usize {
        self.num_agents / self.formation_share.max(1)
    }
}

/// Mixed formation and free-agent scenario plus the formation leader's goal
pub fn evaluation_scenario(
    rng: &mut StdRng,
    config: &EvalConfig,
) -> Result<(Scenario, Option<Vec2>), SwarmError> {
    let members = config.formation_members();
    let separation = config.swarm.dist_min_thres * config.separation_factor;

    let formation = if members > 0 {
        formation_scenario(rng, members, separation)?
    } else {
        Scenario::default()
    };
    let leader_goal = formation.goals.first().copied();
    let others = generate_random_scenario(rng, config.num_agents - members, separation);
    Ok((formation.merge(others), leader_goal))
}

pub struct Evaluator<B: AutodiffBackend> {
    model: SwarmModel<B>,
    config: EvalConfig,
    device: B::Device,
    rng: StdRng,
    refiner: SafetyRefiner,
    keeper: FormationKeeper,
    metrics: EvaluationMetrics,
}

impl<B: AutodiffBackend> Evaluator<B> {
    pub fn new(device: B::Device, config: EvalConfig) -> Result<Self, SwarmError> {
        let mut model = SwarmModel::new(&device, &config.certificate, &config.policy);
        if let Some(path) = &config.model_path {
            model = model.load_checkpoint(path, CheckpointScope::All, &device)?;
        } else {
            tracing::warn!("No model path given, evaluating untrained networks");
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            refiner: SafetyRefiner::new(&config.swarm),
            keeper: FormationKeeper::new(config.swarm.dist_min_check),
            model,
            config,
            device,
            rng,
            metrics: EvaluationMetrics::default(),
        })
    }

    /// Use `model` instead of the one built from the configuration
    pub fn with_model(mut self, model: SwarmModel<B>) -> Self {
        self.model = model;
        self
    }

    pub fn metrics(&self) -> &EvaluationMetrics {
        &self.metrics
    }

    /// Policy action refined against the certificate, plus the accuracies of
    /// the certificate at the resulting next state.
    pub fn refined_action(
        &self,
        states: &[AgentState],
        goals: &[Vec2],
        formation: Option<&FormationBias>,
    ) -> (Vec<Vec2>, Accuracies) {
        let swarm = &self.config.swarm;
        let criterion = DangerCriterion::training(swarm).matching(&self.model.cbf);
        let s = states_to_tensor::<B>(states, &self.device);
        let g = goals_to_tensor::<B>(goals, &self.device);

        let certificate = self
            .model
            .cbf
            .forward(relative_states(s.clone()), criterion.radius, None);
        let a = self.model.action.forward(
            s.clone(),
            g,
            Some(&certificate.neighbors),
            formation,
        );
        let a = self.refiner.refine(&self.model.cbf, s.clone(), a, &certificate);

        let stats = derivative_statistics(
            &self.model.cbf,
            s.clone(),
            a.clone(),
            certificate.h.clone(),
            &certificate.neighbors,
            criterion.radius,
            swarm.time_step,
            swarm.alpha_cbf,
        );
        tracing::debug!(
            "Refined derivative: mean {:.4}, std {:.4}, negative {:.3}",
            stats.mean,
            stats.std,
            stats.prob_neg
        );

        let s_next = integrate(s, a.clone(), swarm.time_step);
        let next = self.model.cbf.forward(
            relative_states(s_next.clone()),
            criterion.radius,
            Some(&certificate.neighbors),
        );
        let barrier = barrier_loss(
            next.h.clone(),
            next.mask.clone(),
            s_next.clone(),
            &criterion,
            Some(&certificate.neighbors),
            [0.0, 0.0],
        );
        let derivative = derivative_loss(
            &self.model.cbf,
            s_next,
            a.clone(),
            next.h,
            next.mask,
            &certificate.neighbors,
            &criterion,
            swarm.time_step,
            swarm.alpha_cbf,
            [0.0, 0.0],
        );

        let accuracies = Accuracies {
            barrier_dang: barrier.acc_dang,
            barrier_safe: barrier.acc_safe,
            deriv_dang: derivative.acc_dang,
            deriv_safe: derivative.acc_safe,
        };
        (tensor_to_actions(a.detach()), accuracies)
    }

    /// Run one episode with both controllers from the same initial scenario
    pub fn run_episode(&mut self) -> Result<EpisodeReport, SwarmError> {
        let swarm = self.config.swarm.clone();
        let audit = DangerCriterion::audit(&swarm);
        let members = self.config.formation_members();
        let bias = (members > 1).then(|| FormationBias::new(members, self.config.formation_radius));

        let (scenario, leader_goal) = evaluation_scenario(&mut self.rng, &self.config)?;
        let goals = scenario.goals.clone();
        let mut states = scenario.states.clone();
        let init_dist_error = mean_goal_distance(&states, &goals);

        let mut per_step = Vec::with_capacity(swarm.inner_loops);
        for _ in 0..swarm.inner_loops {
            let (actions, accuracies) = self.refined_action(&states, &goals, bias.as_ref());
            step_all(&mut states, &actions, swarm.time_step);

            let ratios = audit.safety_ratios(&states);
            let safe = ratios.iter().filter(|&&r| r == 1.0).count();
            self.metrics
                .step_safety
                .push(safe as f32 / ratios.len().max(1) as f32);
            self.metrics.record_accuracies(&accuracies);
            per_step.push(ratios);

            self.keeper.apply(&mut states, members);
        }

        let baseline = LqrBaseline {
            time_step: swarm.time_step,
            max_steps: swarm.inner_loops,
            stop_distance: swarm.dist_min_check / 3.0,
            position_bounds: None,
            criterion: audit,
        };
        let rollout = baseline.rollout(&scenario);
        let baseline_fractions = rollout.fully_safe_fractions();
        self.metrics
            .step_safety_baseline
            .extend(baseline_fractions.iter().copied());

        let steps = per_step.len();
        let report = EpisodeReport {
            safety_rate: mean_of(&per_step_fractions(&per_step)),
            safety_rate_baseline: mean_of(&baseline_fractions),
            safety_reward: safety_reward(&per_step),
            safety_reward_baseline: safety_reward(&rollout.safety_ratios),
            dist_reward: distance_reward(&states, &goals),
            dist_reward_baseline: distance_reward(&rollout.final_states, &goals),
            init_dist_error,
            dist_error: mean_goal_distance(&states, &goals),
            formation_error: leader_goal
                .map(|goal| formation_error(&states, members, goal))
                .unwrap_or(0.0),
            steps,
        };
        Ok(report)
    }

    /// Run all configured episodes
    pub fn run(&mut self) -> Result<&EvaluationMetrics, SwarmError> {
        let total = self.config.evaluate_steps;
        tracing::info!(
            "Evaluating {} agents ({} in formation) over {} episodes",
            self.config.num_agents,
            self.config.formation_members(),
            total
        );

        for _ in 0..total {
            let start = Instant::now();
            let report = self.run_episode()?;
            self.metrics.episodes.push(report.clone());
            self.metrics
                .log_episode(&report, total, start.elapsed().as_secs_f64());
        }

        self.metrics.log_summary();
        Ok(&self.metrics)
    }
}

fn per_step_fractions(per_step: &[Vec<f32>]) -> Vec<f32> {
    per_step
        .iter()
        .map(|ratios| {
            let safe = ratios.iter().filter(|&&r| r == 1.0).count();
            safe as f32 / ratios.len().max(1) as f32
        })
        .collect()
}

fn mean_of(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}
