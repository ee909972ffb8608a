//! Alternating training of the certificate and the policy

use std::path::Path;

use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::Distribution;
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::baseline::LqrBaseline;
use super::certificate::{CertificateConfig, CertificateNet};
use super::danger::{DangerCriterion, fully_safe_fraction};
use super::dynamics::step_all;
use super::losses::{
    DEFAULT_MARGINS, LossWeights, action_imitation_loss, barrier_loss, derivative_loss,
    formation_loss,
};
use super::metrics::{Accuracies, LossTerms, TrainingMetrics};
use super::model::SwarmModel;
use super::policy::{FormationBias, PolicyConfig, PolicyNet, circle_targets};
use super::tensors::{goals_to_tensor, relative_states, scalar, states_to_tensor, tensor_to_actions};
use crate::config::SwarmConfig;
use crate::error::SwarmError;
use crate::infra::{AgentState, Vec2, generate_random_scenario, mean_goal_distance};

/// Training configuration
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Agents per training scenario
    pub num_agents: usize,
    /// Number of optimizer steps
    pub train_steps: usize,
    pub learning_rate: f64,
    /// Consecutive steps spent on one network before switching
    pub phase_length: usize,
    /// Log every this many steps
    pub display_steps: usize,
    /// Save a checkpoint every this many steps
    pub save_steps: usize,
    pub checkpoint_dir: String,
    /// Probability of perturbing a rollout action
    pub add_noise_prob: f32,
    /// Standard deviation of the perturbation
    pub noise_scale: f32,
    /// Radius of the circle the formation terms pull toward
    pub formation_radius: f32,
    /// Bias the policy toward the formation while training
    pub formation_bias: bool,
    pub seed: Option<u64>,
    pub loss_weights: LossWeights,
    pub swarm: SwarmConfig,
    pub certificate: CertificateConfig,
    pub policy: PolicyConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            num_agents: 16,
            train_steps: 70_000,
            learning_rate: 1e-4,
            phase_length: 10,
            display_steps: 10,
            save_steps: 200,
            checkpoint_dir: "models".to_string(),
            add_noise_prob: 0.05,
            noise_scale: 0.05,
            formation_radius: 0.5,
            formation_bias: true,
            seed: None,
            loss_weights: LossWeights::default(),
            swarm: SwarmConfig::default(),
            certificate: CertificateConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

/// Which network an optimizer step updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    Certificate,
    Policy,
}

impl TrainingPhase {
    /// `phase_length` certificate steps, then `phase_length` policy steps, repeating
    pub fn for_step(step: usize, phase_length: usize) -> Self {
        if (step / phase_length.max(1)) % 2 == 0 {
            TrainingPhase::Certificate
        } else {
            TrainingPhase::Policy
        }
    }
}

/// Losses for one rollout state, still attached to the graph
struct StepLosses<B: Backend> {
    total: Tensor<B, 1>,
    action: Tensor<B, 2>,
    terms: LossTerms,
    accuracies: Accuracies,
}

/// Result of one optimizer step
#[derive(Debug, Clone, Copy)]
pub struct StepReport {
    pub phase: TrainingPhase,
    /// Rollout steps whose gradients were accumulated
    pub rollout_steps: usize,
    pub init_dist_error: f32,
    pub dist_error: f32,
}

/// Mean of the per-state losses of one rollout.
///
/// Rollouts that stop early average over fewer states, so the gradient
/// scale does not depend on the rollout length. `None` for an empty rollout.
fn rollout_objective<B: Backend>(totals: Vec<Tensor<B, 1>>) -> Option<Tensor<B, 1>> {
    if totals.is_empty() {
        return None;
    }
    Some(Tensor::cat(totals, 0).mean())
}

/// Checkpoint path for a given step
pub fn checkpoint_path(dir: &str, step: usize) -> String {
    Path::new(dir)
        .join(format!("model_iter_{}", step))
        .to_string_lossy()
        .into_owned()
}

pub struct SwarmTrainer<B: AutodiffBackend> {
    model: SwarmModel<B>,
    config: TrainConfig,
    device: B::Device,
    rng: StdRng,
    metrics: TrainingMetrics,
}

impl<B: AutodiffBackend> SwarmTrainer<B> {
    pub fn new(device: B::Device, config: TrainConfig) -> Self {
        let model = SwarmModel::new(&device, &config.certificate, &config.policy);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let window = config.display_steps.max(1) * config.swarm.inner_loops.max(1);

        Self {
            model,
            config,
            device,
            rng,
            metrics: TrainingMetrics::new(window),
        }
    }

    /// Start from an existing model, e.g. a restored checkpoint
    pub fn with_model(mut self, model: SwarmModel<B>) -> Self {
        self.model = model;
        self
    }

    pub fn model(&self) -> &SwarmModel<B> {
        &self.model
    }

    pub fn into_model(self) -> SwarmModel<B> {
        self.model
    }

    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    fn optimizer_config(&self) -> AdamConfig {
        AdamConfig::new()
            .with_weight_decay(Some(WeightDecayConfig::new(self.config.swarm.weight_decay)))
    }

    fn formation_bias(&self) -> Option<FormationBias> {
        self.config
            .formation_bias
            .then(|| FormationBias::new(self.config.num_agents, self.config.formation_radius))
    }

    fn compute_losses(&self, states: &[AgentState], goals: &[Vec2]) -> StepLosses<B> {
        let swarm = &self.config.swarm;
        let criterion = DangerCriterion::training(swarm).matching(&self.model.cbf);
        let s = states_to_tensor::<B>(states, &self.device);
        let g = goals_to_tensor::<B>(goals, &self.device);

        let certificate = self
            .model
            .cbf
            .forward(relative_states(s.clone()), criterion.radius, None);
        let bias = self.formation_bias();
        let a = self.model.action.forward(
            s.clone(),
            g.clone(),
            Some(&certificate.neighbors),
            bias.as_ref(),
        );

        let barrier = barrier_loss(
            certificate.h.clone(),
            certificate.mask.clone(),
            s.clone(),
            &criterion,
            Some(&certificate.neighbors),
            DEFAULT_MARGINS,
        );
        let derivative = derivative_loss(
            &self.model.cbf,
            s.clone(),
            a.clone(),
            certificate.h,
            certificate.mask,
            &certificate.neighbors,
            &criterion,
            swarm.time_step,
            swarm.alpha_cbf,
            DEFAULT_MARGINS,
        );

        let desired = circle_targets::<B>(states.len(), self.config.formation_radius, &self.device);
        let loss_action = action_imitation_loss(s.clone(), g, a.clone(), desired.clone());
        let loss_formation = formation_loss(s, desired);

        let terms = LossTerms {
            barrier_dang: scalar(barrier.loss_dang.clone().detach()),
            barrier_safe: scalar(barrier.loss_safe.clone().detach()),
            deriv_dang: scalar(derivative.loss_dang.clone().detach()),
            deriv_safe: scalar(derivative.loss_safe.clone().detach()),
            action: scalar(loss_action.clone().detach()),
            formation: scalar(loss_formation.clone().detach()),
        };
        let accuracies = Accuracies {
            barrier_dang: barrier.acc_dang,
            barrier_safe: barrier.acc_safe,
            deriv_dang: derivative.acc_dang,
            deriv_safe: derivative.acc_safe,
        };
        let total = self
            .config
            .loss_weights
            .total(&barrier, &derivative, loss_action, loss_formation);

        StepLosses {
            total,
            action: a,
            terms,
            accuracies,
        }
    }

    fn perturb(&mut self, action: Tensor<B, 2>) -> Tensor<B, 2> {
        if self.rng.random::<f32>() < self.config.add_noise_prob {
            let noise = Tensor::<B, 2>::random(
                action.dims(),
                Distribution::Normal(0.0, self.config.noise_scale as f64),
                &self.device,
            );
            action + noise
        } else {
            action
        }
    }

    /// Roll out one fresh scenario, averaging the loss over every visited
    /// state, then step the network selected by the step's phase.
    pub fn train_step<OC, OP>(
        &mut self,
        step: usize,
        cbf_optim: &mut OC,
        action_optim: &mut OP,
    ) -> StepReport
    where
        OC: Optimizer<CertificateNet<B>, B>,
        OP: Optimizer<PolicyNet<B>, B>,
    {
        let phase = TrainingPhase::for_step(step, self.config.phase_length);
        let swarm = self.config.swarm.clone();
        let audit = DangerCriterion::audit(&swarm);

        let scenario =
            generate_random_scenario(&mut self.rng, self.config.num_agents, swarm.dist_min_thres);
        let goals = scenario.goals.clone();
        let mut states = scenario.states.clone();
        let init_dist_error = mean_goal_distance(&states, &goals);

        let mut totals = Vec::with_capacity(swarm.inner_loops);

        for _ in 0..swarm.inner_loops {
            let losses = self.compute_losses(&states, &goals);
            totals.push(losses.total);

            let action = self.perturb(losses.action.detach());
            step_all(&mut states, &tensor_to_actions(action), swarm.time_step);

            let safety = fully_safe_fraction(&states, audit.radius, audit.ttc);
            self.metrics
                .record_step(&losses.terms, &losses.accuracies, safety);

            if mean_goal_distance(&states, &goals) < swarm.dist_min_check {
                break;
            }
        }

        let baseline = LqrBaseline {
            time_step: swarm.time_step,
            max_steps: swarm.inner_loops,
            stop_distance: swarm.dist_min_check,
            position_bounds: Some((0.0, 1.0)),
            criterion: audit,
        };
        let rollout = baseline.rollout(&scenario);
        self.metrics.record_baseline(&rollout.fully_safe_fractions());

        let dist_error = mean_goal_distance(&states, &goals);
        self.metrics.record_rollout(init_dist_error, dist_error);

        let rollout_steps = totals.len();
        let learning_rate = self.config.learning_rate;
        if let Some(objective) = rollout_objective(totals) {
            let grads = objective.backward();
            match phase {
                TrainingPhase::Certificate => {
                    let grads = GradientsParams::from_grads(grads, &self.model.cbf);
                    self.model.cbf = cbf_optim.step(learning_rate, self.model.cbf.clone(), grads);
                }
                TrainingPhase::Policy => {
                    let grads = GradientsParams::from_grads(grads, &self.model.action);
                    self.model.action =
                        action_optim.step(learning_rate, self.model.action.clone(), grads);
                }
            }
        }

        StepReport {
            phase,
            rollout_steps,
            init_dist_error,
            dist_error,
        }
    }

    /// Main training loop
    pub fn train(&mut self) -> Result<(), SwarmError> {
        let checkpoint_dir = self.config.checkpoint_dir.clone();
        std::fs::create_dir_all(&checkpoint_dir).map_err(|source| SwarmError::Io {
            path: checkpoint_dir.clone(),
            source,
        })?;

        let mut cbf_optim = self.optimizer_config().init::<B, CertificateNet<B>>();
        let mut action_optim = self.optimizer_config().init::<B, PolicyNet<B>>();

        tracing::info!(
            "Training {} agents for {} steps",
            self.config.num_agents,
            self.config.train_steps
        );

        let train_steps = self.config.train_steps;
        for step in 0..train_steps {
            let report = self.train_step(step, &mut cbf_optim, &mut action_optim);
            tracing::debug!(
                "Step {} {:?}: {} rollout steps, distance {:.4} -> {:.4}",
                step,
                report.phase,
                report.rollout_steps,
                report.init_dist_error,
                report.dist_error
            );

            if step % self.config.display_steps.max(1) == 0 {
                self.metrics.update_iteration(step);
                self.metrics.log_to_console();
            }

            if step % self.config.save_steps.max(1) == 0 || step + 1 == train_steps {
                self.model
                    .save_checkpoint(&checkpoint_path(&checkpoint_dir, step))?;
            }
        }

        tracing::info!("Training complete");
        Ok(())
    }
}
