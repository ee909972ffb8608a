//! Metrics for training and evaluation runs

use std::collections::VecDeque;
use std::time::Instant;

use crate::infra::{AgentState, Vec2};

/// Agents within this distance of their goal count as arrived
pub const ARRIVAL_DISTANCE: f32 = 0.2;

/// Reward granted per fully arrived swarm
pub const ARRIVAL_REWARD: f32 = 10.0;

/// Moving average calculator
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: VecDeque<f32>,
    window_size: usize,
    sum: f32,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.values.len() >= self.window_size {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
    }

    /// Push only present values; absent accuracies mean an empty set
    pub fn push_some(&mut self, value: Option<f32>) {
        if let Some(value) = value {
            self.push(value);
        }
    }

    pub fn average(&self) -> f32 {
        if self.values.is_empty() {
            0.0
        } else {
            self.sum / self.values.len() as f32
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.sum = 0.0;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Loss terms of one rollout step, in reporting order
#[derive(Debug, Clone, Copy, Default)]
pub struct LossTerms {
    pub barrier_dang: f32,
    pub barrier_safe: f32,
    pub deriv_dang: f32,
    pub deriv_safe: f32,
    pub action: f32,
    pub formation: f32,
}

impl LossTerms {
    pub fn to_array(&self) -> [f32; 6] {
        [
            self.barrier_dang,
            self.barrier_safe,
            self.deriv_dang,
            self.deriv_safe,
            self.action,
            self.formation,
        ]
    }
}

/// Accuracies of one rollout step; `None` marks an empty pair set
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accuracies {
    pub barrier_dang: Option<f32>,
    pub barrier_safe: Option<f32>,
    pub deriv_dang: Option<f32>,
    pub deriv_safe: Option<f32>,
}

impl Accuracies {
    pub fn to_array(&self) -> [Option<f32>; 4] {
        [
            self.barrier_dang,
            self.barrier_safe,
            self.deriv_dang,
            self.deriv_safe,
        ]
    }
}

fn averages<const N: usize>(window: usize) -> [MovingAverage; N] {
    std::array::from_fn(|_| MovingAverage::new(window))
}

/// Training metrics tracker, cleared after every report
#[derive(Debug)]
pub struct TrainingMetrics {
    pub losses: [MovingAverage; 6],
    pub accuracies: [MovingAverage; 4],
    /// Fraction of agents without a dangerous pair, learned controller
    pub safety_ratio: MovingAverage,
    /// Same for the LQR baseline rollout
    pub safety_ratio_baseline: MovingAverage,
    /// Mean goal distance at the end of each rollout
    pub dist_error: MovingAverage,
    /// Mean goal distance at the start of each rollout
    pub init_dist_error: MovingAverage,
    pub iteration: usize,
    pub total_steps: usize,
    start_time: Instant,
    last_log_time: Instant,
}

impl TrainingMetrics {
    pub fn new(window_size: usize) -> Self {
        let now = Instant::now();
        Self {
            losses: averages(window_size),
            accuracies: averages(window_size),
            safety_ratio: MovingAverage::new(window_size),
            safety_ratio_baseline: MovingAverage::new(window_size),
            dist_error: MovingAverage::new(window_size),
            init_dist_error: MovingAverage::new(window_size),
            iteration: 0,
            total_steps: 0,
            start_time: now,
            last_log_time: now,
        }
    }

    pub fn record_step(&mut self, losses: &LossTerms, accuracies: &Accuracies, safety_ratio: f32) {
        for (average, value) in self.losses.iter_mut().zip(losses.to_array()) {
            average.push(value);
        }
        for (average, value) in self.accuracies.iter_mut().zip(accuracies.to_array()) {
            average.push_some(value);
        }
        self.safety_ratio.push(safety_ratio);
        self.total_steps += 1;
    }

    pub fn record_rollout(&mut self, init_dist_error: f32, dist_error: f32) {
        self.init_dist_error.push(init_dist_error);
        self.dist_error.push(dist_error);
    }

    pub fn record_baseline(&mut self, fully_safe_fractions: &[f32]) {
        for &fraction in fully_safe_fractions {
            self.safety_ratio_baseline.push(fraction);
        }
    }

    pub fn update_iteration(&mut self, iteration: usize) {
        self.iteration = iteration;
    }

    pub fn training_duration_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn loss_averages(&self) -> [f32; 6] {
        std::array::from_fn(|i| self.losses[i].average())
    }

    pub fn accuracy_averages(&self) -> [f32; 4] {
        std::array::from_fn(|i| self.accuracies[i].average())
    }

    /// Log the current window and start a new one
    pub fn log_to_console(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_log_time).as_secs_f64();

        tracing::info!(
            "Step {} | Rollout steps {} | {:.1}s since last report | {:.0}s total",
            self.iteration,
            self.total_steps,
            elapsed,
            self.training_duration_secs()
        );
        tracing::info!("  Losses: {:?}", self.loss_averages());
        tracing::info!("  Accuracy: {:?}", self.accuracy_averages());
        tracing::info!(
            "  Distance: {:.4} -> {:.4}, Safety: {:.4} (LQR {:.4})",
            self.init_dist_error.average(),
            self.dist_error.average(),
            self.safety_ratio.average(),
            self.safety_ratio_baseline.average()
        );

        self.clear();
        self.last_log_time = now;
    }

    fn clear(&mut self) {
        for average in self.losses.iter_mut().chain(self.accuracies.iter_mut()) {
            average.clear();
        }
        self.safety_ratio.clear();
        self.safety_ratio_baseline.clear();
        self.dist_error.clear();
        self.init_dist_error.clear();
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new(10_000)
    }
}

/// `-(number of unsafe steps)` per agent, averaged over agents.
///
/// `per_step` holds one safe-pair ratio per agent for every step.
pub fn safety_reward(per_step: &[Vec<f32>]) -> f32 {
    let Some(first) = per_step.first() else {
        return 0.0;
    };
    let num_agents = first.len();
    if num_agents == 0 {
        return 0.0;
    }
    let unsafe_steps: usize = per_step
        .iter()
        .map(|ratios| ratios.iter().filter(|&&r| r < 1.0).count())
        .sum();
    -(unsafe_steps as f32) / num_agents as f32
}

/// `ARRIVAL_REWARD` times the fraction of agents near their goal
pub fn distance_reward(states: &[AgentState], goals: &[Vec2]) -> f32 {
    if states.is_empty() {
        return 0.0;
    }
    let arrived = states
        .iter()
        .zip(goals)
        .filter(|(s, g)| s.position().distance(g) < ARRIVAL_DISTANCE)
        .count();
    ARRIVAL_REWARD * arrived as f32 / states.len() as f32
}

/// Per-episode results of the learned controller and the baseline
#[derive(Debug, Clone, Default)]
pub struct EpisodeReport {
    pub safety_rate: f32,
    pub safety_rate_baseline: f32,
    pub safety_reward: f32,
    pub safety_reward_baseline: f32,
    pub dist_reward: f32,
    pub dist_reward_baseline: f32,
    pub init_dist_error: f32,
    pub dist_error: f32,
    pub formation_error: f32,
    pub steps: usize,
}

/// Aggregate over evaluation episodes
#[derive(Debug, Clone, Default)]
pub struct EvaluationMetrics {
    pub episodes: Vec<EpisodeReport>,
    /// Fully-safe fraction per step, learned controller, over all episodes
    pub step_safety: Vec<f32>,
    /// Same for the baseline
    pub step_safety_baseline: Vec<f32>,
    /// Accuracy accumulators in [`Accuracies`] order
    pub accuracy_sums: [f32; 4],
    pub accuracy_counts: [usize; 4],
}

impl EvaluationMetrics {
    pub fn num_episodes(&self) -> usize {
        self.episodes.len()
    }

    pub fn record_accuracies(&mut self, accuracies: &Accuracies) {
        for (i, value) in accuracies.to_array().into_iter().enumerate() {
            if let Some(value) = value {
                self.accuracy_sums[i] += value;
                self.accuracy_counts[i] += 1;
            }
        }
    }

    /// Mean of the recorded accuracies, `None` where none were recorded
    pub fn accuracy(&self) -> [Option<f32>; 4] {
        std::array::from_fn(|i| {
            (self.accuracy_counts[i] > 0)
                .then(|| self.accuracy_sums[i] / self.accuracy_counts[i] as f32)
        })
    }

    pub fn safety_rate(&self) -> f32 {
        mean(&self.step_safety)
    }

    pub fn safety_rate_baseline(&self) -> f32 {
        mean(&self.step_safety_baseline)
    }

    pub fn log_episode(&self, report: &EpisodeReport, total: usize, elapsed_secs: f64) {
        tracing::info!(
            "Evaluation Step: {} | {}, Time: {:.4}",
            self.num_episodes(),
            total,
            elapsed_secs
        );
        tracing::info!(
            "  Safety Rate (Ours): {:.4}, Safety Rate (LQR): {:.4}",
            self.safety_rate(),
            self.safety_rate_baseline()
        );
        tracing::info!(
            "  Rewards: safety {:.2} (LQR {:.2}), distance {:.2} (LQR {:.2})",
            report.safety_reward,
            report.safety_reward_baseline,
            report.dist_reward,
            report.dist_reward_baseline
        );
        tracing::info!("  Formation Error: {:.4}", report.formation_error);
    }

    pub fn log_summary(&self) {
        tracing::info!("Accuracy: {:?}", self.accuracy());
        tracing::info!(
            "Overall safety rate {:.4} (LQR {:.4}) over {} episodes",
            self.safety_rate(),
            self.safety_rate_baseline(),
            self.num_episodes()
        );
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}
