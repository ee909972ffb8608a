//! Fixed-gain LQR controller used as a reference and as a safety baseline

use super::danger::DangerCriterion;
use super::dynamics::step_all;
use crate::infra::{AgentState, Scenario, Vec2, mean_goal_distance};

/// Velocity gain of the reference controller
pub const VELOCITY_GAIN: f32 = 1.732_050_8;

/// `-(p - goal) - √3 v`, the same law the imitation loss uses
pub fn lqr_action(state: &AgentState, goal: Vec2) -> Vec2 {
    let error = state.position() - goal;
    let velocity = state.velocity();
    Vec2::new(
        -(error.x + velocity.x * VELOCITY_GAIN),
        -(error.y + velocity.y * VELOCITY_GAIN),
    )
}

/// How a baseline rollout is run
#[derive(Debug, Clone)]
pub struct LqrBaseline {
    pub time_step: f32,
    pub max_steps: usize,
    /// Stop once the mean goal distance falls below this
    pub stop_distance: f32,
    /// Clamp positions to this box after every step
    pub position_bounds: Option<(f32, f32)>,
    pub criterion: DangerCriterion,
}

/// Per-step safety of a baseline rollout
#[derive(Debug, Clone, Default)]
pub struct BaselineRollout {
    pub final_states: Vec<AgentState>,
    /// Per step, per agent: fraction of safe pairs
    pub safety_ratios: Vec<Vec<f32>>,
}

impl BaselineRollout {
    /// Fraction of agents without any dangerous pair, per step
    pub fn fully_safe_fractions(&self) -> Vec<f32> {
        self.safety_ratios
            .iter()
            .map(|ratios| {
                let safe = ratios.iter().filter(|&&r| r == 1.0).count();
                safe as f32 / ratios.len().max(1) as f32
            })
            .collect()
    }
}

impl LqrBaseline {
    pub fn rollout(&self, scenario: &Scenario) -> BaselineRollout {
        let mut states = scenario.states.clone();
        let goals = &scenario.goals;
        let mut safety_ratios = Vec::new();

        for _ in 0..self.max_steps {
            let actions: Vec<Vec2> = states
                .iter()
                .zip(goals)
                .map(|(state, goal)| lqr_action(state, *goal))
                .collect();
            step_all(&mut states, &actions, self.time_step);

            if let Some((low, high)) = self.position_bounds {
                for state in states.iter_mut() {
                    state.set_position(state.position().clamp(low, high));
                }
            }

            safety_ratios.push(self.criterion.safety_ratios(&states));
            if mean_goal_distance(&states, goals) < self.stop_distance {
                break;
            }
        }

        BaselineRollout {
            final_states: states,
            safety_ratios,
        }
    }
}
