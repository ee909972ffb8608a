//! Shared constants for training, refinement and evaluation

use std::env;
use std::str::FromStr;

use crate::error::SwarmError;

/// Physical and training constants shared by every component
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Integration time step
    pub time_step: f32,
    /// Maximum number of neighbors each agent attends to
    pub top_k: usize,
    /// Neighbors farther than this are masked out
    pub obs_radius: f32,
    /// Safe separation used for training labels
    pub dist_min_thres: f32,
    /// Safe separation used when auditing rollouts
    pub dist_min_check: f32,
    /// Time-to-collision horizon used for training labels
    pub time_to_collision: f32,
    /// Time-to-collision horizon used when auditing rollouts
    pub time_to_collision_check: f32,
    /// Barrier decay rate in `h_next - h + dt * alpha * h >= 0`
    pub alpha_cbf: f32,
    /// Maximum rollout steps per training iteration or evaluation episode
    pub inner_loops: usize,
    /// Gradient steps taken by the safety refinement
    pub refine_loops: usize,
    /// Step size of the safety refinement
    pub refine_learning_rate: f32,
    /// L2 penalty on all network parameters
    pub weight_decay: f32,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            time_step: 0.05,
            top_k: 12,
            obs_radius: 1.0,
            dist_min_thres: 0.07,
            dist_min_check: 0.06,
            time_to_collision: 3.0,
            time_to_collision_check: 2.0,
            alpha_cbf: 1.0,
            inner_loops: 40,
            refine_loops: 40,
            refine_learning_rate: 1.0,
            weight_decay: 1e-8,
        }
    }
}

/// Read an environment variable, parsing it when present.
///
/// Unset variables yield `Ok(None)`; set but unparsable ones are an error.
pub fn env_var<T: FromStr>(key: &str) -> Result<Option<T>, SwarmError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| SwarmError::InvalidConfig {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swarm_config_default() {
        let config = SwarmConfig::default();
        assert_eq!(config.top_k, 12);
        assert!(config.dist_min_check < config.dist_min_thres);
        assert!((config.time_step - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_env_var_parsing() {
        assert!(matches!(env_var::<usize>("SWARM_TEST_UNSET_VARIABLE"), Ok(None)));
    }
}
