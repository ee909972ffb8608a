//! Initial states and goals for a training iteration or evaluation episode

use rand::Rng;

use super::geometry::circular_formation;
use super::types::{AgentState, Vec2};
use crate::error::SwarmError;

/// Radius of the follower ring laid out by [`formation_scenario`]
pub const FORMATION_START_RADIUS: f32 = 0.1;

/// Agent states and their goals, index-aligned
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    pub states: Vec<AgentState>,
    pub goals: Vec<Vec2>,
}

impl Scenario {
    pub fn num_agents(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Append another group of agents after this one
    pub fn merge(mut self, other: Scenario) -> Scenario {
        self.states.extend(other.states);
        self.goals.extend(other.goals);
        self
    }
}

fn far_from_all(candidate: Vec2, placed: &[Vec2], min_separation: f32) -> bool {
    placed
        .iter()
        .all(|p| p.distance(&candidate) > min_separation)
}

/// Rejection-sample `num_agents` start positions in a square whose side grows
/// with the swarm size, then one goal per agent within ±0.5 of its start.
///
/// Starts are kept pairwise farther apart than `min_separation`, and so are
/// goals (goals are not compared against starts). Sampling retries without
/// bound; callers must keep `min_separation` small relative to the area.
pub fn generate_random_scenario<R: Rng + ?Sized>(
    rng: &mut R,
    num_agents: usize,
    min_separation: f32,
) -> Scenario {
    let side_length = (num_agents as f32 / 8.0).max(1.0).sqrt();

    let mut starts: Vec<Vec2> = Vec::with_capacity(num_agents);
    while starts.len() < num_agents {
        let candidate = Vec2::new(
            rng.random::<f32>() * side_length,
            rng.random::<f32>() * side_length,
        );
        if far_from_all(candidate, &starts, min_separation) {
            starts.push(candidate);
        }
    }

    let mut goals: Vec<Vec2> = Vec::with_capacity(num_agents);
    while goals.len() < num_agents {
        let offset = Vec2::new(rng.random_range(-0.5..0.5), rng.random_range(-0.5..0.5));
        let candidate = starts[goals.len()] + offset;
        if far_from_all(candidate, &goals, min_separation) {
            goals.push(candidate);
        }
    }

    Scenario {
        states: starts.into_iter().map(AgentState::at_rest).collect(),
        goals,
    }
}

/// Leader at the origin heading to a random goal in `[-1, 1]²`, followers on a
/// small ring around it that hold their own start positions as goals.
///
/// `_min_separation` is accepted for symmetry with
/// [`generate_random_scenario`]; the ring layout is fixed.
pub fn formation_scenario<R: Rng + ?Sized>(
    rng: &mut R,
    num_agents: usize,
    _min_separation: f32,
) -> Result<Scenario, SwarmError> {
    if num_agents == 0 {
        // The leader slot must exist before followers can be counted
        return Err(SwarmError::ShapeMismatch {
            expected: 1,
            actual: 0,
        });
    }

    let leader_position = Vec2::default();
    let leader_goal = Vec2::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0));

    let num_followers = num_agents - 1;
    let followers: Vec<Vec2> = circular_formation(num_followers, FORMATION_START_RADIUS)
        .into_iter()
        .map(|p| p + leader_position)
        .collect();
    if followers.len() != num_followers {
        return Err(SwarmError::ShapeMismatch {
            expected: num_followers,
            actual: followers.len(),
        });
    }

    let mut states = Vec::with_capacity(num_agents);
    let mut goals = Vec::with_capacity(num_agents);
    states.push(AgentState::at_rest(leader_position));
    goals.push(leader_goal);
    for follower in followers {
        states.push(AgentState::at_rest(follower));
        goals.push(follower);
    }

    Ok(Scenario { states, goals })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_random_scenario_separation() {
        let mut rng = StdRng::seed_from_u64(7);
        let scenario = generate_random_scenario(&mut rng, 16, 0.1);
        assert_eq!(scenario.num_agents(), 16);
        assert_eq!(scenario.goals.len(), 16);

        let side = 2.0f32.sqrt();
        for (i, a) in scenario.states.iter().enumerate() {
            assert_eq!(a.velocity(), Vec2::default());
            assert!(a.x >= 0.0 && a.x < side && a.y >= 0.0 && a.y < side);
            let goal_offset = scenario.goals[i] - a.position();
            assert!(goal_offset.x.abs() <= 0.5 + 1e-6 && goal_offset.y.abs() <= 0.5 + 1e-6);
            for b in &scenario.states[i + 1..] {
                assert!(a.position().distance(&b.position()) > 0.1);
            }
            for g in &scenario.goals[i + 1..] {
                assert!(scenario.goals[i].distance(g) > 0.1);
            }
        }
    }

    #[test]
    fn test_formation_scenario_layout() {
        let mut rng = StdRng::seed_from_u64(3);
        let scenario = formation_scenario(&mut rng, 5, 0.1).unwrap();
        assert_eq!(scenario.num_agents(), 5);
        assert_eq!(scenario.states[0].position(), Vec2::default());

        let leader_goal = scenario.goals[0];
        assert!(leader_goal.x.abs() <= 1.0 && leader_goal.y.abs() <= 1.0);

        for (state, goal) in scenario.states.iter().zip(&scenario.goals).skip(1) {
            assert_eq!(state.position(), *goal);
            assert!((state.position().norm() - FORMATION_START_RADIUS).abs() < 1e-6);
        }
    }

    #[test]
    fn test_formation_scenario_rejects_empty() {
        let mut rng = StdRng::seed_from_u64(3);
        let result = formation_scenario(&mut rng, 0, 0.1);
        assert!(matches!(result, Err(SwarmError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_merge_keeps_order() {
        let mut rng = StdRng::seed_from_u64(11);
        let formation = formation_scenario(&mut rng, 3, 0.1).unwrap();
        let free = generate_random_scenario(&mut rng, 2, 0.1);
        let leader = formation.states[0];
        let merged = formation.merge(free);
        assert_eq!(merged.num_agents(), 5);
        assert_eq!(merged.states[0], leader);
    }
}
