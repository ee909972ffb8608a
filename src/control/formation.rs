//! Post-step correction that keeps a formation group around its leader

use crate::infra::{AgentState, Vec2};

/// Projects followers onto a ring around the leader and pushes apart
/// followers that come too close to each other.
///
/// Agent 0 leads; agents `1..members` follow. Followers closer than
/// `radius_min` are moved out to `radius_min`, farther than `radius_max` in to
/// `radius_max`, and anything in between snaps to `desired_radius`.
#[derive(Debug, Clone)]
pub struct FormationKeeper {
    pub desired_radius: f32,
    pub radius_min: f32,
    pub radius_max: f32,
    /// Followers closer than this to each other get pushed apart
    pub min_separation: f32,
    /// Length of each separating push
    pub push: f32,
}

impl FormationKeeper {
    pub fn new(min_separation: f32) -> Self {
        Self {
            desired_radius: 0.5,
            radius_min: 0.4,
            radius_max: 0.6,
            min_separation,
            push: 0.1,
        }
    }

    fn ring_radius(&self, distance: f32) -> f32 {
        if distance < self.radius_min {
            self.radius_min
        } else if distance > self.radius_max {
            self.radius_max
        } else {
            self.desired_radius
        }
    }

    /// Adjust follower positions in place; velocities are left untouched
    pub fn apply(&self, states: &mut [AgentState], members: usize) {
        let members = members.min(states.len());
        if members < 2 {
            return;
        }
        let leader = states[0].position();

        for j in 1..members {
            let follower = states[j].position();
            let direction = follower - leader;
            let distance = direction.norm();
            // A follower on top of the leader has no direction to project along
            if distance > 0.0 {
                let radius = self.ring_radius(distance);
                states[j].set_position(leader + direction * (radius / distance));
            }

            for k in 1..members {
                if k == j {
                    continue;
                }
                let away = follower - states[k].position();
                let gap = away.norm();
                if gap > 0.0 && gap < self.min_separation {
                    let pushed = states[j].position() + away * (self.push / gap);
                    states[j].set_position(pushed);
                }
            }
        }
    }
}

/// Mean distance of the formation group to the leader's goal
pub fn formation_error(states: &[AgentState], members: usize, leader_goal: Vec2) -> f32 {
    let members = members.min(states.len());
    if members == 0 {
        return 0.0;
    }
    let total: f32 = states[..members]
        .iter()
        .map(|s| s.position().distance(&leader_goal))
        .sum();
    total / members as f32
}
