mod geometry;
mod scenario;
mod types;

pub use geometry::{
    circular_formation, generate_obstacle_circle, generate_obstacle_rectangle, linspace,
};
pub use scenario::{
    FORMATION_START_RADIUS, Scenario, formation_scenario, generate_random_scenario,
};
pub use types::{AgentState, Vec2, flatten_goals, flatten_states, mean_goal_distance};
