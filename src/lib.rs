pub mod config;
pub mod control;
pub mod error;
pub mod infra;

// Re-export commonly used types for convenience
pub use config::SwarmConfig;
pub use error::SwarmError;
pub use infra::{AgentState, Scenario, Vec2};
