//! Learned decentralized control with a neural control barrier certificate
//!
//! Two networks share the neighbor structure of the swarm:
//! - Certificate: scores every (agent, neighbor) pair, negative when dangerous
//! - Policy: per-agent accelerations from a pooled neighbor encoding
//!
//! Training alternates between them. At run time the policy action is refined
//! by gradient steps that push the discrete barrier derivative above zero.
//!
//! # Architecture
//!
//! ```text
//! AgentState[] + goals
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  relative_states + select_neighbors                         │
//! │  - Pairwise differences s_i - s_j                           │
//! │  - Top-K nearest slots, reused for the next state           │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CertificateNet                                             │
//! │  - h: [n, k, 1], masked beyond the observation radius       │
//! │  PolicyNet                                                  │
//! │  - a: [n, 2], zero within the stop threshold                │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ├──────────── training ───────────┐
//!     ▼                                 ▼
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │  SafetyRefiner            │   │  losses                   │
//! │  - a + a_res with         │   │  - barrier, derivative    │
//! │    h' - h + dt·α·h >= 0   │   │  - imitation, formation   │
//! └───────────────────────────┘   └───────────────────────────┘
//!     │                                 │
//!     ▼                                 ▼
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │  step_all (Euler)         │   │  SwarmTrainer             │
//! │  danger audit, keeper     │   │  - alternating Adam steps │
//! └───────────────────────────┘   └───────────────────────────┘
//! ```

// Plain host-side modules
pub mod baseline;
pub mod formation;
pub mod metrics;

// Tensor modules
pub mod certificate;
pub mod danger;
pub mod dynamics;
pub mod evaluate;
pub mod losses;
pub mod model;
pub mod neighbors;
pub mod policy;
pub mod refine;
pub mod tensors;
pub mod train;

pub use baseline::{BaselineRollout, LqrBaseline, lqr_action};
pub use certificate::{CertificateConfig, CertificateNet, CertificateOutput};
pub use danger::{
    DangerCriterion, danger_mask, danger_mask_plain, fully_safe_fraction, pair_is_dangerous,
    safety_ratios,
};
pub use dynamics::{dynamics, integrate, step_all};
pub use evaluate::{EvalConfig, Evaluator};
pub use formation::{FormationKeeper, formation_error};
pub use losses::{
    DerivativeStats, LossWeights, SetLoss, action_imitation_loss, barrier_derivative,
    barrier_loss, derivative_loss, derivative_statistics, formation_loss,
};
pub use metrics::{EpisodeReport, EvaluationMetrics, MovingAverage, TrainingMetrics};
pub use model::{CheckpointScope, SwarmModel};
pub use neighbors::{NeighborSelection, select_neighbors};
pub use policy::{FormationBias, PolicyConfig, PolicyNet};
pub use refine::SafetyRefiner;
pub use train::{SwarmTrainer, TrainConfig, TrainingPhase};
