use std::env;
use std::str::FromStr;

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use dotenv::dotenv;
use swarm_cbf::SwarmError;
use swarm_cbf::config::env_var;
use swarm_cbf::control::{CheckpointScope, EvalConfig, Evaluator, SwarmTrainer, TrainConfig};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

type Backend = Autodiff<NdArray>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Train,
    Evaluate,
}

impl FromStr for Mode {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "train" => Ok(Mode::Train),
            "evaluate" | "eval" => Ok(Mode::Evaluate),
            _ => Err(()),
        }
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("swarm_cbf=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn train(num_agents: usize, model_path: Option<String>) -> Result<(), SwarmError> {
    let defaults = TrainConfig::default();
    let config = TrainConfig {
        num_agents,
        train_steps: env_var("SWARM_TRAIN_STEPS")?.unwrap_or(defaults.train_steps),
        checkpoint_dir: env::var("SWARM_CHECKPOINT_DIR").unwrap_or(defaults.checkpoint_dir.clone()),
        seed: env_var("SWARM_SEED")?,
        ..defaults
    };

    let device = NdArrayDevice::default();
    let mut trainer = SwarmTrainer::<Backend>::new(device.clone(), config);
    if let Some(path) = model_path {
        let model = trainer
            .model()
            .clone()
            .load_checkpoint(&path, CheckpointScope::All, &device)?;
        trainer = trainer.with_model(model);
    }
    trainer.train()
}

fn evaluate(num_agents: usize, model_path: Option<String>) -> Result<(), SwarmError> {
    let defaults = EvalConfig::default();
    let config = EvalConfig {
        num_agents,
        evaluate_steps: env_var("SWARM_EVALUATE_STEPS")?.unwrap_or(defaults.evaluate_steps),
        model_path,
        seed: env_var("SWARM_SEED")?,
        ..defaults
    };

    let mut evaluator = Evaluator::<Backend>::new(NdArrayDevice::default(), config)?;
    evaluator.run()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let mode_value = env::var("SWARM_MODE").unwrap_or_else(|_| "train".to_string());
    let mode = mode_value.parse::<Mode>().map_err(|_| SwarmError::InvalidConfig {
        key: "SWARM_MODE".to_string(),
        value: mode_value.clone(),
    })?;
    let num_agents: usize = env_var("SWARM_NUM_AGENTS")?.unwrap_or(16);
    let model_path = env::var("SWARM_MODEL_PATH").ok();

    tracing::info!("Mode: {:?}, agents: {}", mode, num_agents);

    match mode {
        Mode::Train => train(num_agents, model_path)?,
        Mode::Evaluate => evaluate(num_agents, model_path)?,
    }

    Ok(())
}
