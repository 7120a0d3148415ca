// Learn module - entry point for a CartPole PPO training run

use std::error::Error;
use std::fs;
use std::path::Path;

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use rand::Rng;

use crate::algorithms::ppo::{
    adam_actor_critic, EpochSummary, PolicyConfig, PpoTrainer, PpoTrainerConfig, TrainError,
};
use crate::env::{CartPole, Environment};
use crate::trainers::checkpoint::{CheckpointError, CheckpointManager};
use crate::trainers::csv_writer::CsvWriter;
use crate::trainers::settings::{EnvironmentKind, TrainingSettings};
use crate::trainers::stats::{ConsoleWriter, StatsReporter};

type TrainingBackend = Autodiff<NdArray>;

const TRAINING_STATUS_FILE_NAME: &str = "training_status.json";
const CONFIGURATION_FILE_NAME: &str = "configuration.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn get_version_string() -> String {
    format!(
        "Version information:\n  \
        ppo_core: {},\n  \
        burn: {}",
        VERSION, "0.18"
    )
}

/// How to treat a run directory left by an earlier run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFlags {
    pub resume: bool,
    pub force: bool,
}

pub fn run_training(
    settings: &TrainingSettings,
    flags: RunFlags,
) -> Result<Vec<EpochSummary>, Box<dyn Error>> {
    settings.validate()?;
    let run_dir = settings.run_dir();
    validate_existing_directories(&run_dir, flags)?;
    fs::create_dir_all(&run_dir)?;

    let seed = settings.seed.unwrap_or_else(|| rand::thread_rng().gen_range(0..10_000));
    log::info!("Run seed: {}", seed);
    write_run_options(&run_dir, settings, seed)?;

    let env = match settings.environment.kind {
        EnvironmentKind::CartPole => CartPole::new(seed, settings.environment.max_episode_steps),
    };
    let h = &settings.hyperparameters;
    let policy_config = PolicyConfig {
        observation_dim: env.observation_dim(),
        num_actions: env.num_actions(),
        hidden_sizes: settings.network_settings.hidden_sizes.clone(),
        clip_ratio: h.clip_ratio,
        policy_learning_rate: h.policy_learning_rate,
        value_function_learning_rate: h.value_function_learning_rate,
    };
    let device = Default::default();
    let policy = adam_actor_critic::<TrainingBackend>(policy_config, &device);

    let csv_writer = CsvWriter::new(run_dir.join("stats"))?;
    csv_writer.write_hyperparameters(&settings.as_json())?;
    let mut stats = StatsReporter::new();
    stats.add_writer(Box::new(ConsoleWriter));
    stats.add_writer(Box::new(csv_writer));

    let checkpoints = CheckpointManager::new(
        run_dir.join("checkpoints"),
        &settings.run_id,
        settings.checkpoint_settings.keep_checkpoints,
    )?;

    let mut trainer = PpoTrainer::new(PpoTrainerConfig::from_settings(settings), env, policy, seed)?
        .with_stats(stats)
        .with_checkpoints(checkpoints);

    if flags.resume {
        match trainer.resume() {
            Ok(epoch) => log::info!("Resuming training from epoch {}", epoch),
            Err(TrainError::Checkpoint(CheckpointError::NoCheckpoints)) => {
                log::warn!("No checkpoint found in {:?}, starting from scratch", run_dir);
            }
            Err(e) => return Err(e.into()),
        }
    }

    let remaining = h.epochs.saturating_sub(trainer.epoch());
    let summaries = trainer.train(remaining)?;
    write_training_status(&run_dir, trainer.epoch())?;
    log::info!("Training completed after {} epochs", trainer.epoch());
    Ok(summaries)
}

fn validate_existing_directories(run_dir: &Path, flags: RunFlags) -> Result<(), Box<dyn Error>> {
    if !run_dir.exists() || flags.resume {
        return Ok(());
    }
    if flags.force {
        log::warn!("Overwriting existing run directory {:?}", run_dir);
        fs::remove_dir_all(run_dir)?;
        return Ok(());
    }
    Err(format!(
        "Directory {:?} already exists. Use --resume to continue training or --force to overwrite.",
        run_dir
    )
    .into())
}

fn write_run_options(
    run_dir: &Path,
    settings: &TrainingSettings,
    seed: u64,
) -> Result<(), Box<dyn Error>> {
    let mut effective = settings.clone();
    effective.seed = Some(seed);
    let yaml_str = serde_yaml::to_string(&effective)?;
    fs::write(run_dir.join(CONFIGURATION_FILE_NAME), yaml_str)?;
    Ok(())
}

fn write_training_status(run_dir: &Path, epoch: u64) -> Result<(), Box<dyn Error>> {
    let status = serde_json::json!({
        "completed": true,
        "epoch": epoch,
        "version": VERSION,
        "timestamp": chrono::Utc::now().to_rfc3339()
    });
    fs::write(
        run_dir.join(TRAINING_STATUS_FILE_NAME),
        serde_json::to_string_pretty(&status)?,
    )?;
    Ok(())
}
