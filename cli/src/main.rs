use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ppo_core::trainers::{get_version_string, run_training, RunFlags, TrainingSettings};

#[derive(Parser, Debug, Clone)]
#[command(name = "ppo-learn", version, about = "Train a PPO agent on CartPole")]
struct Args {
    /// Path to the training configuration YAML file
    #[arg(value_name = "CONFIG")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,

    /// Identifier for the training run (overrides the configuration)
    #[arg(long = "run-id")]
    run_id: Option<String>,

    /// Seed for environment and action sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Total number of epochs to train
    #[arg(long)]
    epochs: Option<u64>,

    /// Results base directory
    #[arg(long = "results-dir")]
    results_dir: Option<PathBuf>,

    /// Continue from the newest checkpoint of this run-id
    #[arg(long, default_value_t = false)]
    resume: bool,

    /// Overwrite this run-id's existing data
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Enable debug-level logging
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Show version information
    Version,
}

impl Args {
    fn validate(&self) -> Result<(), String> {
        if self.resume && self.force {
            return Err("--resume and --force cannot be used together".to_string());
        }
        if self.epochs == Some(0) {
            return Err("--epochs must be at least 1".to_string());
        }
        Ok(())
    }

    fn flags(&self) -> RunFlags {
        RunFlags {
            resume: self.resume,
            force: self.force,
        }
    }

    /// Load the configuration file (or defaults) and apply command-line overrides.
    fn settings(&self) -> Result<TrainingSettings, Box<dyn std::error::Error>> {
        let mut settings = match &self.config_path {
            Some(path) => TrainingSettings::from_yaml(path)?,
            None => TrainingSettings::default(),
        };
        if let Some(run_id) = &self.run_id {
            settings.run_id = run_id.clone();
        }
        if let Some(seed) = self.seed {
            settings.seed = Some(seed);
        }
        if let Some(epochs) = self.epochs {
            settings.hyperparameters.epochs = epochs;
        }
        if let Some(results_dir) = &self.results_dir {
            settings.checkpoint_settings.results_dir = results_dir.clone();
        }
        settings.validate()?;
        Ok(settings)
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(Commands::Version) = args.command {
        println!("{}", get_version_string());
        return Ok(());
    }

    init_logging(args.debug);
    args.validate()?;

    let settings = args.settings()?;
    log::info!("{}", get_version_string());
    log::debug!(
        "Configuration: {}",
        serde_json::to_string_pretty(&settings.as_json())?
    );

    let summaries = run_training(&settings, args.flags())?;
    if let Some(last) = summaries.last() {
        log::info!(
            "Final epoch {}: mean return {:.2} over {} episodes",
            last.epoch,
            last.mean_return,
            last.episodes
        );
    }
    Ok(())
}
