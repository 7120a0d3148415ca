// Training settings loaded from YAML
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
    Invalid { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "could not read settings: {}", e),
            ConfigError::Parse(msg) => write!(f, "could not parse settings: {}", msg),
            ConfigError::Invalid { field, reason } => {
                write!(f, "invalid setting `{}`: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    #[serde(default = "default_run_id")]
    pub run_id: String,
    /// `None` draws a random seed at startup.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub environment: EnvironmentSettings,
    #[serde(default)]
    pub hyperparameters: PpoHyperparameters,
    #[serde(default)]
    pub network_settings: NetworkSettings,
    #[serde(default)]
    pub checkpoint_settings: CheckpointSettings,
}

fn default_run_id() -> String {
    "ppo".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvironmentKind {
    #[serde(rename = "cart_pole")]
    CartPole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSettings {
    #[serde(default = "default_env_kind")]
    pub kind: EnvironmentKind,
    #[serde(default = "default_max_episode_steps")]
    pub max_episode_steps: u32,
}

fn default_env_kind() -> EnvironmentKind {
    EnvironmentKind::CartPole
}

fn default_max_episode_steps() -> u32 {
    200
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PpoHyperparameters {
    #[serde(default = "default_steps_per_epoch")]
    pub steps_per_epoch: usize,
    #[serde(default = "default_epochs")]
    pub epochs: u64,
    #[serde(default = "default_gamma")]
    pub gamma: f32,
    #[serde(default = "default_lam")]
    pub lam: f32,
    #[serde(default = "default_clip_ratio")]
    pub clip_ratio: f32,
    #[serde(default = "default_policy_learning_rate")]
    pub policy_learning_rate: f64,
    #[serde(default = "default_value_function_learning_rate")]
    pub value_function_learning_rate: f64,
    #[serde(default = "default_train_iterations")]
    pub train_policy_iterations: usize,
    #[serde(default = "default_train_iterations")]
    pub train_value_iterations: usize,
    #[serde(default = "default_target_kl")]
    pub target_kl: f32,
}

fn default_steps_per_epoch() -> usize {
    4000
}

fn default_epochs() -> u64 {
    30
}

fn default_gamma() -> f32 {
    0.99
}

fn default_lam() -> f32 {
    0.97
}

fn default_clip_ratio() -> f32 {
    0.2
}

fn default_policy_learning_rate() -> f64 {
    3e-4
}

fn default_value_function_learning_rate() -> f64 {
    1e-3
}

fn default_train_iterations() -> usize {
    80
}

fn default_target_kl() -> f32 {
    0.01
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSettings {
    #[serde(default = "default_hidden_sizes")]
    pub hidden_sizes: Vec<usize>,
}

fn default_hidden_sizes() -> Vec<usize> {
    vec![64, 64]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSettings {
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    /// Epochs between checkpoints.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,
    #[serde(default = "default_keep_checkpoints")]
    pub keep_checkpoints: usize,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_checkpoint_interval() -> u64 {
    10
}

fn default_keep_checkpoints() -> usize {
    5
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            run_id: default_run_id(),
            seed: None,
            environment: EnvironmentSettings::default(),
            hyperparameters: PpoHyperparameters::default(),
            network_settings: NetworkSettings::default(),
            checkpoint_settings: CheckpointSettings::default(),
        }
    }
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            kind: default_env_kind(),
            max_episode_steps: default_max_episode_steps(),
        }
    }
}

impl Default for PpoHyperparameters {
    fn default() -> Self {
        Self {
            steps_per_epoch: default_steps_per_epoch(),
            epochs: default_epochs(),
            gamma: default_gamma(),
            lam: default_lam(),
            clip_ratio: default_clip_ratio(),
            policy_learning_rate: default_policy_learning_rate(),
            value_function_learning_rate: default_value_function_learning_rate(),
            train_policy_iterations: default_train_iterations(),
            train_value_iterations: default_train_iterations(),
            target_kl: default_target_kl(),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            hidden_sizes: default_hidden_sizes(),
        }
    }
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            checkpoint_interval: default_checkpoint_interval(),
            keep_checkpoints: default_keep_checkpoints(),
        }
    }
}

impl TrainingSettings {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run_id.is_empty() || self.run_id.contains(['/', '\\']) {
            return Err(invalid("run_id", format!("`{}` is not a usable directory name", self.run_id)));
        }
        if self.environment.max_episode_steps == 0 {
            return Err(invalid("environment.max_episode_steps", "must be positive"));
        }

        let h = &self.hyperparameters;
        if h.steps_per_epoch == 0 {
            return Err(invalid("hyperparameters.steps_per_epoch", "must be positive"));
        }
        if !(h.gamma > 0.0 && h.gamma <= 1.0) {
            return Err(invalid("hyperparameters.gamma", format!("{} is outside (0, 1]", h.gamma)));
        }
        if !(0.0..=1.0).contains(&h.lam) {
            return Err(invalid("hyperparameters.lam", format!("{} is outside [0, 1]", h.lam)));
        }
        if !(h.clip_ratio > 0.0) {
            return Err(invalid("hyperparameters.clip_ratio", "must be positive"));
        }
        if !(h.policy_learning_rate > 0.0) {
            return Err(invalid("hyperparameters.policy_learning_rate", "must be positive"));
        }
        if !(h.value_function_learning_rate > 0.0) {
            return Err(invalid("hyperparameters.value_function_learning_rate", "must be positive"));
        }
        if !(h.target_kl > 0.0) {
            return Err(invalid("hyperparameters.target_kl", "must be positive"));
        }

        if self.network_settings.hidden_sizes.iter().any(|&w| w == 0) {
            return Err(invalid("network_settings.hidden_sizes", "layer widths must be positive"));
        }

        let c = &self.checkpoint_settings;
        if c.checkpoint_interval == 0 {
            return Err(invalid("checkpoint_settings.checkpoint_interval", "must be positive"));
        }
        if c.keep_checkpoints == 0 {
            return Err(invalid("checkpoint_settings.keep_checkpoints", "must keep at least one"));
        }
        Ok(())
    }

    /// Directory holding everything written for this run.
    pub fn run_dir(&self) -> PathBuf {
        self.checkpoint_settings.results_dir.join(&self.run_id)
    }

    pub fn as_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
