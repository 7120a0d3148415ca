// Run orchestration: settings, stats, checkpoints and the training entry point

pub mod checkpoint;
pub mod csv_writer;
pub mod learn;
pub mod settings;
pub mod stats;

pub use checkpoint::{CheckpointError, CheckpointManager, Checkpointable};
pub use csv_writer::CsvWriter;
pub use learn::{get_version_string, run_training, RunFlags};
pub use settings::{ConfigError, TrainingSettings};
pub use stats::{ConsoleWriter, StatsReporter, StatsWriter};
