// Checkpoint management: numbered checkpoint directories with a retention limit
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;

#[derive(Debug)]
pub enum CheckpointError {
    Io(io::Error),
    /// burn recorder failure.
    Recorder(String),
    /// Metadata could not be (de)serialized.
    Format(String),
    /// Saved network does not match the one being restored.
    Incompatible(String),
    NoCheckpoints,
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "IO error: {}", e),
            CheckpointError::Recorder(e) => write!(f, "recorder error: {}", e),
            CheckpointError::Format(e) => write!(f, "format error: {}", e),
            CheckpointError::Incompatible(e) => write!(f, "incompatible checkpoint: {}", e),
            CheckpointError::NoCheckpoints => write!(f, "no checkpoints found"),
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<io::Error> for CheckpointError {
    fn from(e: io::Error) -> Self {
        CheckpointError::Io(e)
    }
}

pub trait Checkpointable {
    fn save_checkpoint(&self, path: &Path) -> Result<(), CheckpointError>;
    fn load_checkpoint(&mut self, path: &Path) -> Result<(), CheckpointError>;
}

/// Writes `{run_id}-{epoch}` directories and keeps only the newest
/// `keep_checkpoints` of them.
pub struct CheckpointManager {
    checkpoint_dir: PathBuf,
    run_id: String,
    keep_checkpoints: usize,
    pattern: Regex,
}

impl CheckpointManager {
    pub fn new(
        checkpoint_dir: impl Into<PathBuf>,
        run_id: &str,
        keep_checkpoints: usize,
    ) -> Result<Self, CheckpointError> {
        let checkpoint_dir = checkpoint_dir.into();
        fs::create_dir_all(&checkpoint_dir)?;
        let pattern = Regex::new(&format!(r"^{}-(\d+)$", regex::escape(run_id)))
            .map_err(|e| CheckpointError::Format(e.to_string()))?;

        Ok(Self {
            checkpoint_dir,
            run_id: run_id.to_string(),
            keep_checkpoints,
            pattern,
        })
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    pub fn save(
        &self,
        model: &dyn Checkpointable,
        epoch: u64,
    ) -> Result<PathBuf, CheckpointError> {
        let path = self.checkpoint_dir.join(format!("{}-{}", self.run_id, epoch));
        model.save_checkpoint(&path)?;
        log::info!("Checkpoint saved: {}", path.display());
        self.cleanup_old_checkpoints()?;
        Ok(path)
    }

    /// Existing checkpoints, oldest first.
    pub fn list(&self) -> Result<Vec<(u64, PathBuf)>, CheckpointError> {
        let mut checkpoints = Vec::new();
        for entry in fs::read_dir(&self.checkpoint_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let epoch = self
                .pattern
                .captures(name)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok());
            if let Some(epoch) = epoch {
                checkpoints.push((epoch, entry.path()));
            }
        }
        checkpoints.sort_by_key(|(epoch, _)| *epoch);
        Ok(checkpoints)
    }

    pub fn latest(&self) -> Result<(u64, PathBuf), CheckpointError> {
        self.list()?.pop().ok_or(CheckpointError::NoCheckpoints)
    }

    /// Restore `model` from the newest checkpoint and return its epoch.
    pub fn restore_latest(&self, model: &mut dyn Checkpointable) -> Result<u64, CheckpointError> {
        let (epoch, path) = self.latest()?;
        model.load_checkpoint(&path)?;
        log::info!("Resumed from checkpoint {} (epoch {})", path.display(), epoch);
        Ok(epoch)
    }

    fn cleanup_old_checkpoints(&self) -> Result<(), CheckpointError> {
        let checkpoints = self.list()?;
        if checkpoints.len() <= self.keep_checkpoints {
            return Ok(());
        }
        let excess = checkpoints.len() - self.keep_checkpoints;
        for (_, old) in checkpoints.into_iter().take(excess) {
            fs::remove_dir_all(&old)?;
            log::debug!("Removed old checkpoint: {}", old.display());
        }
        Ok(())
    }
}
