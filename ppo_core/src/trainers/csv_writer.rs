// CSV scalar logging, one `step,value` file per tag
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::stats::{mean, StatsWriter};

pub struct CsvWriter {
    log_dir: PathBuf,
}

impl CsvWriter {
    pub fn new(log_dir: impl AsRef<Path>) -> io::Result<Self> {
        let log_dir = log_dir.as_ref().to_path_buf();
        fs::create_dir_all(&log_dir)?;
        Ok(Self { log_dir })
    }

    pub fn tag_path(&self, tag: &str) -> PathBuf {
        self.log_dir.join(format!("{}.csv", tag.replace('/', "_")))
    }

    pub fn add_scalar(&self, tag: &str, value: f64, step: u64) -> io::Result<()> {
        let file_path = self.tag_path(tag);
        let file_exists = file_path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;

        if !file_exists {
            writeln!(file, "step,value")?;
        }
        writeln!(file, "{},{}", step, value)
    }

    pub fn write_hyperparameters(&self, hparams: &serde_json::Value) -> io::Result<()> {
        let rendered = serde_json::to_string_pretty(hparams)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(self.log_dir.join("hparams.json"), rendered)
    }
}

impl StatsWriter for CsvWriter {
    fn write(&mut self, stats: &BTreeMap<String, Vec<f32>>, step: u64) -> io::Result<()> {
        for (tag, values) in stats {
            if !values.is_empty() {
                self.add_scalar(tag, mean(values) as f64, step)?;
            }
        }
        Ok(())
    }
}
