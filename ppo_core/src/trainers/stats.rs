// Stats aggregation and fan-out to writers
use std::collections::BTreeMap;
use std::io;

/// Collects named scalar series between writes.
///
/// Each `write_stats` call hands the accumulated series to every writer and
/// starts a new window.
#[derive(Default)]
pub struct StatsReporter {
    stats: BTreeMap<String, Vec<f32>>,
    writers: Vec<Box<dyn StatsWriter>>,
}

impl StatsReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_writer(&mut self, writer: Box<dyn StatsWriter>) {
        self.writers.push(writer);
    }

    pub fn add_stat(&mut self, key: &str, value: f32) {
        self.stats.entry(key.to_string()).or_default().push(value);
    }

    pub fn get_stats(&self, key: &str) -> Option<&[f32]> {
        self.stats.get(key).map(Vec::as_slice)
    }

    pub fn write_stats(&mut self, step: u64) -> io::Result<()> {
        for writer in &mut self.writers {
            writer.write(&self.stats, step)?;
        }
        self.stats.clear();
        Ok(())
    }
}

pub trait StatsWriter {
    fn write(&mut self, stats: &BTreeMap<String, Vec<f32>>, step: u64) -> io::Result<()>;
}

pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

/// Logs the mean of every series at `info`.
pub struct ConsoleWriter;

impl StatsWriter for ConsoleWriter {
    fn write(&mut self, stats: &BTreeMap<String, Vec<f32>>, step: u64) -> io::Result<()> {
        let line = stats
            .iter()
            .map(|(key, values)| format!("{}: {:.4}", key, mean(values)))
            .collect::<Vec<_>>()
            .join(", ");
        log::info!("Step {}. {}", step, line);
        Ok(())
    }
}
