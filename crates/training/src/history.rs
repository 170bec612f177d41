//! Epoch-indexed metric history.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// Metrics recorded at the end of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f32,
    pub train_accuracy: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
}

/// Append-only history produced by the fit loop, one entry per epoch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn epochs(&self) -> &[EpochMetrics] {
        &self.epochs
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// Write the history as JSON lines, one object per epoch.
    pub fn write_jsonl(&self, path: &Path) -> io::Result<()> {
        let mut out = String::new();
        for metrics in &self.epochs {
            out.push_str(&serde_json::to_string(metrics).map_err(io::Error::other)?);
            out.push('\n');
        }
        fs::write(path, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(epoch: usize) -> EpochMetrics {
        EpochMetrics {
            epoch,
            train_loss: 0.5,
            train_accuracy: 0.8,
            val_loss: 0.6,
            val_accuracy: 0.75,
        }
    }

    #[test]
    fn push_appends_in_order() {
        let mut history = TrainingHistory::new();
        history.push(entry(0));
        history.push(entry(1));
        assert_eq!(history.len(), 2);
        assert_eq!(history.epochs()[0].epoch, 0);
        assert_eq!(history.last().unwrap().epoch, 1);
    }

    #[test]
    fn jsonl_round_trips_per_line() -> anyhow::Result<()> {
        let mut history = TrainingHistory::new();
        history.push(entry(0));
        history.push(entry(1));

        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("history.jsonl");
        history.write_jsonl(&path)?;

        let text = std::fs::read_to_string(&path)?;
        let parsed: Vec<EpochMetrics> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(parsed, history.epochs());
        Ok(())
    }
}
