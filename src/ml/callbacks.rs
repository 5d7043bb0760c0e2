// ============================================================
// Layer 5 — Trainer Callbacks
// ============================================================
// Hooks the Trainer calls at fixed points of every epoch:
//
//   on_train_epoch_start — before the first training batch
//   on_validation_end    — after validation metrics are final
//
// Two callbacks are attached to every run:
//
//   LearningRateMonitor — records `lr-{optimizer}` once per epoch
//   ModelCheckpoint     — keeps the k best checkpoints by a
//                         monitored metric, plus `last.ckpt`

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::domain::traits::CheckpointSource;
use crate::infra::{
    checkpoint::{Admission, CheckpointEntry, CheckpointStore, TopK, LAST_CHECKPOINT},
    logger::RunLogger,
};
use crate::ml::trainer::TrainerState;

pub trait Callback {
    fn on_train_epoch_start(&mut self, _state: &TrainerState, _logger: &RunLogger) -> Result<()> {
        Ok(())
    }

    fn on_validation_end(
        &mut self,
        _state:  &TrainerState,
        _source: &dyn CheckpointSource,
        _logger: &RunLogger,
    ) -> Result<()> {
        Ok(())
    }
}

// ─── LearningRateMonitor ──────────────────────────────────────────────────────
#[derive(Debug, Default)]
pub struct LearningRateMonitor;

impl LearningRateMonitor {
    pub fn new() -> Self {
        Self
    }
}

impl Callback for LearningRateMonitor {
    fn on_train_epoch_start(&mut self, state: &TrainerState, logger: &RunLogger) -> Result<()> {
        let name = format!("lr-{}", state.optimizer_name);
        tracing::debug!("Epoch {}: {name}={:.3e}", state.epoch, state.lr);
        logger.log_metrics(state.global_step, state.epoch, &[(name.as_str(), state.lr)])
    }
}

// ─── ModelCheckpoint ──────────────────────────────────────────────────────────
pub struct ModelCheckpoint {
    store:     CheckpointStore,
    monitor:   String,
    top_k:     TopK,
    save_last: bool,
}

impl ModelCheckpoint {
    pub fn new(dir: impl Into<PathBuf>, monitor: &str, save_top_k: usize, save_last: bool) -> Self {
        Self {
            store:   CheckpointStore::new(dir),
            monitor: monitor.to_string(),
            top_k:   TopK::new(save_top_k),
            save_last,
        }
    }

    /// Retained checkpoints, best first.
    #[cfg(test)]
    pub fn best(&self) -> &[CheckpointEntry] {
        self.top_k.entries()
    }
}

impl Callback for ModelCheckpoint {
    fn on_validation_end(
        &mut self,
        state:  &TrainerState,
        source: &dyn CheckpointSource,
        _logger: &RunLogger,
    ) -> Result<()> {
        let score = state.metric(&self.monitor).with_context(|| {
            format!("ModelCheckpoint monitors '{}' but it was not reported", self.monitor)
        })?;
        let bytes = source.checkpoint_bytes()?;

        let file_name = CheckpointEntry::file_name(state.epoch, state.global_step);
        let candidate = CheckpointEntry {
            epoch: state.epoch,
            step:  state.global_step,
            score,
            path:  self.store.dir().join(&file_name),
        };

        match self.top_k.admit(candidate) {
            Admission::Admitted { evicted } => {
                self.store.write(&file_name, &bytes)?;
                if let Some(old) = evicted {
                    self.store.remove(&old.path)?;
                }
                self.store.write_manifest(self.top_k.entries())?;
                tracing::info!("Saved '{file_name}' ({}={score:.4})", self.monitor);
            }
            Admission::Rejected => {
                tracing::debug!("{}={score:.4} is not in the top {}", self.monitor, self.top_k.entries().len());
            }
        }

        if self.save_last {
            self.store.write(LAST_CHECKPOINT, &bytes)?;
        }
        Ok(())
    }
}
