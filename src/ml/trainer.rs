// ============================================================
// Layer 5 — Training Loop
// ============================================================
// A small epoch-driven trainer. It owns the loop and the
// bookkeeping; the Experiment owns the maths.
//
// Per epoch:
//   1. lr = experiment.lr_at(epoch), callbacks see epoch start
//   2. training phase  — Autodiff backend, one optimiser step
//                        per batch, stops early at
//                        limit_train_batches
//   3. validation phase — inner backend (no autodiff graph),
//                        metrics averaged over the split and
//                        reported with a `val_` prefix
//   4. experiment artifacts, then callbacks (checkpointing)
//
// A non-finite training loss aborts the run before the next
// checkpoint is written. So does an image that stopped decoding
// after setup: the data module is checked before every step.
//
// Key Burn insight:
//   - Training batches live on B (Autodiff<...>)
//   - Validation batches live on B::InnerBackend, matching the
//     model returned by `model.valid()`

use anyhow::{bail, Result};
use burn::tensor::backend::AutodiffBackend;
use std::collections::BTreeMap;

use crate::data::{batcher::ImageBatch, datamodule::VaeDataModule};
use crate::domain::{config::TrainerParams, traits::CheckpointSource};
use crate::infra::logger::RunLogger;
use crate::ml::callbacks::Callback;

// ─── Step metrics ─────────────────────────────────────────────────────────────
/// Scalars reported by one training or validation step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepMetrics {
    pub loss: f64,
    extras:   Vec<(&'static str, f64)>,
}

impl StepMetrics {
    pub fn new(loss: f64) -> Self {
        Self { loss, extras: Vec::new() }
    }

    pub fn with(mut self, name: &'static str, value: f64) -> Self {
        self.extras.push((name, value));
        self
    }

    /// `loss` first, then the extras in insertion order.
    pub fn scalars(&self) -> Vec<(&'static str, f64)> {
        std::iter::once(("loss", self.loss))
            .chain(self.extras.iter().copied())
            .collect()
    }
}

/// Running mean of StepMetrics, keyed by metric name.
#[derive(Debug, Default)]
struct MetricMean {
    sums:  Vec<(&'static str, f64)>,
    count: usize,
}

impl MetricMean {
    fn add(&mut self, metrics: &StepMetrics) {
        for (name, value) in metrics.scalars() {
            match self.sums.iter_mut().find(|(n, _)| *n == name) {
                Some((_, sum)) => *sum += value,
                None => self.sums.push((name, value)),
            }
        }
        self.count += 1;
    }

    fn means(&self, prefix: &str) -> Vec<(String, f64)> {
        let n = self.count.max(1) as f64;
        self.sums
            .iter()
            .map(|(name, sum)| (format!("{prefix}{name}"), sum / n))
            .collect()
    }
}

// ─── Experiment contract ──────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
    pub epoch:       usize,
    /// Optimiser steps completed before this one.
    pub global_step: usize,
    pub lr:          f64,
}

/// The training-side contract the Trainer drives.
pub trait Experiment<B: AutodiffBackend>: CheckpointSource {
    /// Forward, loss, backward and one optimiser step.
    fn training_step(&mut self, batch: ImageBatch<B>, ctx: &StepContext) -> Result<StepMetrics>;

    fn on_validation_epoch_start(&mut self) {}

    fn validation_step(&mut self, batch: ImageBatch<B::InnerBackend>) -> Result<StepMetrics>;

    /// Called once validation metrics are final, before callbacks run.
    fn on_validation_epoch_end(&mut self, _epoch: usize, _logger: &RunLogger) -> Result<()> {
        Ok(())
    }

    /// Learning rate for `epoch`.
    fn lr_at(&self, epoch: usize) -> f64;

    fn optimizer_name(&self) -> &str {
        "Adam"
    }
}

// ─── Trainer state ────────────────────────────────────────────────────────────
/// What callbacks can see about the run so far.
#[derive(Debug, Clone, Default)]
pub struct TrainerState {
    pub epoch:          usize,
    pub global_step:    usize,
    pub lr:             f64,
    pub optimizer_name: String,
    /// Latest epoch-level metrics, e.g. `val_loss`.
    pub metrics:        BTreeMap<String, f64>,
}

impl TrainerState {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitSummary {
    pub epochs:      usize,
    pub global_step: usize,
    pub val_loss:    Option<f64>,
}

// ─── Trainer ──────────────────────────────────────────────────────────────────
pub struct Trainer<B: AutodiffBackend> {
    params:    TrainerParams,
    device:    B::Device,
    callbacks: Vec<Box<dyn Callback>>,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(params: TrainerParams, device: B::Device, callbacks: Vec<Box<dyn Callback>>) -> Self {
        if params.devices > 1 {
            tracing::warn!(
                "devices={} requested but multi-device training is not supported; using {:?}",
                params.devices,
                device,
            );
        }
        Self { params, device, callbacks }
    }

    pub fn fit<E: Experiment<B>>(
        &mut self,
        experiment: &mut E,
        data:       &mut VaeDataModule,
        logger:     &RunLogger,
    ) -> Result<FitSummary> {
        data.setup()?;
        let train_loader = data.train_dataloader::<B>(&self.device)?;
        let val_loader   = data.val_dataloader::<B::InnerBackend>(&self.device)?;

        let max_epochs  = self.params.max_epochs;
        let log_every   = self.params.log_every_n_steps.max(1);
        let batch_limit = self.params.limit_train_batches.unwrap_or(usize::MAX);

        let mut state = TrainerState {
            optimizer_name: experiment.optimizer_name().to_string(),
            ..TrainerState::default()
        };

        for epoch in 0..max_epochs {
            state.epoch = epoch;
            state.lr    = experiment.lr_at(epoch);
            data.set_epoch(epoch);
            for callback in self.callbacks.iter_mut() {
                callback.on_train_epoch_start(&state, logger)?;
            }

            // ── Training phase ────────────────────────────────────────────────
            let mut train_mean = MetricMean::default();
            for batch in train_loader.iter().take(batch_limit) {
                data.check_decode()?;
                let ctx = StepContext { epoch, global_step: state.global_step, lr: state.lr };
                let metrics = experiment.training_step(batch, &ctx)?;
                if !metrics.loss.is_finite() {
                    bail!(
                        "Training loss became {} at epoch {epoch}, step {}; aborting",
                        metrics.loss,
                        state.global_step,
                    );
                }
                state.global_step += 1;
                train_mean.add(&metrics);

                if state.global_step % log_every == 0 {
                    logger.log_metrics(state.global_step, epoch, &metrics.scalars())?;
                }
            }
            if train_mean.count == 0 {
                bail!("Training loader produced no batches in epoch {epoch}");
            }

            // ── Validation phase ──────────────────────────────────────────────
            experiment.on_validation_epoch_start();
            let mut val_mean = MetricMean::default();
            for batch in val_loader.iter() {
                data.check_decode()?;
                val_mean.add(&experiment.validation_step(batch)?);
            }

            let val_metrics = val_mean.means("val_");
            let scalars: Vec<(&str, f64)> =
                val_metrics.iter().map(|(n, v)| (n.as_str(), *v)).collect();
            logger.log_metrics(state.global_step, epoch, &scalars)?;
            state.metrics = val_metrics.into_iter().collect();

            experiment.on_validation_epoch_end(epoch, logger)?;
            for callback in self.callbacks.iter_mut() {
                callback.on_validation_end(&state, &*experiment, logger)?;
            }

            let train_loss = train_mean.means("").first().map_or(f64::NAN, |(_, v)| *v);
            println!(
                "Epoch {:>3}/{} | step={} | lr={:.2e} | train_loss={:.4} | val_loss={:.4}",
                epoch + 1,
                max_epochs,
                state.global_step,
                state.lr,
                train_loss,
                state.metric("val_loss").unwrap_or(f64::NAN),
            );
        }

        tracing::info!("Training complete after {} steps", state.global_step);
        Ok(FitSummary {
            epochs:      max_epochs,
            global_step: state.global_step,
            val_loss:    state.metric("val_loss"),
        })
    }
}
