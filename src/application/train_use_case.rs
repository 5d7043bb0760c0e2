// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one training run in order:
//
//   Step 1: Create the versioned run directory  (Layer 6 - infra)
//   Step 2: Record the hyperparameters           (Layer 6 - infra)
//   Step 3: Seed every random source             (Layer 6 - infra)
//   Step 4: Build the model from the registry    (Layer 5 - ml)
//   Step 5: Wrap it in an experiment + optimiser (Layer 5 - ml)
//   Step 6: Prepare the data module              (Layer 4 - data)
//   Step 7: Attach LR monitor + checkpointing    (Layer 5 - ml)
//   Step 8: Build the trainer                    (Layer 5 - ml)
//   Step 9: Create the artifact directories      (Layer 6 - infra)
//   Step 10: Run training to completion          (Layer 5 - ml)
//
// The backend is picked once from `trainer_params.accelerator`,
// before the run directory exists; everything after that is
// generic over it.
//
//   cpu   NdArray
//   gpu   WGPU discrete GPU 0, an error if it has no adapter
//   auto  WGPU default device, NdArray if it has no adapter

use anyhow::{bail, Result};
use burn::{
    backend::{
        ndarray::NdArrayDevice,
        wgpu::WgpuDevice,
        Autodiff, NdArray, Wgpu,
    },
    tensor::{backend::AutodiffBackend, Tensor},
};
use std::{panic::AssertUnwindSafe, path::PathBuf};

use crate::data::datamodule::VaeDataModule;
use crate::domain::config::{Accelerator, RunConfig};
use crate::infra::{logger::RunLogger, output_dirs::prepare_output_dirs, seed::seed_everything};
use crate::ml::{
    callbacks::{Callback, LearningRateMonitor, ModelCheckpoint},
    experiment::{configure_optimizer, VaeExperiment},
    registry::build_model,
    trainer::{FitSummary, Trainer},
};

const CHECKPOINT_DIR: &str = "checkpoints";
const MONITOR: &str = "val_loss";
const SAVE_TOP_K: usize = 2;

/// Where a finished run left its artifacts, and how it ended.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub log_dir: PathBuf,
    pub summary: FitSummary,
}

/// Backend a run resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendChoice {
    NdArray,
    Wgpu(WgpuDevice),
}

/// Resolve the accelerator to a backend. `adapter_available` reports
/// whether WGPU can open a device.
pub fn select_backend(
    accelerator:       Accelerator,
    adapter_available: impl Fn(&WgpuDevice) -> bool,
) -> Result<BackendChoice> {
    match accelerator {
        Accelerator::Cpu => Ok(BackendChoice::NdArray),
        Accelerator::Gpu => {
            let device = WgpuDevice::DiscreteGpu(0);
            if !adapter_available(&device) {
                bail!("accelerator 'gpu' requested but WGPU has no adapter for {device:?}");
            }
            Ok(BackendChoice::Wgpu(device))
        }
        Accelerator::Auto => {
            let device = WgpuDevice::default();
            if adapter_available(&device) {
                Ok(BackendChoice::Wgpu(device))
            } else {
                tracing::warn!("No WGPU adapter available; falling back to the NdArray CPU backend");
                Ok(BackendChoice::NdArray)
            }
        }
    }
}

/// WGPU panics when it cannot find an adapter, on first use of the
/// device. Touch the device once and report whether that worked.
fn wgpu_adapter_available(device: &WgpuDevice) -> bool {
    std::panic::catch_unwind(AssertUnwindSafe(|| {
        Tensor::<Wgpu, 1>::zeros([1], device).into_data();
    }))
    .is_ok()
}

pub struct TrainUseCase {
    config: RunConfig,
}

impl TrainUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Run on the backend selected by the config.
    pub fn execute(&self) -> Result<RunOutcome> {
        match select_backend(self.config.trainer_params.accelerator, wgpu_adapter_available)? {
            BackendChoice::NdArray => {
                tracing::info!("Using NdArray CPU backend");
                self.run::<Autodiff<NdArray>>(NdArrayDevice::Cpu)
            }
            BackendChoice::Wgpu(device) => {
                tracing::info!("Using WGPU device: {:?}", device);
                self.run::<Autodiff<Wgpu>>(device)
            }
        }
    }

    pub fn run<B: AutodiffBackend>(&self, device: B::Device) -> Result<RunOutcome> {
        let cfg  = &self.config;
        let name = cfg.run_name();

        // ── Step 1: Versioned run directory ───────────────────────────────────
        let logger = RunLogger::create(&cfg.logging_params.save_dir, name)?;

        // ── Step 2: Hyperparameters ───────────────────────────────────────────
        logger.log_hyperparams(cfg)?;

        // ── Step 3: Seeding ───────────────────────────────────────────────────
        // Must precede model construction: parameter initialisers draw
        // from the backend generator.
        let seeds = seed_everything::<B>(cfg.exp_params.manual_seed, true);

        // ── Step 4: Model ─────────────────────────────────────────────────────
        let model = build_model::<B>(&cfg.model_params, cfg.data_params.patch_size, &device)?;

        // ── Step 5: Experiment ────────────────────────────────────────────────
        let optim = configure_optimizer::<B>(&cfg.exp_params);
        let mut experiment = VaeExperiment::new(model, cfg.exp_params.clone(), optim, &seeds);

        // ── Step 6: Data ──────────────────────────────────────────────────────
        let mut data = VaeDataModule::new(
            cfg.data_params.clone(),
            cfg.model_params.in_channels(),
            seeds,
        );
        data.setup()?;

        // ── Step 7: Callbacks ─────────────────────────────────────────────────
        let callbacks: Vec<Box<dyn Callback>> = vec![
            Box::new(LearningRateMonitor::new()),
            Box::new(ModelCheckpoint::new(
                logger.log_dir().join(CHECKPOINT_DIR),
                MONITOR,
                SAVE_TOP_K,
                true,
            )),
        ];

        // ── Step 8: Trainer ───────────────────────────────────────────────────
        let mut trainer = Trainer::<B>::new(cfg.trainer_params.clone(), device, callbacks);

        // ── Step 9: Artifact directories ──────────────────────────────────────
        prepare_output_dirs(logger.log_dir())?;

        // ── Step 10: Fit ──────────────────────────────────────────────────────
        println!("======= Training {name} =======");
        let summary = trainer.fit(&mut experiment, &mut data, &logger)?;
        tracing::info!(
            "{} version {} finished after {} steps (val_loss={:?}); artifacts in '{}'",
            experiment.model().kind,
            logger.version(),
            summary.global_step,
            summary.val_loss,
            logger.log_dir().display(),
        );

        Ok(RunOutcome { log_dir: logger.log_dir().to_path_buf(), summary })
    }
}
