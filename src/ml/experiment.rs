// ============================================================
// Layer 5 — VAE Experiment
// ============================================================
// Binds one built model to its experiment parameters and an
// optimiser, and implements the Experiment contract the
// Trainer drives:
//
//   training_step            forward → loss → backward → Adam
//   validation_step          forward on the inner backend,
//                            full KL weight
//   on_validation_epoch_end  writes two image grids:
//     Reconstructions/recons_{name}_Epoch_{e}.png
//         reconstructions of the first validation batch
//     Samples/{name}_Epoch_{e}.png
//         num_samples decodings of z ~ N(0, I)
//   checkpoint_bytes         the network record, named
//                            MessagePack, full precision
//
// Latent noise comes from per-purpose seeded generators, never
// from the backend's global one, so adding a sample grid does
// not shift the training noise.

use anyhow::{Context, Result};
use burn::{
    module::AutodiffModule,
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder},
    tensor::{backend::AutodiffBackend, Distribution},
};
use rand::rngs::StdRng;

use crate::data::batcher::ImageBatch;
use crate::domain::{config::ExpParams, traits::CheckpointSource};
use crate::infra::{
    image_grid::{make_grid, BatchShape},
    logger::RunLogger,
    output_dirs::{RECONSTRUCTIONS_DIR, SAMPLES_DIR},
    seed::SeedSequence,
};
use crate::ml::{
    loss::LossTerms,
    model::Vae,
    registry::VaeModel,
    trainer::{Experiment, StepContext, StepMetrics},
};

const GRID_COLUMNS: usize = 12;
const GRID_PADDING: usize = 2;

/// Adam with the experiment's weight decay. The learning rate is
/// supplied per step, so it is not part of the optimiser config.
pub fn configure_optimizer<B: AutodiffBackend>(params: &ExpParams) -> impl Optimizer<Vae<B>, B> {
    let mut config = AdamConfig::new();
    if params.weight_decay > 0.0 {
        config = config.with_weight_decay(Some(WeightDecayConfig::new(params.weight_decay as f32)));
    }
    config.init::<B, Vae<B>>()
}

pub struct VaeExperiment<B: AutodiffBackend, O: Optimizer<Vae<B>, B>> {
    model:        VaeModel<B>,
    params:       ExpParams,
    optim:        O,
    train_noise:  StdRng,
    val_noise:    StdRng,
    sample_noise: StdRng,
    steps_taken:  usize,
    /// Eval-mode copy of the network for the current validation pass.
    valid_net:    Option<Vae<B::InnerBackend>>,
    sample_batch: Option<Tensor<B::InnerBackend, 4>>,
}

impl<B: AutodiffBackend, O: Optimizer<Vae<B>, B>> VaeExperiment<B, O> {
    pub fn new(model: VaeModel<B>, params: ExpParams, optim: O, seeds: &SeedSequence) -> Self {
        Self {
            model,
            params,
            optim,
            train_noise:  seeds.rng("train_noise"),
            val_noise:    seeds.rng("val_noise"),
            sample_noise: seeds.rng("sample_noise"),
            steps_taken:  0,
            valid_net:    None,
            sample_batch: None,
        }
    }

    pub fn model(&self) -> &VaeModel<B> {
        &self.model
    }

    fn sample_images(&mut self, epoch: usize, logger: &RunLogger) -> Result<()> {
        let (Some(net), Some(batch)) = (self.valid_net.as_ref(), self.sample_batch.take()) else {
            tracing::warn!("No validation batch seen in epoch {epoch}; skipping image grids");
            return Ok(());
        };
        let device = batch.device();
        let latent = net.latent_dim();
        let name   = logger.name();

        // ── Reconstructions of the first validation batch ─────────────────────
        let [n, ..] = batch.dims();
        let eps     = standard_normal(&mut self.sample_noise, [n, latent], &device);
        let recons  = net.forward(batch, eps).recons;
        save_grid(logger, format!("{RECONSTRUCTIONS_DIR}/recons_{name}_Epoch_{epoch}.png"), recons)?;

        // ── Decoded prior samples ─────────────────────────────────────────────
        let z       = standard_normal(&mut self.sample_noise, [self.params.num_samples, latent], &device);
        let samples = net.decode(z);
        save_grid(logger, format!("{SAMPLES_DIR}/{name}_Epoch_{epoch}.png"), samples)?;
        Ok(())
    }
}

impl<B: AutodiffBackend, O: Optimizer<Vae<B>, B>> CheckpointSource for VaeExperiment<B, O> {
    fn checkpoint_bytes(&self) -> Result<Vec<u8>> {
        NamedMpkBytesRecorder::<FullPrecisionSettings>::default()
            .record(self.model.net.clone().into_record(), ())
            .context("Failed to serialise model weights")
    }
}

impl<B: AutodiffBackend, O: Optimizer<Vae<B>, B>> Experiment<B> for VaeExperiment<B, O> {
    fn training_step(&mut self, batch: ImageBatch<B>, ctx: &StepContext) -> Result<StepMetrics> {
        let images = batch.images;
        let [n, ..] = images.dims();
        let eps = standard_normal(&mut self.train_noise, [n, self.model.net.latent_dim()], &images.device());

        let output = self.model.net.forward(images.clone(), eps);
        let terms  = self
            .model
            .objective
            .compute(&output, images, self.params.kld_weight, ctx.global_step);
        let metrics = step_metrics(&terms);

        // Backward pass + Adam update
        let grads = terms.loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model.net);
        self.model.net   = self.optim.step(ctx.lr, self.model.net.clone(), grads);
        self.steps_taken = ctx.global_step + 1;

        Ok(metrics)
    }

    fn on_validation_epoch_start(&mut self) {
        self.valid_net    = Some(self.model.net.valid());
        self.sample_batch = None;
    }

    fn validation_step(&mut self, batch: ImageBatch<B::InnerBackend>) -> Result<StepMetrics> {
        let net = self
            .valid_net
            .as_ref()
            .context("validation_step called before on_validation_epoch_start")?;

        let images = batch.images;
        if self.sample_batch.is_none() {
            self.sample_batch = Some(images.clone());
        }
        let [n, ..] = images.dims();
        let eps = standard_normal(&mut self.val_noise, [n, net.latent_dim()], &images.device());

        let output = net.forward(images.clone(), eps);
        let terms  = self.model.objective.compute(&output, images, 1.0, self.steps_taken);
        Ok(step_metrics(&terms))
    }

    fn on_validation_epoch_end(&mut self, epoch: usize, logger: &RunLogger) -> Result<()> {
        self.sample_images(epoch, logger)
    }

    fn lr_at(&self, epoch: usize) -> f64 {
        self.params.lr_at(epoch)
    }
}

fn step_metrics<B: Backend>(terms: &LossTerms<B>) -> StepMetrics {
    let scalar = |t: &Tensor<B, 1>| t.clone().into_scalar().elem::<f64>();
    StepMetrics::new(scalar(&terms.loss))
        .with("Reconstruction_Loss", scalar(&terms.recons))
        .with("KLD", scalar(&terms.kld))
}

fn standard_normal<B: Backend, const D: usize>(
    rng:    &mut StdRng,
    shape:  [usize; D],
    device: &B::Device,
) -> Tensor<B, D> {
    let data = TensorData::random::<f32, _, _>(shape, Distribution::Normal(0.0, 1.0), rng);
    Tensor::from_data(data, device)
}

fn save_grid<B: Backend>(logger: &RunLogger, relative: String, images: Tensor<B, 4>) -> Result<()> {
    let shape  = BatchShape::from_dims(images.dims());
    let values = images
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read image tensor: {e:?}"))?;
    let grid = make_grid(&values, shape, GRID_COLUMNS, GRID_PADDING)?;
    logger.log_image(relative, &grid)?;
    Ok(())
}

/// Restore network weights from `checkpoint_bytes` output.
pub fn load_weights<B: Backend>(net: Vae<B>, bytes: Vec<u8>, device: &B::Device) -> Result<Vae<B>> {
    let record = NamedMpkBytesRecorder::<FullPrecisionSettings>::default()
        .load(bytes, device)
        .context("Failed to deserialise model weights")?;
    Ok(net.load_record(record))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{ModelParams, VanillaVaeParams};
    use crate::infra::seed::seed_everything;
    use crate::ml::registry::build_model;
    use crate::test_support::backend_rng_lock;
    use burn::backend::{Autodiff, NdArray};

    type TB = Autodiff<NdArray>;

    fn exp_params() -> ExpParams {
        ExpParams {
            manual_seed:     7,
            lr:              0.005,
            weight_decay:    0.0,
            scheduler_gamma: Some(0.95),
            kld_weight:      0.00025,
            num_samples:     5,
        }
    }

    fn model_params() -> ModelParams {
        ModelParams::VanillaVae(VanillaVaeParams {
            in_channels: 3,
            latent_dim:  2,
            hidden_dims: vec![4, 8],
        })
    }

    fn experiment(seed: u64) -> VaeExperiment<TB, impl Optimizer<Vae<TB>, TB>> {
        experiment_with(seed, exp_params())
    }

    fn experiment_with(seed: u64, params: ExpParams) -> VaeExperiment<TB, impl Optimizer<Vae<TB>, TB>> {
        let seeds  = seed_everything::<TB>(seed, true);
        let device = Default::default();
        let model  = build_model::<TB>(&model_params(), 8, &device).unwrap();
        let optim  = configure_optimizer::<TB>(&params);
        VaeExperiment::new(model, params, optim, &seeds)
    }

    fn batch<BB: Backend>(n: usize) -> ImageBatch<BB> {
        let values: Vec<f32> = (0..n * 3 * 64).map(|i| ((i % 17) as f32 / 8.0) - 1.0).collect();
        let images = Tensor::from_data(TensorData::new(values, [n, 3, 8, 8]), &Default::default());
        ImageBatch { images }
    }

    fn ctx(step: usize) -> StepContext {
        StepContext { epoch: 0, global_step: step, lr: 0.005 }
    }

    #[test]
    fn test_training_step_reports_finite_terms_and_updates_weights() {
        let _guard  = backend_rng_lock();
        let mut exp = experiment(1);
        let before  = exp.checkpoint_bytes().unwrap();

        let metrics = exp.training_step(batch(4), &ctx(0)).unwrap();
        let names: Vec<&str> = metrics.scalars().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["loss", "Reconstruction_Loss", "KLD"]);
        assert!(metrics.scalars().iter().all(|(_, v)| v.is_finite()));

        assert_ne!(exp.checkpoint_bytes().unwrap(), before);
    }

    #[test]
    fn test_weight_decay_optimiser_steps() {
        let _guard  = backend_rng_lock();
        let params  = ExpParams { weight_decay: 0.01, ..exp_params() };
        let mut exp = experiment_with(2, params);
        let before  = exp.checkpoint_bytes().unwrap();

        let metrics = exp.training_step(batch(2), &ctx(0)).unwrap();
        assert!(metrics.loss.is_finite());
        assert_ne!(exp.checkpoint_bytes().unwrap(), before);
    }

    #[test]
    fn test_same_seed_gives_identical_weights() {
        let _guard = backend_rng_lock();
        let run = |seed| {
            let mut exp = experiment(seed);
            exp.training_step(batch(2), &ctx(0)).unwrap();
            exp.training_step(batch(2), &ctx(1)).unwrap();
            let (mu, _) = exp.model().net.valid().encode(batch::<NdArray>(1).images);
            mu.into_data().to_vec::<f32>().unwrap()
        };
        assert_eq!(run(11), run(11));
        assert_ne!(run(11), run(12));
    }

    #[test]
    fn test_validation_writes_both_grids() {
        let _guard  = backend_rng_lock();
        let dir     = tempfile::tempdir().unwrap();
        let logger  = RunLogger::create(dir.path(), "VanillaVAE").unwrap();
        let mut exp = experiment(3);

        exp.on_validation_epoch_start();
        let metrics = exp.validation_step(batch::<NdArray>(3)).unwrap();
        assert!(metrics.loss.is_finite());
        exp.on_validation_epoch_end(0, &logger).unwrap();

        let recons  = logger.log_dir().join("Reconstructions/recons_VanillaVAE_Epoch_0.png");
        let samples = logger.log_dir().join("Samples/VanillaVAE_Epoch_0.png");
        assert!(recons.is_file());
        assert!(samples.is_file());

        // 5 samples in one row of 8×8 tiles with 2px padding.
        let (w, h) = image::image_dimensions(&samples).unwrap();
        assert_eq!((w, h), (5 * 10 + 2, 10 + 2));
    }

    #[test]
    fn test_validation_before_start_is_an_error() {
        let _guard  = backend_rng_lock();
        let mut exp = experiment(4);
        assert!(exp.validation_step(batch::<NdArray>(1)).is_err());
    }

    #[test]
    fn test_checkpoint_bytes_load_back() {
        let _guard = backend_rng_lock();
        let mut exp = experiment(5);
        exp.training_step(batch(2), &ctx(0)).unwrap();
        let bytes = exp.checkpoint_bytes().unwrap();

        let device = Default::default();
        let fresh  = build_model::<NdArray>(&model_params(), 8, &device).unwrap().net;
        let loaded = load_weights(fresh, bytes, &device).unwrap();
        let trained = exp.model().net.valid();

        let z = Tensor::<NdArray, 2>::from_floats([[0.3, -1.2], [1.0, 0.0]], &device);
        loaded
            .decode(z.clone())
            .into_data()
            .assert_approx_eq(&trained.decode(z).into_data(), 4);
    }
}
