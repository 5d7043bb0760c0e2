// ============================================================
// Layer 4 — VAE Data Module
// ============================================================
// Owns the train/validation splits for one run and hands out
// Burn DataLoaders over them.
//
// Lifecycle:
//   1. new()    — cheap, records parameters only
//   2. setup()  — discovers images and builds the splits;
//                 later calls are no-ops
//   3. *_dataloader() — one loader per split, per backend
//   4. set_epoch()    — called by the trainer before each
//                       epoch so augmentation varies by epoch
//   5. check_decode()  — called by the trainer before each step;
//                       fails once any image stopped decoding
//
// Split layout:
//   data_path/train + data_path/val  → used as given
//   anything else                    → every image under
//                                      data_path, split with
//                                      the seeded splitter

use anyhow::Result;
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    prelude::*,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::data::{
    batcher::{ImageBatch, ImageBatcher},
    dataset::{discover_images, DecodeFailures, ImageFolderDataset, ImageTransform},
    splitter::split_train_val,
};
use crate::domain::config::DataParams;
use crate::infra::seed::SeedSequence;

struct Splits {
    train: ImageFolderDataset,
    val:   ImageFolderDataset,
}

pub struct VaeDataModule {
    params:   DataParams,
    channels: usize,
    seeds:    SeedSequence,
    epoch:    Arc<AtomicUsize>,
    failures: DecodeFailures,
    splits:   Option<Splits>,
}

impl VaeDataModule {
    pub fn new(params: DataParams, channels: usize, seeds: SeedSequence) -> Self {
        Self {
            params,
            channels,
            seeds,
            epoch: Arc::new(AtomicUsize::new(0)),
            failures: DecodeFailures::default(),
            splits: None,
        }
    }

    /// Discover images and build the splits. Safe to call repeatedly.
    pub fn setup(&mut self) -> Result<()> {
        if self.splits.is_some() {
            tracing::debug!("Data module already set up");
            return Ok(());
        }

        let root      = &self.params.data_path;
        let train_dir = root.join("train");
        let val_dir   = root.join("val");

        let (train_files, val_files) = if train_dir.is_dir() && val_dir.is_dir() {
            (discover_images(&train_dir)?, discover_images(&val_dir)?)
        } else {
            let all = discover_images(root)?;
            let mut rng = self.seeds.rng("split");
            split_train_val(all, 1.0 - self.params.val_split, &mut rng)
        };

        if train_files.is_empty() {
            anyhow::bail!("No training images found under '{}'", root.display());
        }
        if val_files.is_empty() {
            anyhow::bail!(
                "No validation images found under '{}' (need at least 2 images to split)",
                root.display()
            );
        }
        tracing::info!(
            "Data ready: {} train, {} validation images",
            train_files.len(),
            val_files.len()
        );

        let transform = |random_flip| ImageTransform {
            patch_size: self.params.patch_size,
            channels:   self.channels,
            random_flip,
        };
        self.splits = Some(Splits {
            train: ImageFolderDataset::new(
                train_files,
                transform(true),
                self.seeds,
                "train",
                self.epoch.clone(),
                self.failures.clone(),
            ),
            val: ImageFolderDataset::new(
                val_files,
                transform(false),
                self.seeds,
                "val",
                self.epoch.clone(),
                self.failures.clone(),
            ),
        });
        Ok(())
    }

    pub fn set_epoch(&self, epoch: usize) {
        self.epoch.store(epoch, Ordering::Relaxed);
    }

    /// Errors if any image failed to decode since setup.
    pub fn check_decode(&self) -> Result<()> {
        self.failures.check()
    }

    #[cfg(test)]
    pub fn train_len(&self) -> usize {
        self.splits.as_ref().map_or(0, |s| s.train.files().len())
    }

    #[cfg(test)]
    pub fn val_len(&self) -> usize {
        self.splits.as_ref().map_or(0, |s| s.val.files().len())
    }

    fn splits(&self) -> Result<&Splits> {
        self.splits
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Data module used before setup()"))
    }

    /// Shuffled loader over the training split.
    pub fn train_dataloader<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<Arc<dyn DataLoader<ImageBatch<B>>>> {
        let splits  = self.splits()?;
        let batcher = ImageBatcher::<B>::new(device.clone(), self.channels, self.params.patch_size);

        let mut builder = DataLoaderBuilder::new(batcher)
            .batch_size(self.params.train_batch_size)
            .shuffle(self.seeds.derive("shuffle", 0));
        if self.params.num_workers > 0 {
            builder = builder.num_workers(self.params.num_workers);
        }
        Ok(builder.build(splits.train.clone()))
    }

    /// Loader over the validation split, in file order.
    pub fn val_dataloader<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<Arc<dyn DataLoader<ImageBatch<B>>>> {
        let splits  = self.splits()?;
        let batcher = ImageBatcher::<B>::new(device.clone(), self.channels, self.params.patch_size);

        let mut builder = DataLoaderBuilder::new(batcher).batch_size(self.params.val_batch_size);
        if self.params.num_workers > 0 {
            builder = builder.num_workers(self.params.num_workers);
        }
        Ok(builder.build(splits.val.clone()))
    }
}
