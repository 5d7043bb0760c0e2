// ============================================================
// Layer 4 — Image Dataset
// ============================================================
// A lazily-decoded folder of images implementing Burn's
// Dataset trait. Only the file list is held in memory; each
// `get(index)` opens the file and runs the transform:
//
//   decode → centre-crop to square → resize to patch_size
//          → (train only) random horizontal flip
//          → CHW floats scaled to [-1, 1]
//
// The flip decision comes from a generator keyed by
// (epoch, index), so the same run sees the same augmentations
// no matter which loader worker handles which item.
//
// Burn's loaders stop at the first `None`, so a file that fails
// to decode after setup still yields a blank item. The failure
// is recorded in DecodeFailures, which the trainer checks before
// every step.

use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use image::{imageops::FilterType, DynamicImage};
use rand::Rng;
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use walkdir::WalkDir;

use crate::infra::seed::SeedSequence;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// One decoded, transformed image in CHW order.
#[derive(Debug, Clone)]
pub struct ImageItem {
    pub pixels: Vec<f32>,
}

#[derive(Debug, Clone, Copy)]
pub struct ImageTransform {
    pub patch_size:  usize,
    pub channels:    usize,
    pub random_flip: bool,
}

impl ImageTransform {
    /// Number of floats in one transformed item.
    pub fn item_len(&self) -> usize {
        self.channels * self.patch_size * self.patch_size
    }

    pub fn apply<R: Rng>(&self, img: DynamicImage, rng: &mut R) -> Vec<f32> {
        let side = img.width().min(img.height());
        let x    = (img.width() - side) / 2;
        let y    = (img.height() - side) / 2;
        let size = self.patch_size as u32;

        let mut img = img
            .crop_imm(x, y, side, side)
            .resize_exact(size, size, FilterType::Triangle);
        if self.random_flip && rng.gen_bool(0.5) {
            img = img.fliph();
        }

        let plane = self.patch_size * self.patch_size;
        let mut out = vec![0f32; self.item_len()];
        if self.channels == 1 {
            for (i, px) in img.to_luma8().pixels().enumerate() {
                out[i] = scale(px.0[0]);
            }
        } else {
            for (i, px) in img.to_rgb8().pixels().enumerate() {
                for ch in 0..3 {
                    out[ch * plane + i] = scale(px.0[ch]);
                }
            }
        }
        out
    }
}

fn scale(v: u8) -> f32 {
    f32::from(v) / 127.5 - 1.0
}

// ─── Decode failures ──────────────────────────────────────────────────────────
/// Files that failed to decode while a loader was running.
/// Shared between every clone of a dataset and its data module.
#[derive(Debug, Clone, Default)]
pub struct DecodeFailures {
    failed: Arc<Mutex<Vec<String>>>,
}

impl DecodeFailures {
    fn record(&self, path: &Path, error: &image::ImageError) {
        let message = format!("'{}': {error}", path.display());
        self.failed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message);
    }

    /// Error listing every failure seen so far, if there was one.
    pub fn check(&self) -> Result<()> {
        let failed = self.failed.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if failed.is_empty() {
            return Ok(());
        }
        anyhow::bail!("{} image(s) could not be decoded: {}", failed.len(), failed.join("; "))
    }
}

// ─── ImageFolderDataset ───────────────────────────────────────────────────────
#[derive(Clone)]
pub struct ImageFolderDataset {
    files:     Arc<Vec<PathBuf>>,
    transform: ImageTransform,
    seeds:     SeedSequence,
    stream:    &'static str,
    epoch:     Arc<AtomicUsize>,
    failures:  DecodeFailures,
}

impl ImageFolderDataset {
    pub fn new(
        files:     Vec<PathBuf>,
        transform: ImageTransform,
        seeds:     SeedSequence,
        stream:    &'static str,
        epoch:     Arc<AtomicUsize>,
        failures:  DecodeFailures,
    ) -> Self {
        Self { files: Arc::new(files), transform, seeds, stream, epoch, failures }
    }

    #[cfg(test)]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl Dataset<ImageItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let path  = self.files.get(index)?;
        let epoch = self.epoch.load(Ordering::Relaxed) as u64;
        let mut rng = self.seeds.worker_rng(self.stream, (epoch << 32) | index as u64);

        // Files were decoded during setup; a failure here means the
        // file changed underneath the run.
        match image::open(path) {
            Ok(img) => Some(ImageItem { pixels: self.transform.apply(img, &mut rng) }),
            Err(e) => {
                tracing::error!("Cannot decode '{}': {e}", path.display());
                self.failures.record(path, &e);
                Some(ImageItem { pixels: vec![0.0; self.transform.item_len()] })
            }
        }
    }

    fn len(&self) -> usize {
        self.files.len()
    }
}

// ─── Discovery ────────────────────────────────────────────────────────────────
/// Recursively list image files under `root`, sorted, after decoding
/// each one in full so truncated files fail here.
pub fn discover_images(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        anyhow::bail!("Data directory '{}' does not exist", root.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.with_context(|| format!("Cannot walk '{}'", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_image = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image {
            files.push(entry.into_path());
        }
    }
    files.sort();

    for path in &files {
        image::open(path).with_context(|| format!("Unreadable image '{}'", path.display()))?;
    }

    tracing::debug!("Found {} images under '{}'", files.len(), root.display());
    Ok(files)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use rand::{rngs::StdRng, SeedableRng};

    fn write_png(path: &Path, w: u32, h: u32, color: [u8; 3]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(w, h, Rgb(color)).save(path).unwrap();
    }

    #[test]
    fn test_discovers_images_recursively_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("b.png"), 4, 4, [0, 0, 0]);
        write_png(&dir.path().join("nested/a.png"), 4, 4, [0, 0, 0]);
        std::fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let files = discover_images(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("b.png"));
        assert!(files[1].ends_with("nested/a.png"));
    }

    #[test]
    fn test_corrupt_image_fails_discovery() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.png"), b"not a png").unwrap();
        assert!(discover_images(dir.path()).is_err());
    }

    #[test]
    fn test_truncated_image_fails_discovery() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.png");
        write_png(&path, 32, 32, [10, 20, 30]);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(discover_images(dir.path()).is_err());
    }

    #[test]
    fn test_transform_crops_resizes_and_scales() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 6, Rgb([255, 0, 128])));
        let t   = ImageTransform { patch_size: 4, channels: 3, random_flip: false };
        let out = t.apply(img, &mut StdRng::seed_from_u64(0));

        assert_eq!(out.len(), 3 * 16);
        assert!((out[0] - 1.0).abs() < 0.02); // red plane
        assert!((out[16] + 1.0).abs() < 0.02); // green plane
        assert!(out.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_grayscale_transform_has_one_plane() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])));
        let t   = ImageTransform { patch_size: 2, channels: 1, random_flip: true };
        let out = t.apply(img, &mut StdRng::seed_from_u64(0));
        assert_eq!(out, vec![-1.0; 4]);
    }

    #[test]
    fn test_dataset_get_is_reproducible() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.png");
        let mut img = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        img.put_pixel(0, 0, Rgb([255, 255, 255]));
        img.save(&path).unwrap();

        let make = || {
            ImageFolderDataset::new(
                vec![path.clone()],
                ImageTransform { patch_size: 4, channels: 1, random_flip: true },
                SeedSequence::new(3, true),
                "train",
                Arc::new(AtomicUsize::new(0)),
                DecodeFailures::default(),
            )
        };
        assert_eq!(make().len(), 1);
        assert_eq!(make().get(0).unwrap().pixels, make().get(0).unwrap().pixels);
        assert!(make().get(1).is_none());
    }

    #[test]
    fn test_decode_failure_keeps_item_and_is_recorded() {
        let dir  = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        let bad  = dir.path().join("bad.png");
        write_png(&good, 4, 4, [255, 255, 255]);
        write_png(&bad, 4, 4, [255, 255, 255]);

        let failures = DecodeFailures::default();
        let dataset  = ImageFolderDataset::new(
            vec![bad.clone(), good],
            ImageTransform { patch_size: 2, channels: 1, random_flip: false },
            SeedSequence::new(3, true),
            "val",
            Arc::new(AtomicUsize::new(0)),
            failures.clone(),
        );
        failures.check().unwrap();

        std::fs::write(&bad, b"garbage").unwrap();
        assert_eq!(dataset.get(0).unwrap().pixels, vec![0.0; 4]);
        assert_eq!(dataset.get(1).unwrap().pixels, vec![1.0; 4]);

        let err = failures.check().unwrap_err().to_string();
        assert!(err.contains("bad.png"), "{err}");
    }
}
