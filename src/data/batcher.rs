// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Implements Burn's Batcher trait to stack ImageItems into one
// 4-D tensor on the target device.
//
//   Input:  Vec of N ImageItems, each C × P × P floats
//   Output: ImageBatch with images of shape [N, C, P, P]
//
// Every item already has the same shape (the transform resizes
// to patch_size), so batching is a flat concatenation followed
// by a reshape.

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::dataset::ImageItem;

#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Shape: [batch_size, channels, patch_size, patch_size]
    pub images: Tensor<B, 4>,
}

#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    device:     B::Device,
    channels:   usize,
    patch_size: usize,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device, channels: usize, patch_size: usize) -> Self {
        Self { device, channels, patch_size }
    }
}

impl<B: Backend> Batcher<ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>) -> ImageBatch<B> {
        let batch_size = items.len();
        let flat: Vec<f32> = items.into_iter().flat_map(|item| item.pixels).collect();

        let shape  = [batch_size, self.channels, self.patch_size, self.patch_size];
        let images = Tensor::<B, 4>::from_data(TensorData::new(flat, shape), &self.device);

        ImageBatch { images }
    }
}
