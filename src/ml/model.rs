// ============================================================
// Layer 5 — Convolutional VAE Network
// ============================================================
// The network shared by every registered model kind:
//
//   encoder:  for each hidden dim h
//               Conv2d(3×3, stride 2, pad 1) → BatchNorm → LeakyReLU
//             (spatial size halves per block)
//   heads:    flatten → Linear → mu
//             flatten → Linear → log_var
//   decoder:  Linear(latent → last_hidden × s × s) → reshape
//             for each hidden dim in reverse (but the last)
//               ConvTranspose2d(3×3, stride 2) → BatchNorm → LeakyReLU
//   final:    ConvTranspose2d(3×3, stride 2) → BatchNorm → LeakyReLU
//             → Conv2d(3×3, pad 1) → tanh
//
// With patch_size P and n hidden dims, the bottleneck is
// s = P / 2^n pixels square. Config validation guarantees that
// division is exact.
//
// The reparameterisation noise is an input rather than drawn
// here, so the caller decides which generator it comes from.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::{leaky_relu, tanh},
};

const LEAKY_SLOPE: f64 = 0.01;

#[derive(Config, Debug)]
pub struct VaeConfig {
    pub in_channels: usize,
    pub latent_dim:  usize,
    pub hidden_dims: Vec<usize>,
    pub patch_size:  usize,
}

impl VaeConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Vae<B> {
        let depth       = self.hidden_dims.len();
        let bottleneck  = self.patch_size >> depth;
        let last_hidden = self.hidden_dims[depth - 1];
        let flat        = last_hidden * bottleneck * bottleneck;

        let mut encoder = Vec::with_capacity(depth);
        let mut in_ch   = self.in_channels;
        for &h in &self.hidden_dims {
            encoder.push(EncoderBlock {
                conv: Conv2dConfig::new([in_ch, h], [3, 3])
                    .with_stride([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device),
                norm: BatchNormConfig::new(h).init(device),
            });
            in_ch = h;
        }

        let reversed: Vec<usize> = self.hidden_dims.iter().rev().copied().collect();
        let decoder = reversed
            .windows(2)
            .map(|pair| DecoderBlock::new(pair[0], pair[1], device))
            .collect();

        Vae {
            encoder,
            fc_mu:         LinearConfig::new(flat, self.latent_dim).init(device),
            fc_var:        LinearConfig::new(flat, self.latent_dim).init(device),
            decoder_input: LinearConfig::new(self.latent_dim, flat).init(device),
            decoder,
            final_block:   DecoderBlock::new(reversed[depth - 1], reversed[depth - 1], device),
            final_conv:    Conv2dConfig::new([reversed[depth - 1], self.in_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            latent_dim:  self.latent_dim,
            last_hidden,
            bottleneck,
        }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        leaky_relu(self.norm.forward(self.conv.forward(x)), LEAKY_SLOPE)
    }
}

#[derive(Module, Debug)]
pub struct DecoderBlock<B: Backend> {
    conv: ConvTranspose2d<B>,
    norm: BatchNorm<B, 2>,
}

impl<B: Backend> DecoderBlock<B> {
    fn new(in_ch: usize, out_ch: usize, device: &B::Device) -> Self {
        Self {
            conv: ConvTranspose2dConfig::new([in_ch, out_ch], [3, 3])
                .with_stride([2, 2])
                .with_padding([1, 1])
                .with_padding_out([1, 1])
                .init(device),
            norm: BatchNormConfig::new(out_ch).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        leaky_relu(self.norm.forward(self.conv.forward(x)), LEAKY_SLOPE)
    }
}

#[derive(Module, Debug)]
pub struct Vae<B: Backend> {
    encoder:       Vec<EncoderBlock<B>>,
    fc_mu:         Linear<B>,
    fc_var:        Linear<B>,
    decoder_input: Linear<B>,
    decoder:       Vec<DecoderBlock<B>>,
    final_block:   DecoderBlock<B>,
    final_conv:    Conv2d<B>,
    latent_dim:    usize,
    last_hidden:   usize,
    bottleneck:    usize,
}

/// Everything a loss function needs from one forward pass.
pub struct VaeOutput<B: Backend> {
    pub recons:  Tensor<B, 4>,
    pub mu:      Tensor<B, 2>,
    pub log_var: Tensor<B, 2>,
}

impl<B: Backend> Vae<B> {
    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    /// images: [batch, C, P, P] → (mu, log_var): [batch, latent]
    pub fn encode(&self, images: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let mut x = images;
        for block in &self.encoder {
            x = block.forward(x);
        }
        let flat = x.flatten::<2>(1, 3);
        (self.fc_mu.forward(flat.clone()), self.fc_var.forward(flat))
    }

    /// z: [batch, latent] → images: [batch, C, P, P] in (-1, 1)
    pub fn decode(&self, z: Tensor<B, 2>) -> Tensor<B, 4> {
        let [batch_size, _] = z.dims();
        let mut x = self
            .decoder_input
            .forward(z)
            .reshape([batch_size, self.last_hidden, self.bottleneck, self.bottleneck]);
        for block in &self.decoder {
            x = block.forward(x);
        }
        let x = self.final_block.forward(x);
        tanh(self.final_conv.forward(x))
    }

    /// z = mu + eps · exp(log_var / 2)
    pub fn reparameterize(&self, mu: Tensor<B, 2>, log_var: Tensor<B, 2>, eps: Tensor<B, 2>) -> Tensor<B, 2> {
        let std = log_var.mul_scalar(0.5).exp();
        eps * std + mu
    }

    /// `eps` must be standard-normal noise of shape [batch, latent].
    pub fn forward(&self, images: Tensor<B, 4>, eps: Tensor<B, 2>) -> VaeOutput<B> {
        let (mu, log_var) = self.encode(images);
        let z      = self.reparameterize(mu.clone(), log_var.clone(), eps);
        let recons = self.decode(z);
        VaeOutput { recons, mu, log_var }
    }
}
