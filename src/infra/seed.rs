// ============================================================
// Layer 6 — Seeding
// ============================================================
// One integer seed drives every random choice in a run.
//
// Burn's parameter initialisers draw from the backend's own
// generator, so that is seeded once up front. Everything else
// (shuffling, augmentation, latent noise, prior samples) gets
// its own generator from a SeedSequence, keyed by a stream
// name and an index. Two consumers never share a generator,
// and the same (seed, stream, index) always gives the same
// numbers regardless of thread scheduling.

use burn::prelude::*;
use rand::{rngs::StdRng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSequence {
    seed:         u64,
    seed_workers: bool,
}

impl SeedSequence {
    pub fn new(seed: u64, seed_workers: bool) -> Self {
        Self { seed, seed_workers }
    }

    /// A 64-bit seed for `(stream, index)`, distinct per stream and index.
    pub fn derive(&self, stream: &str, index: u64) -> u64 {
        let mut h = self.seed ^ fnv1a(stream.as_bytes());
        h = splitmix64(h);
        splitmix64(h ^ index)
    }

    /// Generator for a single-threaded consumer.
    pub fn rng(&self, stream: &str) -> StdRng {
        StdRng::seed_from_u64(self.derive(stream, 0))
    }

    /// Generator for work that may run on a data-loading worker.
    ///
    /// Without worker seeding these streams are left to entropy,
    /// which keeps the run correct but not reproducible.
    pub fn worker_rng(&self, stream: &str, index: u64) -> StdRng {
        if self.seed_workers {
            StdRng::seed_from_u64(self.derive(stream, index))
        } else {
            StdRng::from_entropy()
        }
    }
}

/// Seed the backend generator and hand out the run's seed source.
pub fn seed_everything<B: Backend>(seed: u64, workers: bool) -> SeedSequence {
    B::seed(seed);
    tracing::info!("Global seed set to {seed} (worker seeding: {workers})");
    SeedSequence::new(seed, workers)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |h, b| {
        (h ^ u64::from(*b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
