// ============================================================
// Layer 3 — Core Traits
// ============================================================
// Seams between layers that need no framework types.

use anyhow::Result;

// ─── CheckpointSource ─────────────────────────────────────────────────────────
/// Anything that can serialise its current weights for a checkpoint.
///
/// Implementations:
///   - VaeExperiment → the network record as named MessagePack
///
/// Checkpoint callbacks only see this trait, so they never need
/// to know which backend or model produced the bytes.
pub trait CheckpointSource {
    fn checkpoint_bytes(&self) -> Result<Vec<u8>>;
}
