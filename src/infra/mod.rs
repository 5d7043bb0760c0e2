// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several layers:
//
//   config_loader.rs — YAML file → validated RunConfig
//
//   logger.rs        — versioned run directories, metrics.csv,
//                      hparams.yaml, image artifacts
//
//   checkpoint.rs    — checkpoint files, top-k bookkeeping
//                      and the retained-checkpoint manifest
//
//   seed.rs          — global seeding plus per-stream
//                      generators derived from one seed
//
//   image_grid.rs    — NCHW float batches → one tiled PNG
//
//   output_dirs.rs   — Samples/ and Reconstructions/ setup
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// Run configuration loading
pub mod config_loader;

/// Directory-backed experiment logger
pub mod logger;

/// Checkpoint storage and top-k retention
pub mod checkpoint;

/// Seeding and derived random streams
pub mod seed;

/// Image grid rendering
pub mod image_grid;

/// Artifact directory preparation
pub mod output_dirs;
