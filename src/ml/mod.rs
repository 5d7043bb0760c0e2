// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that touches Burn tensors or modules lives here.
//
//   model.rs      — the convolutional VAE network
//                   (encoder, mu/log_var heads, decoder)
//
//   loss.rs       — reconstruction + KL objectives:
//                   vanilla, beta (Higgins), beta (Burgess)
//
//   registry.rs   — ModelKind → constructor, building a
//                   network paired with its objective
//
//   experiment.rs — one model + optimiser + seeded noise,
//                   implementing the training/validation steps
//                   and the per-epoch image grids
//
//   trainer.rs    — the epoch loop driving an Experiment
//
//   callbacks.rs  — LR monitoring and top-k checkpointing
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Kingma & Welling (2014) Auto-Encoding Variational Bayes

/// Convolutional VAE architecture
pub mod model;

/// VAE loss functions
pub mod loss;

/// Model kind → constructor registry
pub mod registry;

/// Training/validation steps and artifacts for one model
pub mod experiment;

/// Epoch loop with validation
pub mod trainer;

/// Trainer hooks: LR monitor, checkpointing
pub mod callbacks;
