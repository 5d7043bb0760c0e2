// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from an image folder on disk to tensor batches.
//
//   image folder
//       │
//       ▼
//   discover_images   → sorted list of readable image files
//       │
//       ▼
//   split_train_val   → seeded train / validation split
//       │                (skipped when train/ and val/ exist)
//       ▼
//   ImageFolderDataset → implements Burn's Dataset trait,
//       │                decodes + transforms on demand
//       ▼
//   ImageBatcher      → stacks items into [N, C, P, P]
//       │
//       ▼
//   DataLoader        → feeds batches to the trainer
//
// VaeDataModule ties these together for one run.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Implements Burn's Dataset trait over a folder of images
pub mod dataset;

/// Implements Burn's Batcher trait to create image batches
pub mod batcher;

/// Shuffles and splits files into train/validation sets
pub mod splitter;

/// Owns the splits and builds the loaders for a run
pub mod datamodule;
