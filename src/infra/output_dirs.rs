// ============================================================
// Layer 6 — Output Directories
// ============================================================
// The experiment writes its image artifacts into two fixed
// subdirectories of the run directory. They are created before
// training starts; calling this again on the same run is a
// no-op, like `mkdir -p`.

use anyhow::{Context, Result};
use std::{fs, path::Path};

pub const SAMPLES_DIR: &str = "Samples";
pub const RECONSTRUCTIONS_DIR: &str = "Reconstructions";

pub fn prepare_output_dirs(log_dir: &Path) -> Result<()> {
    for name in [SAMPLES_DIR, RECONSTRUCTIONS_DIR] {
        let dir = log_dir.join(name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create output dir '{}'", dir.display()))?;
    }
    Ok(())
}
