// ============================================================
// Layer 6 — Checkpoint Store
// ============================================================
// Persists serialised model records inside a run's
// `checkpoints/` directory and keeps a manifest of the ones
// that are retained.
//
// File layout:
//   checkpoints/
//     epoch=3-step=252.ckpt   ← a retained top-k checkpoint
//     epoch=5-step=378.ckpt   ← another one
//     last.ckpt               ← always the most recent epoch
//     checkpoints.json        ← manifest of the top-k entries
//
// The store only moves bytes. Which checkpoints survive is
// decided by `TopK`, which is pure bookkeeping and knows
// nothing about files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const LAST_CHECKPOINT: &str = "last.ckpt";
const MANIFEST: &str = "checkpoints.json";

/// One retained checkpoint and the score it was kept for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub epoch: usize,
    pub step:  usize,
    pub score: f64,
    pub path:  PathBuf,
}

impl CheckpointEntry {
    pub fn file_name(epoch: usize, step: usize) -> String {
        format!("epoch={epoch}-step={step}.ckpt")
    }
}

pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` to `{dir}/{file_name}`, replacing any existing file.
    ///
    /// The bytes go to a temporary sibling first and are renamed
    /// into place, so a crash never leaves a truncated checkpoint
    /// under the final name.
    pub fn write(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", self.dir.display()))?;

        let path = self.dir.join(file_name);
        let tmp  = self.dir.join(format!(".{file_name}.tmp"));
        fs::write(&tmp, bytes)
            .with_context(|| format!("Failed to write checkpoint '{}'", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move checkpoint into '{}'", path.display()))?;

        tracing::debug!("Saved checkpoint '{}' ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    #[cfg(test)]
    pub fn read(&self, file_name: &str) -> Result<Vec<u8>> {
        let path = self.dir.join(file_name);
        fs::read(&path).with_context(|| format!("Cannot read checkpoint '{}'", path.display()))
    }

    pub fn remove(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!("Removed checkpoint '{}'", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Cannot remove '{}'", path.display())),
        }
    }

    pub fn write_manifest(&self, entries: &[CheckpointEntry]) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        self.write(MANIFEST, json.as_bytes())?;
        Ok(())
    }

    #[cfg(test)]
    pub fn read_manifest(&self) -> Result<Vec<CheckpointEntry>> {
        let path = self.dir.join(MANIFEST);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read manifest '{}'", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }
}

// ─── Top-k retention ──────────────────────────────────────────────────────────
/// Outcome of offering a candidate to `TopK`.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// The candidate is not among the best k; do not persist it.
    Rejected,
    /// The candidate is kept. If the set was full, the previous
    /// worst entry is handed back so its file can be deleted.
    Admitted { evicted: Option<CheckpointEntry> },
}

/// Keeps the `k` entries with the lowest score.
#[derive(Debug, Clone)]
pub struct TopK {
    k:       usize,
    entries: Vec<CheckpointEntry>, // ascending by score
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self { k, entries: Vec::with_capacity(k + 1) }
    }

    pub fn entries(&self) -> &[CheckpointEntry] {
        &self.entries
    }

    #[cfg(test)]
    pub fn best(&self) -> Option<&CheckpointEntry> {
        self.entries.first()
    }

    pub fn admit(&mut self, candidate: CheckpointEntry) -> Admission {
        // NaN never ranks; it would poison the ordering.
        if self.k == 0 || candidate.score.is_nan() {
            return Admission::Rejected;
        }

        if self.entries.len() < self.k {
            self.insert(candidate);
            return Admission::Admitted { evicted: None };
        }

        match self.entries.last() {
            // Ties keep the older checkpoint.
            Some(worst) if candidate.score < worst.score => {
                let evicted = self.entries.pop();
                self.insert(candidate);
                Admission::Admitted { evicted }
            }
            _ => Admission::Rejected,
        }
    }

    fn insert(&mut self, candidate: CheckpointEntry) {
        let at = self.entries.partition_point(|e| e.score <= candidate.score);
        self.entries.insert(at, candidate);
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn entry(epoch: usize, score: f64) -> CheckpointEntry {
        CheckpointEntry {
            epoch,
            step: epoch * 10,
            score,
            path: PathBuf::from(CheckpointEntry::file_name(epoch, epoch * 10)),
        }
    }

    #[test]
    fn test_keeps_two_lowest() {
        let mut top = TopK::new(2);
        assert_eq!(top.admit(entry(0, 3.0)), Admission::Admitted { evicted: None });
        assert_eq!(top.admit(entry(1, 2.0)), Admission::Admitted { evicted: None });
        assert_eq!(top.admit(entry(2, 2.5)), Admission::Admitted { evicted: Some(entry(0, 3.0)) });
        assert_eq!(top.admit(entry(3, 9.0)), Admission::Rejected);

        let epochs: Vec<usize> = top.entries().iter().map(|e| e.epoch).collect();
        assert_eq!(epochs, vec![1, 2]);
        assert_eq!(top.best().map(|e| e.epoch), Some(1));
    }

    #[test]
    fn test_tie_keeps_older_entry() {
        let mut top = TopK::new(1);
        top.admit(entry(0, 1.0));
        assert_eq!(top.admit(entry(1, 1.0)), Admission::Rejected);
    }

    #[test]
    fn test_nan_and_zero_k_are_rejected() {
        assert_eq!(TopK::new(0).admit(entry(0, 1.0)), Admission::Rejected);
        assert_eq!(TopK::new(2).admit(entry(0, f64::NAN)), Admission::Rejected);
    }

    #[test]
    fn test_store_write_read_remove() {
        let dir   = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoints"));

        let path = store.write(LAST_CHECKPOINT, b"weights").unwrap();
        assert_eq!(store.read(LAST_CHECKPOINT).unwrap(), b"weights");

        store.write(LAST_CHECKPOINT, b"newer").unwrap();
        assert_eq!(store.read(LAST_CHECKPOINT).unwrap(), b"newer");

        store.remove(&path).unwrap();
        assert!(!path.exists());
        // Removing twice is fine.
        store.remove(&path).unwrap();
    }

    #[test]
    fn test_manifest_round_trip() {
        let dir   = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.read_manifest().unwrap().is_empty());

        let entries = vec![entry(1, 0.5), entry(4, 0.7)];
        store.write_manifest(&entries).unwrap();
        assert_eq!(store.read_manifest().unwrap(), entries);
    }
}
