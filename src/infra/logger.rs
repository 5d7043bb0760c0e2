// ============================================================
// Layer 6 — Run Logger
// ============================================================
// A directory-backed experiment logger. Every run gets its own
// versioned directory:
//
//   {save_dir}/{name}/version_0/
//   {save_dir}/{name}/version_1/
//   ...
//
// The next free version number is one past the highest
// existing `version_N` directory, so earlier runs are never
// overwritten.
//
// What gets written into a run directory:
//   hparams.yaml   — the full run configuration
//   metrics.csv    — one row per scalar: step,epoch,metric,value
//   *.png          — image artifacts (samples, reconstructions)
//
// Example metrics.csv:
//   step,epoch,metric,value
//   50,0,loss,0.913204
//   50,0,recons_loss,0.902110
//   63,0,val_loss,0.887450

use anyhow::{Context, Result};
use image::RgbImage;
use serde::Serialize;
use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

const VERSION_PREFIX: &str = "version_";

/// One scalar measurement, as stored in metrics.csv.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub step:   usize,
    pub epoch:  usize,
    pub metric: String,
    pub value:  f64,
}

pub struct RunLogger {
    name:     String,
    version:  usize,
    log_dir:  PathBuf,
    csv_path: PathBuf,
}

impl RunLogger {
    /// Create the next `version_N` directory under `{save_dir}/{name}`.
    pub fn create(save_dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let root = save_dir.as_ref().join(name);
        fs::create_dir_all(&root)
            .with_context(|| format!("Cannot create log root '{}'", root.display()))?;

        // Another process may claim a version between the scan and the
        // create, so keep bumping until create_dir succeeds.
        let mut version = next_version(&root)?;
        let log_dir = loop {
            let candidate = root.join(format!("{VERSION_PREFIX}{version}"));
            match fs::create_dir(&candidate) {
                Ok(()) => break candidate,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => version += 1,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Cannot create run directory '{}'", candidate.display())
                    })
                }
            }
        };

        let csv_path = log_dir.join("metrics.csv");
        let mut f = fs::File::create(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        writeln!(f, "step,epoch,metric,value")?;

        tracing::info!("Logging to '{}'", log_dir.display());
        Ok(Self { name: name.to_string(), version, log_dir, csv_path })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> usize {
        self.version
    }

    /// The run-specific directory every other artifact lives under.
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Dump the run configuration to hparams.yaml.
    pub fn log_hyperparams<T: Serialize>(&self, params: &T) -> Result<()> {
        let path = self.log_dir.join("hparams.yaml");
        let yaml = serde_yaml::to_string(params)?;
        fs::write(&path, yaml)
            .with_context(|| format!("Cannot write hyperparameters to '{}'", path.display()))?;
        tracing::debug!("Saved hyperparameters to '{}'", path.display());
        Ok(())
    }

    /// Append one row per scalar to metrics.csv.
    pub fn log_metrics(&self, step: usize, epoch: usize, scalars: &[(&str, f64)]) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        for (metric, value) in scalars {
            writeln!(f, "{step},{epoch},{metric},{value:.6}")?;
        }
        Ok(())
    }

    /// Save an image artifact at `relative` inside the run directory.
    pub fn log_image(&self, relative: impl AsRef<Path>, image: &RgbImage) -> Result<PathBuf> {
        let path = self.log_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }
        image
            .save(&path)
            .with_context(|| format!("Cannot write image '{}'", path.display()))?;
        tracing::debug!("Saved image '{}'", path.display());
        Ok(path)
    }

    /// Parse metrics.csv back into rows.
    #[cfg(test)]
    pub fn read_metrics(&self) -> Result<Vec<MetricRow>> {
        let text = fs::read_to_string(&self.csv_path)?;
        text.lines()
            .skip(1)
            .filter(|line| !line.is_empty())
            .map(parse_row)
            .collect()
    }
}

#[cfg(test)]
fn parse_row(line: &str) -> Result<MetricRow> {
    let mut cols = line.splitn(4, ',');
    let mut next = |what: &str| {
        cols.next()
            .with_context(|| format!("metrics row '{line}' has no {what} column"))
    };
    Ok(MetricRow {
        step:   next("step")?.parse()?,
        epoch:  next("epoch")?.parse()?,
        metric: next("metric")?.to_string(),
        value:  next("value")?.parse()?,
    })
}

/// One past the highest `version_N` directory under `root`, or 0.
fn next_version(root: &Path) -> Result<usize> {
    let mut highest: Option<usize> = None;
    for entry in fs::read_dir(root)
        .with_context(|| format!("Cannot read directory '{}'", root.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let parsed = name
            .to_str()
            .and_then(|n| n.strip_prefix(VERSION_PREFIX))
            .and_then(|n| n.parse::<usize>().ok());
        if let Some(v) = parsed {
            highest = Some(highest.map_or(v, |h| h.max(v)));
        }
    }
    Ok(highest.map_or(0, |h| h + 1))
}
