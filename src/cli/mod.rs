// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// The single entry point: read one YAML run document and hand
// it to the training use case.
//
//   vae-runner                       # uses configs/vae.yaml
//   vae-runner -c configs/bvae.yaml
//
// Exit codes:
//   0  training ran to completion
//   1  the config could not be read, parsed or validated
//      (nothing is created on disk in that case)
//   other failures propagate as errors from main

use anyhow::Result;
use clap::Parser;
use std::{path::PathBuf, process::ExitCode};

use crate::application::train_use_case::TrainUseCase;
use crate::infra::config_loader::load_config;

#[derive(Parser, Debug)]
#[command(
    name = "vae-runner",
    version,
    about = "Train a variational autoencoder from a YAML run configuration."
)]
pub struct Cli {
    /// Path to the YAML run configuration
    #[arg(short = 'c', long = "config", value_name = "FILE", default_value = "configs/vae.yaml")]
    pub config: PathBuf,
}

impl Cli {
    pub fn run(self) -> Result<ExitCode> {
        let config = match load_config(&self.config) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {e}");
                return Ok(ExitCode::from(1));
            }
        };

        let outcome = TrainUseCase::new(config).execute()?;
        println!("Training complete. Logs in {}", outcome.log_dir.display());
        Ok(ExitCode::SUCCESS)
    }
}
