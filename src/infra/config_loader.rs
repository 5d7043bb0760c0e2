// ============================================================
// Layer 6 — Config Loader
// ============================================================
// Reads a YAML run document from disk and returns a validated
// RunConfig. Nothing is created on disk here: a document that
// fails to load must leave the filesystem untouched.

use std::{fs, path::Path};

use crate::domain::config::RunConfig;
use crate::domain::error::ConfigError;

/// Read, parse and validate the run document at `path`.
pub fn load_config(path: &Path) -> Result<RunConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: RunConfig = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    config.validate()?;

    tracing::debug!(
        "Loaded config '{}' (model={}, max_epochs={})",
        path.display(),
        config.model_params.kind(),
        config.trainer_params.max_epochs,
    );
    Ok(config)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model_kind::ModelKind;

    fn write(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("run.yaml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_loads_valid_document() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "model_params: {name: BetaVAE, in_channels: 1, latent_dim: 8, hidden_dims: [8, 16]}\n\
             exp_params: {manual_seed: 7, LR: 0.001}\n\
             data_params: {data_path: imgs, train_batch_size: 4, patch_size: 16}\n\
             trainer_params: {max_epochs: 2}\n\
             logging_params: {save_dir: logs}\n",
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.model_params.kind(), ModelKind::BetaVae);
        assert_eq!(cfg.run_name(), "BetaVAE");
    }

    #[test]
    fn test_malformed_yaml_is_a_parse_error() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "model_params: [unclosed\n");
        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_semantic_errors_surface_after_parsing() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "model_params: {name: VanillaVAE, in_channels: 3, latent_dim: 8}\n\
             exp_params: {manual_seed: 7, LR: 0.001}\n\
             data_params: {data_path: imgs, train_batch_size: 0}\n\
             trainer_params: {max_epochs: 2}\n\
             logging_params: {save_dir: logs}\n",
        );
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "train_batch_size", .. }));
    }
}
