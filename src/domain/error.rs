// ============================================================
// Layer 3 — Configuration Errors
// ============================================================
// Everything that can go wrong between "here is a path" and
// "here is a validated RunConfig" is one of these variants.
//
// The CLI singles this type out: a ConfigError means the run
// never started, so it is reported and the process exits 1
// without touching the filesystem.

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::model_kind::ModelKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file '{}': {source}", path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file '{}': {source}", path.display())]
    Parse {
        path:   PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unknown model kind `{name}`; expected one of: {expected}")]
    UnknownModel { name: String, expected: String },

    #[error("invalid model_params for {kind}: {message}")]
    ModelParams { kind: ModelKind, message: String },

    #[error("invalid {section}.{field}: {message}")]
    Invalid {
        section: &'static str,
        field:   &'static str,
        message: String,
    },
}

impl ConfigError {
    pub fn invalid(section: &'static str, field: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid { section, field, message: message.into() }
    }
}
