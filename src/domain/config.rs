// ============================================================
// Layer 3 — Run Configuration
// ============================================================
// The typed form of a run document. A document has exactly
// five sections:
//
//   model_params    — which model to build and its architecture
//   exp_params      — seed, optimiser and loss settings
//   data_params     — where the images live and how to batch them
//   trainer_params  — how long to train and on what device
//   logging_params  — where run directories are created
//
// Every section rejects keys it does not know, so a typo in a
// YAML file fails at load time instead of being silently ignored.
//
// `model_params` is special: its `name` key selects a ModelKind
// and the remaining keys are deserialised into the parameter
// struct of that kind only.

use std::path::PathBuf;

use serde::{de::DeserializeOwned, Deserialize, Serialize, Serializer};

use crate::domain::error::ConfigError;
use crate::domain::model_kind::ModelKind;

// ─── Top-level document ──────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub model_params:   ModelParams,
    pub exp_params:     ExpParams,
    pub data_params:    DataParams,
    pub trainer_params: TrainerParams,
    pub logging_params: LoggingParams,
}

impl RunConfig {
    /// Name used for the logger namespace and artifact file names.
    /// Always the model kind, whatever `logging_params.name` says.
    pub fn run_name(&self) -> &'static str {
        self.model_params.kind().name()
    }

    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model_params.validate()?;
        self.exp_params.validate()?;
        self.data_params.validate()?;
        self.trainer_params.validate()?;

        // The encoder halves the spatial size once per hidden layer,
        // so the patch must survive that many halvings exactly.
        let downsample = 1usize << self.model_params.hidden_dims().len();
        let patch      = self.data_params.patch_size;
        if patch % downsample != 0 {
            return Err(ConfigError::invalid(
                "data_params",
                "patch_size",
                format!(
                    "{patch} is not divisible by 2^{} (one halving per hidden dim)",
                    self.model_params.hidden_dims().len()
                ),
            ));
        }
        Ok(())
    }
}

// ─── model_params ─────────────────────────────────────────────────────────────
fn default_hidden_dims() -> Vec<usize> {
    vec![32, 64, 128, 256, 512]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VanillaVaeParams {
    pub in_channels: usize,
    pub latent_dim:  usize,
    #[serde(default = "default_hidden_dims")]
    pub hidden_dims: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BetaLossType {
    /// Higgins et al.: weight the KL term by a constant beta.
    #[default]
    #[serde(rename = "H")]
    Higgins,
    /// Burgess et al.: pull the KL term towards a growing capacity C.
    #[serde(rename = "B")]
    Burgess,
}

fn default_beta() -> f64 { 4.0 }
fn default_gamma() -> f64 { 1000.0 }
fn default_max_capacity() -> f64 { 25.0 }
fn default_capacity_max_iter() -> u64 { 100_000 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BetaVaeParams {
    pub in_channels: usize,
    pub latent_dim:  usize,
    #[serde(default = "default_hidden_dims")]
    pub hidden_dims: Vec<usize>,
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    #[serde(default = "default_max_capacity")]
    pub max_capacity: f64,
    #[serde(
        rename = "Capacity_max_iter",
        alias = "capacity_max_iter",
        default = "default_capacity_max_iter"
    )]
    pub capacity_max_iter: u64,
    #[serde(default)]
    pub loss_type: BetaLossType,
}

/// Typed model parameters, one variant per ModelKind.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "serde_yaml::Mapping")]
pub enum ModelParams {
    VanillaVae(VanillaVaeParams),
    BetaVae(BetaVaeParams),
}

impl ModelParams {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelParams::VanillaVae(_) => ModelKind::VanillaVae,
            ModelParams::BetaVae(_)    => ModelKind::BetaVae,
        }
    }

    pub fn in_channels(&self) -> usize {
        match self {
            ModelParams::VanillaVae(p) => p.in_channels,
            ModelParams::BetaVae(p)    => p.in_channels,
        }
    }

    pub fn latent_dim(&self) -> usize {
        match self {
            ModelParams::VanillaVae(p) => p.latent_dim,
            ModelParams::BetaVae(p)    => p.latent_dim,
        }
    }

    pub fn hidden_dims(&self) -> &[usize] {
        match self {
            ModelParams::VanillaVae(p) => &p.hidden_dims,
            ModelParams::BetaVae(p)    => &p.hidden_dims,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let kind = self.kind();
        let fail = |message: String| ConfigError::ModelParams { kind, message };

        if !matches!(self.in_channels(), 1 | 3) {
            return Err(fail(format!(
                "in_channels must be 1 (grayscale) or 3 (RGB), got {}",
                self.in_channels()
            )));
        }
        if self.latent_dim() == 0 {
            return Err(fail("latent_dim must be > 0".into()));
        }
        if self.hidden_dims().is_empty() || self.hidden_dims().contains(&0) {
            return Err(fail("hidden_dims must be a non-empty list of positive sizes".into()));
        }
        if let ModelParams::BetaVae(p) = self {
            if p.capacity_max_iter == 0 {
                return Err(fail("Capacity_max_iter must be > 0".into()));
            }
            if p.max_capacity < 0.0 {
                return Err(fail("max_capacity must be >= 0".into()));
            }
        }
        Ok(())
    }
}

fn kind_params<T: DeserializeOwned>(
    kind:  ModelKind,
    value: serde_yaml::Value,
) -> Result<T, ConfigError> {
    serde_yaml::from_value(value)
        .map_err(|e| ConfigError::ModelParams { kind, message: e.to_string() })
}

impl TryFrom<serde_yaml::Mapping> for ModelParams {
    type Error = ConfigError;

    fn try_from(mut mapping: serde_yaml::Mapping) -> Result<Self, Self::Error> {
        let name = match mapping.remove("name") {
            Some(serde_yaml::Value::String(name)) => name,
            Some(other) => {
                return Err(ConfigError::invalid(
                    "model_params",
                    "name",
                    format!("expected a string, found {other:?}"),
                ))
            }
            None => return Err(ConfigError::invalid("model_params", "name", "missing")),
        };

        let kind = name.parse::<ModelKind>()?;
        let rest = serde_yaml::Value::Mapping(mapping);
        Ok(match kind {
            ModelKind::VanillaVae => ModelParams::VanillaVae(kind_params(kind, rest)?),
            ModelKind::BetaVae    => ModelParams::BetaVae(kind_params(kind, rest)?),
        })
    }
}

// Written back out (hparams.yaml) in the same shape it was read:
// the kind name under `name`, the parameters alongside it.
#[derive(Serialize)]
struct NamedParams<'a, P: Serialize> {
    name: &'static str,
    #[serde(flatten)]
    params: &'a P,
}

impl Serialize for ModelParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let name = self.kind().name();
        match self {
            ModelParams::VanillaVae(params) => NamedParams { name, params }.serialize(serializer),
            ModelParams::BetaVae(params)    => NamedParams { name, params }.serialize(serializer),
        }
    }
}

// ─── exp_params ───────────────────────────────────────────────────────────────
fn default_kld_weight() -> f64 { 0.00025 }
fn default_num_samples() -> usize { 144 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpParams {
    pub manual_seed: u64,
    #[serde(rename = "LR")]
    pub lr: f64,
    #[serde(default)]
    pub weight_decay: f64,
    /// Multiplicative learning-rate decay applied once per epoch.
    #[serde(default)]
    pub scheduler_gamma: Option<f64>,
    #[serde(default = "default_kld_weight")]
    pub kld_weight: f64,
    /// Number of prior samples decoded after each validation pass.
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
}

impl ExpParams {
    /// Learning rate in effect during `epoch` (0-based).
    pub fn lr_at(&self, epoch: usize) -> f64 {
        match self.scheduler_gamma {
            Some(gamma) => self.lr * gamma.powi(epoch as i32),
            None        => self.lr,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(ConfigError::invalid("exp_params", "LR", format!("must be > 0, got {}", self.lr)));
        }
        if self.weight_decay < 0.0 {
            return Err(ConfigError::invalid("exp_params", "weight_decay", "must be >= 0"));
        }
        if let Some(gamma) = self.scheduler_gamma {
            if !(gamma > 0.0 && gamma <= 1.0) {
                return Err(ConfigError::invalid(
                    "exp_params",
                    "scheduler_gamma",
                    format!("must be in (0, 1], got {gamma}"),
                ));
            }
        }
        if self.num_samples == 0 {
            return Err(ConfigError::invalid("exp_params", "num_samples", "must be > 0"));
        }
        Ok(())
    }
}

// ─── data_params ──────────────────────────────────────────────────────────────
fn default_val_batch_size() -> usize { 64 }
fn default_patch_size() -> usize { 64 }
fn default_val_split() -> f64 { 0.1 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataParams {
    pub data_path: PathBuf,
    pub train_batch_size: usize,
    #[serde(default = "default_val_batch_size")]
    pub val_batch_size: usize,
    #[serde(default = "default_patch_size")]
    pub patch_size: usize,
    #[serde(default)]
    pub num_workers: usize,
    /// Fraction held out for validation when the data directory
    /// has no explicit `train/` + `val/` layout.
    #[serde(default = "default_val_split")]
    pub val_split: f64,
}

impl DataParams {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.train_batch_size == 0 {
            return Err(ConfigError::invalid("data_params", "train_batch_size", "must be > 0"));
        }
        if self.val_batch_size == 0 {
            return Err(ConfigError::invalid("data_params", "val_batch_size", "must be > 0"));
        }
        if self.patch_size == 0 {
            return Err(ConfigError::invalid("data_params", "patch_size", "must be > 0"));
        }
        if !(self.val_split > 0.0 && self.val_split < 1.0) {
            return Err(ConfigError::invalid(
                "data_params",
                "val_split",
                format!("must be in (0, 1), got {}", self.val_split),
            ));
        }
        Ok(())
    }
}

// ─── trainer_params ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accelerator {
    /// GPU through wgpu when an adapter is available, CPU otherwise.
    #[default]
    Auto,
    Cpu,
    Gpu,
}

fn default_devices() -> usize { 1 }
fn default_log_every_n_steps() -> usize { 50 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainerParams {
    pub max_epochs: usize,
    #[serde(default)]
    pub accelerator: Accelerator,
    #[serde(default = "default_devices")]
    pub devices: usize,
    #[serde(default = "default_log_every_n_steps")]
    pub log_every_n_steps: usize,
    #[serde(default)]
    pub limit_train_batches: Option<usize>,
}

impl TrainerParams {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_epochs == 0 {
            return Err(ConfigError::invalid("trainer_params", "max_epochs", "must be > 0"));
        }
        if self.devices == 0 {
            return Err(ConfigError::invalid("trainer_params", "devices", "must be > 0"));
        }
        if self.log_every_n_steps == 0 {
            return Err(ConfigError::invalid("trainer_params", "log_every_n_steps", "must be > 0"));
        }
        if self.limit_train_batches == Some(0) {
            return Err(ConfigError::invalid("trainer_params", "limit_train_batches", "must be > 0"));
        }
        Ok(())
    }
}

// ─── logging_params ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingParams {
    pub save_dir: PathBuf,
    /// Accepted and recorded in hparams.yaml; run directories are
    /// named after the model kind.
    #[serde(default)]
    pub name: Option<String>,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    const VANILLA: &str = r#"
model_params:
  name: VanillaVAE
  in_channels: 3
  latent_dim: 128
exp_params:
  manual_seed: 42
  LR: 0.0005
data_params:
  data_path: ./data
  train_batch_size: 64
trainer_params:
  max_epochs: 1
logging_params:
  save_dir: logs/
  name: VanillaVAE
"#;

    fn parse(doc: &str) -> Result<RunConfig, serde_yaml::Error> {
        serde_yaml::from_str(doc)
    }

    #[test]
    fn test_vanilla_document_parses_with_defaults() {
        let cfg = parse(VANILLA).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.model_params.kind(), ModelKind::VanillaVae);
        assert_eq!(cfg.model_params.hidden_dims(), &[32, 64, 128, 256, 512]);
        assert_eq!(cfg.exp_params.kld_weight, 0.00025);
        assert_eq!(cfg.data_params.patch_size, 64);
        assert_eq!(cfg.trainer_params.accelerator, Accelerator::Auto);
        assert_eq!(cfg.run_name(), "VanillaVAE");
    }

    #[test]
    fn test_run_name_ignores_logging_name() {
        let doc = VANILLA.replace("save_dir: logs/\n  name: VanillaVAE", "save_dir: logs/\n  name: MyExperiment");
        let cfg = parse(&doc).unwrap();
        assert_eq!(cfg.logging_params.name.as_deref(), Some("MyExperiment"));
        assert_eq!(cfg.run_name(), "VanillaVAE");
    }

    #[test]
    fn test_beta_params_accept_original_key_spelling() {
        let doc = VANILLA.replace(
            "name: VanillaVAE\n  in_channels",
            "name: BetaVAE\n  loss_type: B\n  Capacity_max_iter: 10000\n  gamma: 10.0\n  in_channels",
        );
        let cfg = parse(&doc).unwrap();
        match cfg.model_params {
            ModelParams::BetaVae(p) => {
                assert_eq!(p.loss_type, BetaLossType::Burgess);
                assert_eq!(p.capacity_max_iter, 10_000);
                assert_eq!(p.gamma, 10.0);
                assert_eq!(p.beta, 4.0);
            }
            other => panic!("expected BetaVAE, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_model_name_is_rejected() {
        let doc = VANILLA.replace("name: VanillaVAE\n  in", "name: NopeVAE\n  in");
        let err = parse(&doc).unwrap_err().to_string();
        assert!(err.contains("unknown model kind `NopeVAE`"), "{err}");
    }

    #[test]
    fn test_extra_model_argument_is_rejected() {
        let doc = VANILLA.replace("latent_dim: 128", "latent_dim: 128\n  beta: 4");
        let err = parse(&doc).unwrap_err().to_string();
        assert!(err.contains("invalid model_params for VanillaVAE"), "{err}");
        assert!(err.contains("beta"), "{err}");
    }

    #[test]
    fn test_missing_sections_are_rejected() {
        for section in ["model_params", "exp_params", "data_params", "trainer_params", "logging_params"] {
            let mut value: serde_yaml::Value = serde_yaml::from_str(VANILLA).unwrap();
            value.as_mapping_mut().unwrap().remove(section);
            let err = serde_yaml::from_value::<RunConfig>(value).unwrap_err().to_string();
            assert!(err.contains(section), "missing {section} gave: {err}");
        }
    }

    #[test]
    fn test_manual_seed_must_be_integer() {
        let doc = VANILLA.replace("manual_seed: 42", "manual_seed: 4.2");
        assert!(parse(&doc).is_err());
    }

    #[test]
    fn test_patch_size_must_survive_downsampling() {
        let doc = VANILLA.replace("train_batch_size: 64", "train_batch_size: 64\n  patch_size: 48");
        let cfg = parse(&doc).unwrap();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("patch_size"), "{err}");
    }

    #[test]
    fn test_in_channels_limited_to_image_layouts() {
        let doc = VANILLA.replace("in_channels: 3", "in_channels: 4");
        let cfg = parse(&doc).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_lr_schedule_decays_per_epoch() {
        let mut exp = parse(VANILLA).unwrap().exp_params;
        assert_eq!(exp.lr_at(3), 0.0005);
        exp.scheduler_gamma = Some(0.5);
        assert!((exp.lr_at(2) - 0.000125).abs() < 1e-12);
    }

    #[test]
    fn test_hparams_serialise_back_to_named_mapping() {
        let cfg  = parse(VANILLA).unwrap();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        assert!(yaml.contains("name: VanillaVAE"));
        let again = parse(&yaml).unwrap();
        assert_eq!(again, cfg);
    }
}
