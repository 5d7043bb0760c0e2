// ============================================================
// Layer 5 — Model Registry
// ============================================================
// Maps each ModelKind to the function that builds it. The set
// of kinds is closed: adding a model means adding a ModelKind
// variant, a ModelParams variant and a constructor here, and
// the compiler points at every match that needs updating.
//
//   VanillaVAE → conv VAE + Objective::Vanilla
//   BetaVAE    → conv VAE + Objective::BetaHiggins / BetaBurgess

use burn::prelude::*;

use crate::domain::{config::ModelParams, error::ConfigError, model_kind::ModelKind};
use crate::ml::{
    loss::Objective,
    model::{Vae, VaeConfig},
};

/// A built model: the network plus the objective it trains against.
#[derive(Debug, Clone)]
pub struct VaeModel<B: Backend> {
    pub kind:      ModelKind,
    pub net:       Vae<B>,
    pub objective: Objective,
}

pub type Constructor<B> =
    fn(&ModelParams, usize, &<B as Backend>::Device) -> Result<VaeModel<B>, ConfigError>;

/// The constructor registered for `kind`.
pub fn constructor<B: Backend>(kind: ModelKind) -> Constructor<B> {
    match kind {
        ModelKind::VanillaVae => build_vanilla::<B>,
        ModelKind::BetaVae    => build_beta::<B>,
    }
}

/// Build the model described by `params` for images of `patch_size` pixels.
pub fn build_model<B: Backend>(
    params:     &ModelParams,
    patch_size: usize,
    device:     &B::Device,
) -> Result<VaeModel<B>, ConfigError> {
    let model = constructor::<B>(params.kind())(params, patch_size, device)?;
    tracing::info!(
        "Built {} (latent_dim={}, hidden_dims={:?}, objective={:?})",
        model.kind,
        params.latent_dim(),
        params.hidden_dims(),
        model.objective,
    );
    Ok(model)
}

fn network_config(params: &ModelParams, patch_size: usize) -> VaeConfig {
    VaeConfig::new(
        params.in_channels(),
        params.latent_dim(),
        params.hidden_dims().to_vec(),
        patch_size,
    )
}

fn mismatch(expected: ModelKind, params: &ModelParams) -> ConfigError {
    ConfigError::ModelParams {
        kind:    expected,
        message: format!("constructor received {} parameters", params.kind()),
    }
}

fn build_vanilla<B: Backend>(
    params:     &ModelParams,
    patch_size: usize,
    device:     &B::Device,
) -> Result<VaeModel<B>, ConfigError> {
    let ModelParams::VanillaVae(_) = params else {
        return Err(mismatch(ModelKind::VanillaVae, params));
    };
    Ok(VaeModel {
        kind:      ModelKind::VanillaVae,
        net:       network_config(params, patch_size).init(device),
        objective: Objective::Vanilla,
    })
}

fn build_beta<B: Backend>(
    params:     &ModelParams,
    patch_size: usize,
    device:     &B::Device,
) -> Result<VaeModel<B>, ConfigError> {
    let ModelParams::BetaVae(beta) = params else {
        return Err(mismatch(ModelKind::BetaVae, params));
    };
    Ok(VaeModel {
        kind:      ModelKind::BetaVae,
        net:       network_config(params, patch_size).init(device),
        objective: Objective::beta(beta),
    })
}
