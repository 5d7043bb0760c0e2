// ============================================================
// Layer 5 — VAE Objectives
// ============================================================
// Every objective shares the same two terms:
//
//   recons = mean((x̂ - x)²)
//   kld    = mean_batch( -½ · Σ_latent (1 + log_var - mu² - exp(log_var)) )
//
// and combines them differently:
//
//   Vanilla       loss = recons + w · kld
//   Beta (H)      loss = recons + β · w · kld
//   Beta (B)      loss = recons + γ · w · |kld - C(step)|
//                 C(step) = clamp(C_max / C_stop_iter · step, 0, C_max)
//
// `w` is the minibatch KL weight supplied by the caller.

use burn::prelude::*;

use crate::domain::config::{BetaLossType, BetaVaeParams};
use crate::ml::model::VaeOutput;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Objective {
    Vanilla,
    BetaHiggins { beta: f64 },
    BetaBurgess {
        gamma:             f64,
        max_capacity:      f64,
        capacity_max_iter: u64,
    },
}

impl Objective {
    pub fn beta(params: &BetaVaeParams) -> Self {
        match params.loss_type {
            BetaLossType::Higgins => Objective::BetaHiggins { beta: params.beta },
            BetaLossType::Burgess => Objective::BetaBurgess {
                gamma:             params.gamma,
                max_capacity:      params.max_capacity,
                capacity_max_iter: params.capacity_max_iter,
            },
        }
    }

    /// Combine the reconstruction and KL terms of one forward pass.
    ///
    /// `step` is the number of optimiser steps taken so far; only the
    /// capacity-annealed objective reads it.
    pub fn compute<B: Backend>(
        &self,
        output:     &VaeOutput<B>,
        input:      Tensor<B, 4>,
        kld_weight: f64,
        step:       usize,
    ) -> LossTerms<B> {
        let recons = reconstruction_loss(output.recons.clone(), input);
        let kld    = kl_divergence(output.mu.clone(), output.log_var.clone());

        let regulariser = match *self {
            Objective::Vanilla => kld.clone().mul_scalar(kld_weight),
            Objective::BetaHiggins { beta } => kld.clone().mul_scalar(beta * kld_weight),
            Objective::BetaBurgess { gamma, max_capacity, capacity_max_iter } => {
                let c = capacity(max_capacity, capacity_max_iter, step);
                kld.clone().sub_scalar(c).abs().mul_scalar(gamma * kld_weight)
            }
        };

        LossTerms {
            loss: recons.clone() + regulariser,
            recons,
            kld,
        }
    }
}

pub struct LossTerms<B: Backend> {
    pub loss:   Tensor<B, 1>,
    pub recons: Tensor<B, 1>,
    pub kld:    Tensor<B, 1>,
}

pub fn reconstruction_loss<B: Backend>(recons: Tensor<B, 4>, input: Tensor<B, 4>) -> Tensor<B, 1> {
    (recons - input).powf_scalar(2.0).mean()
}

pub fn kl_divergence<B: Backend>(mu: Tensor<B, 2>, log_var: Tensor<B, 2>) -> Tensor<B, 1> {
    let per_sample = (log_var.clone().add_scalar(1.0) - mu.powf_scalar(2.0) - log_var.exp())
        .sum_dim(1)
        .mul_scalar(-0.5);
    per_sample.mean()
}

/// Target KL capacity after `step` optimiser steps.
pub fn capacity(max_capacity: f64, capacity_max_iter: u64, step: usize) -> f64 {
    if capacity_max_iter == 0 {
        return max_capacity;
    }
    (max_capacity / capacity_max_iter as f64 * step as f64).clamp(0.0, max_capacity)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TB = NdArray;

    fn scalar(t: Tensor<TB, 1>) -> f64 {
        t.into_scalar().elem::<f64>()
    }

    fn output(recons: f32, mu: f32, log_var: f32) -> VaeOutput<TB> {
        let device = Default::default();
        VaeOutput {
            recons:  Tensor::<TB, 4>::full([2, 1, 2, 2], recons, &device),
            mu:      Tensor::<TB, 2>::full([2, 3], mu, &device),
            log_var: Tensor::<TB, 2>::full([2, 3], log_var, &device),
        }
    }

    fn input(v: f32) -> Tensor<TB, 4> {
        Tensor::full([2, 1, 2, 2], v, &Default::default())
    }

    #[test]
    fn test_kld_is_zero_for_standard_normal_posterior() {
        let terms = Objective::Vanilla.compute(&output(0.0, 0.0, 0.0), input(0.0), 1.0, 0);
        assert!(scalar(terms.kld).abs() < 1e-6);
        assert!(scalar(terms.loss).abs() < 1e-6);
    }

    #[test]
    fn test_kld_matches_closed_form() {
        // Per latent: -½(1 + 0 - 1 - 1) = ½, summed over 3 latents.
        let terms = Objective::Vanilla.compute(&output(0.0, 1.0, 0.0), input(0.0), 1.0, 0);
        assert!((scalar(terms.kld) - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_vanilla_weights_kld() {
        let terms = Objective::Vanilla.compute(&output(0.5, 1.0, 0.0), input(0.0), 0.1, 0);
        assert!((scalar(terms.recons.clone()) - 0.25).abs() < 1e-6);
        assert!((scalar(terms.loss) - (0.25 + 0.1 * 1.5)).abs() < 1e-5);
    }

    #[test]
    fn test_beta_higgins_scales_kld_by_beta() {
        let objective = Objective::BetaHiggins { beta: 4.0 };
        let terms     = objective.compute(&output(0.0, 1.0, 0.0), input(0.0), 0.5, 0);
        assert!((scalar(terms.loss) - 4.0 * 0.5 * 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_beta_burgess_tracks_capacity() {
        let objective = Objective::BetaBurgess {
            gamma:             10.0,
            max_capacity:      3.0,
            capacity_max_iter: 100,
        };
        // At step 50, C = 1.5 = kld, so the penalty vanishes.
        let terms = objective.compute(&output(0.0, 1.0, 0.0), input(0.0), 1.0, 50);
        assert!(scalar(terms.loss).abs() < 1e-5);

        // At step 0, C = 0 and the full |kld| is penalised.
        let terms = objective.compute(&output(0.0, 1.0, 0.0), input(0.0), 1.0, 0);
        assert!((scalar(terms.loss) - 15.0).abs() < 1e-4);
    }

    #[test]
    fn test_capacity_is_clamped() {
        assert_eq!(capacity(25.0, 100, 0), 0.0);
        assert_eq!(capacity(25.0, 100, 50), 12.5);
        assert_eq!(capacity(25.0, 100, 1_000), 25.0);
        assert_eq!(capacity(25.0, 0, 3), 25.0);
    }
}
