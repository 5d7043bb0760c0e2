// ============================================================
// Layer 3 — Model Kinds
// ============================================================
// The closed set of model families this launcher can build.
// The string form is what appears in `model_params.name`.

use std::{fmt, str::FromStr};

use crate::domain::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    VanillaVae,
    BetaVae,
}

impl ModelKind {
    /// Every registered kind, in the order they are listed in error messages.
    pub const ALL: [ModelKind; 2] = [ModelKind::VanillaVae, ModelKind::BetaVae];

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::VanillaVae => "VanillaVAE",
            ModelKind::BetaVae    => "BetaVAE",
        }
    }

    fn expected_names() -> String {
        Self::ALL.iter().map(|k| k.name()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ConfigError::UnknownModel {
                name:     s.to_string(),
                expected: Self::expected_names(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.name().parse::<ModelKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_name_lists_registry() {
        let err = "ConditionalVAE".parse::<ModelKind>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown model kind `ConditionalVAE`"));
        assert!(msg.contains("VanillaVAE, BetaVAE"));
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert!("vanillavae".parse::<ModelKind>().is_err());
    }
}
