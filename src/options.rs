// This software is licensed under a dual license model:
//
// GNU Affero General Public License v3 (AGPLv3): You may use, modify, and
// distribute this software under the terms of the AGPLv3.
//
// Elastic License v2 (ELv2): You may also use, modify, and distribute this
// software under the Elastic License v2, which has specific restrictions.
//
// We welcome any commercial collaboration or support. For inquiries
// regarding the licenses, please contact us at:
// vectorchord-inquiry@tensorchord.ai
//
// Copyright (c) 2025 TensorChord Inc.

use random_projection::Element;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("failed to parse options: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid options: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// Dimension sweep of the orthonormality check.
///
/// `src_dim` runs from `min_dim` to `max_dim`, stepping by one below
/// `fine_limit` and by `coarse_step` from there on. For each `src_dim`,
/// `dst_dim` starts at one and steps the same way while it stays below
/// `src_dim`; `dst_dim == src_dim` is added with `include_square`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "Self::validate_self"))]
pub struct SweepOptions {
    #[serde(default = "SweepOptions::default_min_dim")]
    #[validate(range(min = 1, max = 65535))]
    pub min_dim: u32,
    #[serde(default = "SweepOptions::default_max_dim")]
    #[validate(range(min = 1, max = 65535))]
    pub max_dim: u32,
    #[serde(default = "SweepOptions::default_fine_limit")]
    #[validate(range(min = 1, max = 65535))]
    pub fine_limit: u32,
    #[serde(default = "SweepOptions::default_coarse_step")]
    #[validate(range(min = 1, max = 1024))]
    pub coarse_step: u32,
    #[serde(default = "SweepOptions::default_include_square")]
    pub include_square: bool,
    #[serde(default = "SweepOptions::default_repetitions")]
    #[validate(range(min = 1, max = 1024))]
    pub repetitions: u32,
    #[serde(default = "SweepOptions::default_f32_tolerance")]
    pub f32_tolerance: f32,
    #[serde(default = "SweepOptions::default_f64_tolerance")]
    pub f64_tolerance: f64,
    #[serde(default = "SweepOptions::default_threads")]
    #[validate(range(min = 1, max = 255))]
    pub threads: u16,
    #[serde(default = "SweepOptions::default_seed")]
    pub seed: Option<u64>,
}

impl SweepOptions {
    fn default_min_dim() -> u32 {
        1
    }
    fn default_max_dim() -> u32 {
        128
    }
    fn default_fine_limit() -> u32 {
        32
    }
    fn default_coarse_step() -> u32 {
        8
    }
    fn default_include_square() -> bool {
        false
    }
    fn default_repetitions() -> u32 {
        2
    }
    fn default_f32_tolerance() -> f32 {
        f32::TOLERANCE
    }
    fn default_f64_tolerance() -> f64 {
        f64::TOLERANCE
    }
    fn default_threads() -> u16 {
        1
    }
    fn default_seed() -> Option<u64> {
        None
    }
    pub fn validate_self(&self) -> Result<(), ValidationError> {
        if self.min_dim > self.max_dim {
            return Err(ValidationError::new("`min_dim` should not exceed `max_dim`"));
        }
        if !(self.f32_tolerance.is_finite() && self.f32_tolerance > 0.0) {
            return Err(ValidationError::new("`f32_tolerance` should be positive"));
        }
        if !(self.f64_tolerance.is_finite() && self.f64_tolerance > 0.0) {
            return Err(ValidationError::new("`f64_tolerance` should be positive"));
        }
        Ok(())
    }

    pub fn from_toml(s: &str) -> Result<Self, OptionsError> {
        let options = toml::from_str::<Self>(s)?;
        options.validate()?;
        Ok(options)
    }
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            min_dim: Self::default_min_dim(),
            max_dim: Self::default_max_dim(),
            fine_limit: Self::default_fine_limit(),
            coarse_step: Self::default_coarse_step(),
            include_square: Self::default_include_square(),
            repetitions: Self::default_repetitions(),
            f32_tolerance: Self::default_f32_tolerance(),
            f64_tolerance: Self::default_f64_tolerance(),
            threads: Self::default_threads(),
            seed: Self::default_seed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_default() {
        assert_eq!(SweepOptions::from_toml("").unwrap(), SweepOptions::default());
        assert!(SweepOptions::default().validate().is_ok());
    }

    #[test]
    fn parse_fields() {
        let options = SweepOptions::from_toml(
            r#"
            min_dim = 32
            max_dim = 64
            include_square = true
            threads = 4
            seed = 42
            f32_tolerance = 1e-4
            "#,
        )
        .unwrap();
        assert_eq!(options.min_dim, 32);
        assert_eq!(options.max_dim, 64);
        assert!(options.include_square);
        assert_eq!(options.threads, 4);
        assert_eq!(options.seed, Some(42));
        assert_eq!(options.f32_tolerance, 1e-4);
        assert_eq!(options.f64_tolerance, 1e-10);
        assert_eq!(options.repetitions, 2);
    }

    #[test]
    fn reject_invalid() {
        assert!(matches!(
            SweepOptions::from_toml("unknown = 1"),
            Err(OptionsError::Parse(_))
        ));
        for s in [
            "min_dim = 0",
            "min_dim = 10\nmax_dim = 9",
            "threads = 0",
            "coarse_step = 0",
            "f32_tolerance = 0.0",
            "f64_tolerance = -1e-10",
            "f64_tolerance = nan",
        ] {
            assert!(
                matches!(SweepOptions::from_toml(s), Err(OptionsError::Invalid(_))),
                "{s}"
            );
        }
    }
}
