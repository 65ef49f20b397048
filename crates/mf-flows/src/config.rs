//! PIE model configuration (`pie.json`) schema.
//!
//! A config describes the data and latent shapes, the orthogonal noise model,
//! context routing, and the layer stacks of the outer and inner transforms.
//! [`crate::builder::build_pie`] turns a validated config into a [`crate::Pie`].

use std::path::Path;

use mf_core::{Error, Result, Shape};
use mf_prob::distributions::DEFAULT_ORTHOGONAL_CLIP;
use serde::{Deserialize, Serialize};

use crate::pie::DEFAULT_EPSILON;
use crate::transforms::MaskKind;

/// Expected value of [`PieConfig::schema_version`] for the current format.
pub const PIE_CONFIG_SCHEMA_VERSION: &str = "manifold_flow_pie_v0";

/// Top-level model config (deserialized from JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieConfig {
    /// Schema version tag (must be `"manifold_flow_pie_v0"`).
    pub schema_version: String,
    /// Shape of one data sample.
    pub data_shape: Shape,
    /// Shape of one manifold latent; must hold fewer entries than `data_shape`.
    pub latent_shape: Shape,
    /// Scale of the orthogonal noise distribution.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Pass the context to the outer transform.
    #[serde(default = "default_true")]
    pub apply_context_to_outer: bool,
    /// Width of the conditioning context (0 for unconditional models).
    #[serde(default)]
    pub context_features: usize,
    /// Clamp for orthogonal latents before scoring; `null` disables it.
    #[serde(default = "default_orthogonal_clip")]
    pub orthogonal_clip: Option<f64>,
    /// Seed for layer initialization.
    #[serde(default)]
    pub seed: u64,
    /// Layers of the outer (ambient-space) transform, applied in order.
    pub outer: Vec<LayerConfig>,
    /// Layers of the inner (latent-space) transform; empty means identity.
    #[serde(default)]
    pub inner: Vec<LayerConfig>,
}

/// One layer of a transform stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerConfig {
    /// Per-feature affine normalization, identity-initialized.
    ActNorm,
    /// Dense invertible linear layer.
    Linear {
        /// Weight initialization.
        #[serde(default)]
        init: LinearInit,
    },
    /// Feature permutation.
    Permutation {
        /// Which permutation to use.
        #[serde(default)]
        kind: PermutationKind,
    },
    /// RealNVP affine coupling layer.
    AffineCoupling {
        /// Conditioner hidden width.
        hidden: usize,
        /// Number of conditioner hidden layers.
        #[serde(default = "default_conditioner_layers")]
        layers: usize,
        /// Coordinates passed through unchanged.
        mask: MaskKind,
    },
}

/// Weight initialization for [`LayerConfig::Linear`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearInit {
    /// Identity matrix.
    Identity,
    /// Random rotation.
    #[default]
    RandomOrthogonal,
}

/// Permutation choice for [`LayerConfig::Permutation`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermutationKind {
    /// Reverse the feature order.
    #[default]
    Reverse,
    /// Seeded random permutation.
    Random,
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

fn default_true() -> bool {
    true
}

fn default_orthogonal_clip() -> Option<f64> {
    Some(DEFAULT_ORTHOGONAL_CLIP)
}

fn default_conditioner_layers() -> usize {
    2
}

impl PieConfig {
    /// Minimal config with an empty outer stack and default options.
    pub fn new(data_shape: impl Into<Shape>, latent_shape: impl Into<Shape>) -> Self {
        Self {
            schema_version: PIE_CONFIG_SCHEMA_VERSION.to_string(),
            data_shape: data_shape.into(),
            latent_shape: latent_shape.into(),
            epsilon: default_epsilon(),
            apply_context_to_outer: true,
            context_features: 0,
            orthogonal_clip: default_orthogonal_clip(),
            seed: 0,
            outer: Vec::new(),
            inner: Vec::new(),
        }
    }

    /// Load and validate a config from a JSON file path.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a config from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize as pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != PIE_CONFIG_SCHEMA_VERSION {
            return Err(Error::Validation(format!(
                "unsupported pie config schema_version: '{}' (expected '{}')",
                self.schema_version, PIE_CONFIG_SCHEMA_VERSION
            )));
        }
        if self.data_shape.is_degenerate() || self.latent_shape.is_degenerate() {
            return Err(Error::Dimension(format!(
                "pie config: data_shape {} and latent_shape {} must be non-empty",
                self.data_shape, self.latent_shape
            )));
        }
        if self.latent_shape.total() >= self.data_shape.total() {
            return Err(Error::Dimension(format!(
                "pie config: latent dim {} must be smaller than data dim {}",
                self.latent_shape.total(),
                self.data_shape.total()
            )));
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(Error::Validation(format!(
                "pie config: epsilon must be finite and > 0, got {}",
                self.epsilon
            )));
        }
        if let Some(clip) = self.orthogonal_clip.filter(|c| !c.is_finite() || *c <= 0.0) {
            return Err(Error::Validation(format!(
                "pie config: orthogonal_clip must be finite and > 0, got {clip}"
            )));
        }
        if self.outer.is_empty() {
            return Err(Error::Validation(
                "pie config: outer transform needs at least one layer".into(),
            ));
        }
        validate_stack("outer", &self.outer, self.data_shape.total())?;
        validate_stack("inner", &self.inner, self.latent_shape.total())?;
        Ok(())
    }
}

fn validate_stack(role: &str, layers: &[LayerConfig], features: usize) -> Result<()> {
    for (i, layer) in layers.iter().enumerate() {
        if let LayerConfig::AffineCoupling { hidden, layers, .. } = layer {
            if features < 2 {
                return Err(Error::Validation(format!(
                    "pie config: {role}[{i}] affine_coupling needs at least 2 features, \
                     stack has {features}"
                )));
            }
            if *hidden == 0 {
                return Err(Error::Validation(format!(
                    "pie config: {role}[{i}] affine_coupling hidden width must be > 0"
                )));
            }
            if *layers == 0 {
                return Err(Error::Validation(format!(
                    "pie config: {role}[{i}] affine_coupling needs at least one hidden layer"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"{
        "schema_version": "manifold_flow_pie_v0",
        "data_shape": [2, 3],
        "latent_shape": [2],
        "context_features": 1,
        "apply_context_to_outer": false,
        "seed": 17,
        "outer": [
            {"type": "act_norm"},
            {"type": "affine_coupling", "hidden": 16, "mask": "even"},
            {"type": "permutation", "kind": "random"},
            {"type": "linear"},
            {"type": "affine_coupling", "hidden": 16, "layers": 1, "mask": "odd"}
        ],
        "inner": [
            {"type": "affine_coupling", "hidden": 8, "mask": "even"}
        ]
    }"#;

    #[test]
    fn test_parse_with_defaults() {
        let cfg = PieConfig::from_json(EXAMPLE).unwrap();
        assert_eq!(cfg.data_shape.total(), 6);
        assert_eq!(cfg.epsilon, DEFAULT_EPSILON);
        assert_eq!(cfg.orthogonal_clip, Some(DEFAULT_ORTHOGONAL_CLIP));
        assert!(!cfg.apply_context_to_outer);
        assert_eq!(cfg.outer.len(), 5);
        assert_eq!(
            cfg.outer[1],
            LayerConfig::AffineCoupling { hidden: 16, layers: 2, mask: MaskKind::Even }
        );
        assert_eq!(cfg.outer[3], LayerConfig::Linear { init: LinearInit::RandomOrthogonal });
    }

    #[test]
    fn test_json_roundtrip_preserves_config() {
        let cfg = PieConfig::from_json(EXAMPLE).unwrap();
        let back = PieConfig::from_json(&cfg.to_json_pretty().unwrap()).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_validation_failures() {
        let mut cfg = PieConfig::new(4, 2);
        assert!(cfg.validate().is_err(), "empty outer stack");

        cfg.outer.push(LayerConfig::ActNorm);
        assert!(cfg.validate().is_ok());

        let mut bad = cfg.clone();
        bad.latent_shape = Shape::from(4);
        assert!(matches!(bad.validate(), Err(Error::Dimension(_))));

        let mut bad = cfg.clone();
        bad.latent_shape = Shape::new(vec![0]);
        assert!(matches!(bad.validate(), Err(Error::Dimension(_))));

        let mut bad = cfg.clone();
        bad.epsilon = 0.0;
        assert!(bad.validate().is_err());

        let mut bad = cfg.clone();
        bad.schema_version = "v1".into();
        assert!(bad.validate().is_err());

        let mut bad = PieConfig::new(3, 1);
        bad.outer.push(LayerConfig::ActNorm);
        bad.inner.push(LayerConfig::AffineCoupling { hidden: 4, layers: 1, mask: MaskKind::Odd });
        assert!(bad.validate().is_err(), "coupling on a 1-d latent");

        let mut bad = cfg.clone();
        bad.outer.push(LayerConfig::AffineCoupling { hidden: 8, layers: 0, mask: MaskKind::Even });
        assert!(matches!(bad.validate(), Err(Error::Validation(_))), "zero hidden layers");
    }

    #[test]
    fn test_zero_conditioner_layers_rejected_from_json() {
        let json = EXAMPLE.replace(r#""layers": 1"#, r#""layers": 0"#);
        assert!(matches!(PieConfig::from_json(&json), Err(Error::Validation(_))));
    }

    #[test]
    fn test_unknown_layer_type_is_json_error() {
        let json = EXAMPLE.replace("act_norm", "batch_norm");
        assert!(matches!(PieConfig::from_json(&json), Err(Error::Json(_))));
    }
}
