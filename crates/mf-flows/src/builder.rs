//! Assemble a [`Pie`] from a [`PieConfig`].

use mf_core::{ParameterReporter, Result, Transform};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::{LayerConfig, LinearInit, PermutationKind, PieConfig};
use crate::pie::{Pie, PieOptions};
use crate::report::LogReporter;
use crate::transforms::{
    AffineCoupling, CompositeTransform, ElementwiseAffine, InvertibleLinear, Permutation,
};

/// Validate `config` and build the model it describes, logging its size.
pub fn build_pie(config: &PieConfig) -> Result<Pie> {
    build_pie_with_reporter(config, &LogReporter)
}

/// Like [`build_pie`], reporting the parameter count to `reporter`.
///
/// Layer initialization is deterministic in `config.seed`.
pub fn build_pie_with_reporter(
    config: &PieConfig,
    reporter: &dyn ParameterReporter,
) -> Result<Pie> {
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let outer_context = if config.apply_context_to_outer { config.context_features } else { 0 };
    let outer = build_stack(&config.outer, config.data_shape.total(), outer_context, &mut rng)?;
    let inner: Option<Box<dyn Transform>> = if config.inner.is_empty() {
        None
    } else {
        Some(Box::new(build_stack(
            &config.inner,
            config.latent_shape.total(),
            config.context_features,
            &mut rng,
        )?))
    };
    log::debug!(
        "building PIE: data {} -> latent {}, outer {:?}, inner {} layers",
        config.data_shape,
        config.latent_shape,
        outer.layer_names(),
        config.inner.len(),
    );

    Pie::with_reporter(
        config.data_shape.clone(),
        config.latent_shape.clone(),
        Box::new(outer),
        inner,
        PieOptions {
            epsilon: config.epsilon,
            apply_context_to_outer: config.apply_context_to_outer,
            orthogonal_clip: config.orthogonal_clip,
        },
        reporter,
    )
}

/// Build one transform stack over `features` coordinates.
pub fn build_stack(
    layers: &[LayerConfig],
    features: usize,
    context_features: usize,
    rng: &mut StdRng,
) -> Result<CompositeTransform> {
    let mut stack = CompositeTransform::new();
    for layer in layers {
        let built: Box<dyn Transform> = match *layer {
            LayerConfig::ActNorm => Box::new(ElementwiseAffine::new(features)),
            LayerConfig::Linear { init: LinearInit::Identity } => {
                Box::new(InvertibleLinear::identity(features))
            }
            LayerConfig::Linear { init: LinearInit::RandomOrthogonal } => {
                Box::new(InvertibleLinear::random_orthogonal(features, rng)?)
            }
            LayerConfig::Permutation { kind: PermutationKind::Reverse } => {
                Box::new(Permutation::reverse(features))
            }
            LayerConfig::Permutation { kind: PermutationKind::Random } => {
                Box::new(Permutation::random(features, rng))
            }
            LayerConfig::AffineCoupling { hidden, layers, mask } => Box::new(AffineCoupling::new(
                features,
                hidden,
                layers,
                mask,
                context_features,
                rng,
            )?),
        };
        stack.push(built)?;
    }
    Ok(stack)
}
