//! PIE: pseudo-invertible encoder flow.
//!
//! Data `x` in ambient space is mapped by an outer bijection to `h`, which is
//! split into manifold coordinates `h_manifold` and orthogonal coordinates
//! `h_orthogonal`. An inner bijection maps `h_manifold` to the manifold latent
//! `u`. The density is
//!
//! ```text
//! log p(x) = log p_u(u) + log p_orth(h_orthogonal) + log|det J_outer| + log|det J_inner|
//! ```
//!
//! where `p_u` is a standard normal and `p_orth` a normal with scale `epsilon`.

use mf_core::{Error, ParameterCount, ParameterReporter, Result, Shape, Transform};
use mf_prob::distributions::DEFAULT_ORTHOGONAL_CLIP;
use mf_prob::{BaseDistribution, RescaledNormal, StandardNormal};
use nalgebra::{DMatrix, DVector};
use rand::RngCore;

use crate::flow::{Encoding, Flow, FlowOutput};
use crate::projection::ProjectionSplit;
use crate::report::LogReporter;
use crate::transforms::IdentityTransform;

/// Default scale of the orthogonal noise distribution.
pub const DEFAULT_EPSILON: f64 = 1.0e-3;

/// Construction options for [`Pie`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PieOptions {
    /// Scale of the orthogonal latent distribution.
    pub epsilon: f64,
    /// Pass the context to the outer transform (the inner one always gets it).
    pub apply_context_to_outer: bool,
    /// Clamp for orthogonal latents before scoring (`None` disables it).
    pub orthogonal_clip: Option<f64>,
}

impl Default for PieOptions {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            apply_context_to_outer: true,
            orthogonal_clip: Some(DEFAULT_ORTHOGONAL_CLIP),
        }
    }
}

/// PIE flow model.
pub struct Pie {
    data_shape: Shape,
    latent_shape: Shape,
    total_data_dim: usize,
    total_latent_dim: usize,
    epsilon: f64,
    apply_context_to_outer: bool,
    manifold_latent_distribution: StandardNormal,
    orthogonal_latent_distribution: RescaledNormal,
    projection: ProjectionSplit,
    outer_transform: Box<dyn Transform>,
    inner_transform: Box<dyn Transform>,
}

impl Pie {
    /// Build a model and log its size via [`LogReporter`].
    ///
    /// `inner_transform = None` uses the identity. Fails with
    /// [`Error::Dimension`] unless the latent space is strictly smaller than
    /// the data space.
    pub fn new(
        data_shape: impl Into<Shape>,
        latent_shape: impl Into<Shape>,
        outer_transform: Box<dyn Transform>,
        inner_transform: Option<Box<dyn Transform>>,
        options: PieOptions,
    ) -> Result<Self> {
        Self::with_reporter(
            data_shape,
            latent_shape,
            outer_transform,
            inner_transform,
            options,
            &LogReporter,
        )
    }

    /// Like [`Pie::new`], reporting the parameter count to `reporter`.
    pub fn with_reporter(
        data_shape: impl Into<Shape>,
        latent_shape: impl Into<Shape>,
        outer_transform: Box<dyn Transform>,
        inner_transform: Option<Box<dyn Transform>>,
        options: PieOptions,
        reporter: &dyn ParameterReporter,
    ) -> Result<Self> {
        let data_shape = data_shape.into();
        let latent_shape = latent_shape.into();
        if data_shape.is_degenerate() || latent_shape.is_degenerate() {
            return Err(Error::Dimension(format!(
                "data shape {data_shape} and latent shape {latent_shape} must be non-empty"
            )));
        }
        let total_data_dim = data_shape.total();
        let total_latent_dim = latent_shape.total();
        if total_latent_dim >= total_data_dim {
            return Err(Error::Dimension(format!(
                "latent dim {total_latent_dim} ({latent_shape}) must be smaller than \
                 data dim {total_data_dim} ({data_shape})"
            )));
        }

        let inner_transform = inner_transform.unwrap_or_else(|| Box::new(IdentityTransform));
        check_width(outer_transform.as_ref(), total_data_dim, "outer")?;
        check_width(inner_transform.as_ref(), total_latent_dim, "inner")?;

        let manifold_latent_distribution = StandardNormal::new(total_latent_dim);
        let orthogonal_latent_distribution = RescaledNormal::with_clip(
            total_data_dim - total_latent_dim,
            options.epsilon,
            options.orthogonal_clip,
        )?;
        let projection = ProjectionSplit::new(total_data_dim, total_latent_dim)?;

        let pie = Self {
            data_shape,
            latent_shape,
            total_data_dim,
            total_latent_dim,
            epsilon: options.epsilon,
            apply_context_to_outer: options.apply_context_to_outer,
            manifold_latent_distribution,
            orthogonal_latent_distribution,
            projection,
            outer_transform,
            inner_transform,
        };
        reporter.report("PIE", pie.parameter_count());
        Ok(pie)
    }

    /// Flattened data width.
    pub fn total_data_dim(&self) -> usize {
        self.total_data_dim
    }

    /// Flattened manifold latent width.
    pub fn total_latent_dim(&self) -> usize {
        self.total_latent_dim
    }

    /// Scale of the orthogonal latent distribution.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Whether the outer transform receives the context.
    pub fn applies_context_to_outer(&self) -> bool {
        self.apply_context_to_outer
    }

    /// Distribution of the manifold latents `u`.
    pub fn manifold_latent_distribution(&self) -> &StandardNormal {
        &self.manifold_latent_distribution
    }

    /// Distribution of the orthogonal latents.
    pub fn orthogonal_latent_distribution(&self) -> &RescaledNormal {
        &self.orthogonal_latent_distribution
    }

    /// Ambient-space bijection.
    pub fn outer_transform(&self) -> &dyn Transform {
        self.outer_transform.as_ref()
    }

    /// Latent-space bijection.
    pub fn inner_transform(&self) -> &dyn Transform {
        self.inner_transform.as_ref()
    }

    /// Manifold/orthogonal split.
    pub fn projection(&self) -> &ProjectionSplit {
        &self.projection
    }

    /// Full encoding pass, keeping every intermediate.
    pub fn encoding(&self, x: &DMatrix<f64>, context: Option<&DMatrix<f64>>) -> Result<Encoding> {
        let (h, log_det_outer) = self.outer_transform.forward(x, self.outer_context(context))?;
        let (h_manifold, h_orthogonal) = self.projection.forward(&h)?;
        let (u, log_det_inner) = self.inner_transform.forward(&h_manifold, context)?;
        Ok(Encoding { u, h_manifold, h_orthogonal, log_det_inner, log_det_outer })
    }

    fn outer_context<'a>(&self, context: Option<&'a DMatrix<f64>>) -> Option<&'a DMatrix<f64>> {
        if self.apply_context_to_outer { context } else { None }
    }

    fn density(&self, enc: &Encoding) -> Result<DVector<f64>> {
        let log_prob = self.manifold_latent_distribution.log_prob(&enc.u, None)?
            + self.orthogonal_latent_distribution.log_prob(&enc.h_orthogonal, None)?
            + &enc.log_det_outer
            + &enc.log_det_inner;
        Ok(log_prob)
    }
}

fn check_width(t: &dyn Transform, expected: usize, role: &str) -> Result<()> {
    match t.features() {
        Some(f) if f != expected => Err(Error::Shape(format!(
            "{role} transform '{}' has {f} features, expected {expected}",
            t.name()
        ))),
        _ => Ok(()),
    }
}

impl Flow for Pie {
    fn data_shape(&self) -> &Shape {
        &self.data_shape
    }

    fn latent_shape(&self) -> &Shape {
        &self.latent_shape
    }

    fn forward(
        &self,
        x: &DMatrix<f64>,
        slice_of_pie: bool,
        context: Option<&DMatrix<f64>>,
    ) -> Result<FlowOutput> {
        let projected;
        let x = if slice_of_pie {
            projected = self.project(x, context)?;
            &projected
        } else {
            x
        };

        let enc = self.encoding(x, context)?;
        let x_out = if slice_of_pie { x.clone() } else { self.decode(&enc.u, None, context)? };
        let log_prob = self.density(&enc)?;
        Ok(FlowOutput { x: x_out, log_prob, u: enc.u })
    }

    fn encode(&self, x: &DMatrix<f64>, context: Option<&DMatrix<f64>>) -> Result<DMatrix<f64>> {
        Ok(self.encoding(x, context)?.u)
    }

    fn decode(
        &self,
        u: &DMatrix<f64>,
        u_orthogonal: Option<&DMatrix<f64>>,
        context: Option<&DMatrix<f64>>,
    ) -> Result<DMatrix<f64>> {
        let (h_manifold, _) = self.inner_transform.inverse(u, context)?;
        let h = self.projection.inverse(&h_manifold, u_orthogonal)?;
        let (x, _) = self.outer_transform.inverse(&h, self.outer_context(context))?;
        Ok(x)
    }

    fn log_prob(
        &self,
        x: &DMatrix<f64>,
        slice_of_pie: bool,
        context: Option<&DMatrix<f64>>,
    ) -> Result<DVector<f64>> {
        let enc = if slice_of_pie {
            let projected = self.project(x, context)?;
            self.encoding(&projected, context)?
        } else {
            self.encoding(x, context)?
        };
        self.density(&enc)
    }

    fn sample(
        &self,
        u: Option<&DMatrix<f64>>,
        n: usize,
        context: Option<&DMatrix<f64>>,
        sample_orthogonal: bool,
        rng: &mut dyn RngCore,
    ) -> Result<DMatrix<f64>> {
        let drawn;
        let u = match u {
            Some(u) => u,
            None => {
                drawn = self.manifold_latent_distribution.sample(n, context, rng)?;
                &drawn
            }
        };
        let u_orthogonal = if sample_orthogonal {
            Some(self.orthogonal_latent_distribution.sample(u.nrows(), context, rng)?)
        } else {
            None
        };
        self.decode(u, u_orthogonal.as_ref(), context)
    }

    fn parameter_count(&self) -> ParameterCount {
        self.outer_transform.parameter_count() + self.inner_transform.parameter_count()
    }
}
