//! Public surface shared by flow models.

use mf_core::{ParameterCount, Result, Shape};
use nalgebra::{DMatrix, DVector};
use rand::RngCore;

/// Result of [`Flow::forward`].
#[derive(Debug, Clone)]
pub struct FlowOutput {
    /// Reconstruction (or the projected input in slice mode), `n x total_data_dim`.
    pub x: DMatrix<f64>,
    /// Per-sample log-density.
    pub log_prob: DVector<f64>,
    /// Manifold latents, `n x total_latent_dim`.
    pub u: DMatrix<f64>,
}

/// Every intermediate of a full encoding pass.
#[derive(Debug, Clone)]
pub struct Encoding {
    /// Final manifold latents (after the inner transform).
    pub u: DMatrix<f64>,
    /// Manifold coordinates before the inner transform.
    pub h_manifold: DMatrix<f64>,
    /// Off-manifold coordinates split off by the projection.
    pub h_orthogonal: DMatrix<f64>,
    /// `log|det|` of the inner transform.
    pub log_det_inner: DVector<f64>,
    /// `log|det|` of the outer transform.
    pub log_det_outer: DVector<f64>,
}

/// A generative flow with a manifold latent space.
///
/// Batches are row-major: one sample per row. `context`, when given, has one
/// row per sample or a single row shared by all samples.
pub trait Flow: Send + Sync {
    /// Shape of one data sample.
    fn data_shape(&self) -> &Shape;

    /// Shape of one manifold latent.
    fn latent_shape(&self) -> &Shape;

    /// Encode, reconstruct and score `x`.
    ///
    /// With `slice_of_pie`, `x` is first projected onto the manifold and the
    /// returned `x` is that projection; otherwise the returned `x` is the
    /// model's reconstruction from `u`.
    fn forward(
        &self,
        x: &DMatrix<f64>,
        slice_of_pie: bool,
        context: Option<&DMatrix<f64>>,
    ) -> Result<FlowOutput>;

    /// Map data to manifold latents.
    fn encode(&self, x: &DMatrix<f64>, context: Option<&DMatrix<f64>>) -> Result<DMatrix<f64>>;

    /// Map manifold latents (and optional orthogonal latents) back to data space.
    fn decode(
        &self,
        u: &DMatrix<f64>,
        u_orthogonal: Option<&DMatrix<f64>>,
        context: Option<&DMatrix<f64>>,
    ) -> Result<DMatrix<f64>>;

    /// Project data onto the learned manifold.
    fn project(&self, x: &DMatrix<f64>, context: Option<&DMatrix<f64>>) -> Result<DMatrix<f64>> {
        let u = self.encode(x, context)?;
        self.decode(&u, None, context)
    }

    /// Per-sample log-density of `x`.
    fn log_prob(
        &self,
        x: &DMatrix<f64>,
        slice_of_pie: bool,
        context: Option<&DMatrix<f64>>,
    ) -> Result<DVector<f64>>;

    /// Generate samples in data space.
    ///
    /// Draws `n` manifold latents unless `u` is given. Orthogonal noise is drawn
    /// only when `sample_orthogonal` is set. This never samples from the
    /// sliced density.
    fn sample(
        &self,
        u: Option<&DMatrix<f64>>,
        n: usize,
        context: Option<&DMatrix<f64>>,
        sample_orthogonal: bool,
        rng: &mut dyn RngCore,
    ) -> Result<DMatrix<f64>>;

    /// Parameters held by the model.
    fn parameter_count(&self) -> ParameterCount;
}
