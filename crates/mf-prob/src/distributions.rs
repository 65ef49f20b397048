//! Base distributions over batched latent vectors.
//!
//! Every distribution is unconditional: a `context` argument is accepted for
//! interface uniformity with conditional transforms and is ignored.

use mf_core::batch::ensure_width;
use mf_core::{Error, Result};
use nalgebra::{DMatrix, DVector};
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal as StdNormalSampler};

use crate::math::sum_squares;
use crate::normal::isotropic_log_normalizer;

/// A distribution over `dim`-dimensional vectors, evaluated on row batches.
pub trait BaseDistribution: Send + Sync {
    /// Dimensionality of one sample.
    fn dim(&self) -> usize;

    /// Per-sample log-density of `inputs` (`n x dim`).
    fn log_prob(&self, inputs: &DMatrix<f64>, context: Option<&DMatrix<f64>>)
    -> Result<DVector<f64>>;

    /// Draw `n` samples as an `n x dim` batch.
    fn sample(
        &self,
        n: usize,
        context: Option<&DMatrix<f64>>,
        rng: &mut dyn RngCore,
    ) -> Result<DMatrix<f64>>;
}

/// Isotropic standard normal `N(0, I)`.
#[derive(Debug, Clone)]
pub struct StandardNormal {
    dim: usize,
    log_z: f64,
}

impl StandardNormal {
    /// Standard normal over `dim` dimensions.
    pub fn new(dim: usize) -> Self {
        Self { dim, log_z: isotropic_log_normalizer(dim, 1.0) }
    }
}

impl BaseDistribution for StandardNormal {
    fn dim(&self) -> usize {
        self.dim
    }

    fn log_prob(
        &self,
        inputs: &DMatrix<f64>,
        _context: Option<&DMatrix<f64>>,
    ) -> Result<DVector<f64>> {
        ensure_width(inputs, self.dim, "StandardNormal::log_prob")?;
        Ok(DVector::from_iterator(
            inputs.nrows(),
            inputs.row_iter().map(|row| -0.5 * sum_squares(row.iter()) - self.log_z),
        ))
    }

    fn sample(
        &self,
        n: usize,
        _context: Option<&DMatrix<f64>>,
        rng: &mut dyn RngCore,
    ) -> Result<DMatrix<f64>> {
        Ok(DMatrix::from_fn(n, self.dim, |_, _| {
            let z: f64 = StdNormalSampler.sample(&mut *rng);
            z
        }))
    }
}

/// Isotropic normal `N(0, std^2 I)` used for the near-zero orthogonal latents.
///
/// Inputs are clamped to `[-clip, clip]` before evaluating the density so that
/// points far off the manifold yield a large but finite penalty.
#[derive(Debug, Clone)]
pub struct RescaledNormal {
    dim: usize,
    std: f64,
    clip: Option<f64>,
    log_z: f64,
}

/// Default clamp applied to orthogonal latents before evaluating their density.
pub const DEFAULT_ORTHOGONAL_CLIP: f64 = 10.0;

impl RescaledNormal {
    /// Normal with scale `std` over `dim` dimensions and the default clip.
    pub fn new(dim: usize, std: f64) -> Result<Self> {
        Self::with_clip(dim, std, Some(DEFAULT_ORTHOGONAL_CLIP))
    }

    /// Normal with scale `std` and an explicit clip (`None` disables clamping).
    pub fn with_clip(dim: usize, std: f64, clip: Option<f64>) -> Result<Self> {
        if !std.is_finite() || std <= 0.0 {
            return Err(Error::Validation(format!("std must be finite and > 0, got {std}")));
        }
        if let Some(c) = clip.filter(|c| !c.is_finite() || *c <= 0.0) {
            return Err(Error::Validation(format!("clip must be finite and > 0, got {c}")));
        }
        Ok(Self { dim, std, clip, log_z: isotropic_log_normalizer(dim, std) })
    }

    /// Scale of every coordinate.
    pub fn std(&self) -> f64 {
        self.std
    }

    /// Clamp applied before evaluating the density.
    pub fn clip(&self) -> Option<f64> {
        self.clip
    }
}

impl BaseDistribution for RescaledNormal {
    fn dim(&self) -> usize {
        self.dim
    }

    fn log_prob(
        &self,
        inputs: &DMatrix<f64>,
        _context: Option<&DMatrix<f64>>,
    ) -> Result<DVector<f64>> {
        ensure_width(inputs, self.dim, "RescaledNormal::log_prob")?;
        let inv_var = 1.0 / (self.std * self.std);
        let clip = self.clip;
        Ok(DVector::from_iterator(
            inputs.nrows(),
            inputs.row_iter().map(|row| {
                let ss: f64 = row
                    .iter()
                    .map(|&v| match clip {
                        Some(c) => v.clamp(-c, c),
                        None => v,
                    })
                    .map(|v| v * v)
                    .sum();
                -0.5 * ss * inv_var - self.log_z
            }),
        ))
    }

    fn sample(
        &self,
        n: usize,
        _context: Option<&DMatrix<f64>>,
        rng: &mut dyn RngCore,
    ) -> Result<DMatrix<f64>> {
        Ok(DMatrix::from_fn(n, self.dim, |_, _| {
            let z: f64 = StdNormalSampler.sample(&mut *rng);
            self.std * z
        }))
    }
}
