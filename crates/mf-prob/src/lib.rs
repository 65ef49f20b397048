//! Probability building blocks for manifold-flow.
//!
//! This crate hosts the probability math used by flow models:
//! - base distributions over latent batches (log-density and sampling)
//! - isotropic normal log-normalizer
//! - small numeric helpers (stable sigmoid)

pub mod distributions;
pub mod math;
pub mod normal;

pub use distributions::{BaseDistribution, RescaledNormal, StandardNormal};
