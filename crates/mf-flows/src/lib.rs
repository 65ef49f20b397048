//! # mf-flows
//!
//! Manifold-learning normalizing flows for manifold-flow.
//!
//! This crate provides:
//! - Batched bijections implementing [`mf_core::Transform`] ([`transforms`]).
//! - [`ProjectionSplit`], which separates manifold and orthogonal coordinates.
//! - The [`Pie`] model and the [`Flow`] trait it implements.
//! - A JSON [`PieConfig`] and a builder that assembles models from it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod config;
pub mod flow;
pub mod pie;
pub mod projection;
pub mod report;
pub mod transforms;

pub use builder::{build_pie, build_pie_with_reporter};
pub use config::{LayerConfig, LinearInit, PermutationKind, PieConfig};
pub use flow::{Encoding, Flow, FlowOutput};
pub use pie::{Pie, PieOptions};
pub use projection::ProjectionSplit;
pub use report::{LogReporter, NullReporter};
pub use transforms::{
    AffineCoupling, CompositeTransform, ElementwiseAffine, Frozen, IdentityTransform,
    InvertibleLinear, MaskKind, Permutation,
};
