//! # mf-core
//!
//! Core types, errors and capability traits shared by the manifold-flow crates.
//!
//! Flow models are written against the traits in [`traits`]; concrete
//! bijections, distributions and reporters live in `mf-prob` and `mf-flows`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{ParameterReporter, Transform};
pub use types::{ParameterCount, Shape};

/// Crate version, shared by every workspace member.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
