//! Core traits for manifold-flow
//!
//! Flow models depend only on these capability traits, never on concrete
//! layer or reporting implementations.

use nalgebra::{DMatrix, DVector};

use crate::{ParameterCount, Result};

/// A batched bijection with a tractable log-determinant.
///
/// `forward` maps inputs to outputs and returns `log|det J|` per sample.
/// `inverse` maps outputs back to inputs and returns the log-determinant of the
/// inverse map, i.e. the negation of the forward term at the same point.
pub trait Transform: Send + Sync {
    /// Short layer name used in diagnostics.
    fn name(&self) -> &str;

    /// Number of features this transform operates on, or `None` if width-agnostic.
    fn features(&self) -> Option<usize>;

    /// Map `inputs -> outputs`, returning per-sample log-determinants.
    fn forward(
        &self,
        inputs: &DMatrix<f64>,
        context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)>;

    /// Map `outputs -> inputs`, returning per-sample log-determinants of the inverse.
    fn inverse(
        &self,
        outputs: &DMatrix<f64>,
        context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)>;

    /// Parameters held by this transform.
    fn parameter_count(&self) -> ParameterCount {
        ParameterCount::default()
    }
}

impl<T: Transform + ?Sized> Transform for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn features(&self) -> Option<usize> {
        (**self).features()
    }

    fn forward(
        &self,
        inputs: &DMatrix<f64>,
        context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        (**self).forward(inputs, context)
    }

    fn inverse(
        &self,
        outputs: &DMatrix<f64>,
        context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        (**self).inverse(outputs, context)
    }

    fn parameter_count(&self) -> ParameterCount {
        (**self).parameter_count()
    }
}

/// Sink for model-size diagnostics emitted when a model is constructed.
pub trait ParameterReporter: Send + Sync {
    /// Report the parameter count of the model called `model`.
    fn report(&self, model: &str, count: ParameterCount);
}
