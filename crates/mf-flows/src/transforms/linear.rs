//! Dense invertible linear layer.

use mf_core::batch::ensure_width;
use mf_core::{Error, ParameterCount, Result, Transform};
use nalgebra::{DMatrix, DVector};
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

/// `y = W x + b` for every sample, with `W` square and non-singular.
///
/// The inverse and `log|det W|` are computed once from an LU factorization
/// when the layer is built.
#[derive(Debug, Clone)]
pub struct InvertibleLinear {
    weight: DMatrix<f64>,
    bias: DVector<f64>,
    weight_inv: DMatrix<f64>,
    log_abs_det: f64,
}

impl InvertibleLinear {
    /// Layer from an explicit weight matrix and bias.
    pub fn new(weight: DMatrix<f64>, bias: DVector<f64>) -> Result<Self> {
        if !weight.is_square() {
            return Err(Error::Validation(format!(
                "InvertibleLinear: weight must be square, got {}x{}",
                weight.nrows(),
                weight.ncols()
            )));
        }
        if bias.len() != weight.nrows() {
            return Err(Error::Validation(format!(
                "InvertibleLinear: bias length {} != features {}",
                bias.len(),
                weight.nrows()
            )));
        }
        let lu = weight.clone().lu();
        let det = lu.determinant();
        if !det.is_finite() || det == 0.0 {
            return Err(Error::Computation(format!(
                "InvertibleLinear: weight is singular (det = {det})"
            )));
        }
        let weight_inv = lu.try_inverse().ok_or_else(|| {
            Error::Computation("InvertibleLinear: LU inverse failed".to_string())
        })?;
        Ok(Self { weight, bias, weight_inv, log_abs_det: det.abs().ln() })
    }

    /// Identity weight, zero bias.
    pub fn identity(features: usize) -> Self {
        Self {
            weight: DMatrix::identity(features, features),
            bias: DVector::zeros(features),
            weight_inv: DMatrix::identity(features, features),
            log_abs_det: 0.0,
        }
    }

    /// Random rotation: the `Q` factor of a Gaussian matrix, zero bias.
    pub fn random_orthogonal(features: usize, rng: &mut dyn RngCore) -> Result<Self> {
        let gaussian = DMatrix::from_fn(features, features, |_, _| {
            let z: f64 = StandardNormal.sample(&mut *rng);
            z
        });
        Self::new(gaussian.qr().q(), DVector::zeros(features))
    }

    /// `log|det W|`, identical for every sample.
    pub fn log_abs_det(&self) -> f64 {
        self.log_abs_det
    }

    /// Weight matrix `W`.
    pub fn weight(&self) -> &DMatrix<f64> {
        &self.weight
    }
}

impl Transform for InvertibleLinear {
    fn name(&self) -> &str {
        "linear"
    }

    fn features(&self) -> Option<usize> {
        Some(self.bias.len())
    }

    fn forward(
        &self,
        inputs: &DMatrix<f64>,
        _context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        ensure_width(inputs, self.bias.len(), "InvertibleLinear::forward")?;
        let mut outputs = inputs * self.weight.transpose();
        for mut row in outputs.row_iter_mut() {
            row += self.bias.transpose();
        }
        Ok((outputs, DVector::from_element(inputs.nrows(), self.log_abs_det)))
    }

    fn inverse(
        &self,
        outputs: &DMatrix<f64>,
        _context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        ensure_width(outputs, self.bias.len(), "InvertibleLinear::inverse")?;
        let mut centered = outputs.clone();
        for mut row in centered.row_iter_mut() {
            row -= self.bias.transpose();
        }
        let inputs = centered * self.weight_inv.transpose();
        Ok((inputs, DVector::from_element(outputs.nrows(), -self.log_abs_det)))
    }

    fn parameter_count(&self) -> ParameterCount {
        let d = self.bias.len();
        ParameterCount::trainable(d * d + d)
    }
}
