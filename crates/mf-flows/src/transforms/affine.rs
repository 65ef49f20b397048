//! Activation normalization (ActNorm).

use mf_core::batch::ensure_width;
use mf_core::{Error, ParameterCount, Result, Transform};
use nalgebra::{DMatrix, DVector};

/// Per-feature affine map `y = (x + bias) * exp(log_scale)`.
///
/// Starts as the identity. [`ElementwiseAffine::initialize`] performs the
/// data-dependent initialization so that the first batch comes out with zero
/// mean and unit variance per feature.
#[derive(Debug, Clone)]
pub struct ElementwiseAffine {
    log_scale: DVector<f64>,
    bias: DVector<f64>,
    initialized: bool,
}

impl ElementwiseAffine {
    /// Identity-initialized layer over `features` coordinates.
    pub fn new(features: usize) -> Self {
        Self {
            log_scale: DVector::zeros(features),
            bias: DVector::zeros(features),
            initialized: false,
        }
    }

    /// Layer with explicit parameters.
    pub fn from_parameters(log_scale: DVector<f64>, bias: DVector<f64>) -> Result<Self> {
        if log_scale.len() != bias.len() {
            return Err(Error::Validation(format!(
                "ActNorm: log_scale length {} != bias length {}",
                log_scale.len(),
                bias.len()
            )));
        }
        if log_scale.iter().chain(bias.iter()).any(|v| !v.is_finite()) {
            return Err(Error::Validation("ActNorm: parameters must be finite".into()));
        }
        Ok(Self { log_scale, bias, initialized: true })
    }

    /// Set `bias = -mean` and `log_scale = -ln(std + 1e-6)` from a batch.
    ///
    /// No-op once the layer has been initialized.
    pub fn initialize(&mut self, x: &DMatrix<f64>) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        ensure_width(x, self.log_scale.len(), "ActNorm::initialize")?;
        if x.nrows() < 2 {
            return Err(Error::Validation(format!(
                "ActNorm: data-dependent init needs at least 2 samples, got {}",
                x.nrows()
            )));
        }
        let n = x.nrows() as f64;
        for (j, col) in x.column_iter().enumerate() {
            let mean = col.sum() / n;
            let var = col.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
            self.bias[j] = -mean;
            self.log_scale[j] = -(var.sqrt() + 1e-6).ln();
        }
        self.initialized = true;
        Ok(())
    }

    /// Whether parameters were set from data or explicitly.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Per-feature log scales.
    pub fn log_scale(&self) -> &DVector<f64> {
        &self.log_scale
    }

    /// Per-feature shifts (applied before scaling).
    pub fn bias(&self) -> &DVector<f64> {
        &self.bias
    }
}

impl Transform for ElementwiseAffine {
    fn name(&self) -> &str {
        "act_norm"
    }

    fn features(&self) -> Option<usize> {
        Some(self.log_scale.len())
    }

    fn forward(
        &self,
        inputs: &DMatrix<f64>,
        _context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        ensure_width(inputs, self.log_scale.len(), "ActNorm::forward")?;
        let scale = self.log_scale.map(f64::exp);
        let outputs = DMatrix::from_fn(inputs.nrows(), inputs.ncols(), |i, j| {
            (inputs[(i, j)] + self.bias[j]) * scale[j]
        });
        let log_det = self.log_scale.sum();
        Ok((outputs, DVector::from_element(inputs.nrows(), log_det)))
    }

    fn inverse(
        &self,
        outputs: &DMatrix<f64>,
        _context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        ensure_width(outputs, self.log_scale.len(), "ActNorm::inverse")?;
        let inv_scale = self.log_scale.map(|s| (-s).exp());
        let inputs = DMatrix::from_fn(outputs.nrows(), outputs.ncols(), |i, j| {
            outputs[(i, j)] * inv_scale[j] - self.bias[j]
        });
        let log_det = -self.log_scale.sum();
        Ok((inputs, DVector::from_element(outputs.nrows(), log_det)))
    }

    fn parameter_count(&self) -> ParameterCount {
        ParameterCount::trainable(2 * self.log_scale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::testing::{fd_log_abs_det, max_abs_diff};
    use approx::assert_relative_eq;

    fn layer() -> ElementwiseAffine {
        ElementwiseAffine::from_parameters(
            DVector::from_vec(vec![0.3, -1.2, 0.0]),
            DVector::from_vec(vec![1.0, -0.5, 2.0]),
        )
        .unwrap()
    }

    #[test]
    fn test_roundtrip_and_log_det() {
        let t = layer();
        let x = DMatrix::from_row_slice(2, 3, &[0.1, 0.2, 0.3, -1.0, 4.0, 2.5]);
        let (y, ld) = t.forward(&x, None).unwrap();
        let (back, ld_inv) = t.inverse(&y, None).unwrap();
        assert!(max_abs_diff(&x, &back) < 1e-12);
        assert_relative_eq!(ld[0], -0.9, epsilon = 1e-12);
        assert_relative_eq!(ld[1] + ld_inv[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(ld[0], fd_log_abs_det(&t, &[0.1, 0.2, 0.3], None), epsilon = 1e-6);
    }

    #[test]
    fn test_data_dependent_init_standardizes() {
        let mut t = ElementwiseAffine::new(2);
        assert!(!t.is_initialized());
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 10.0, 3.0, 20.0, 5.0, 30.0, 7.0, 40.0]);
        t.initialize(&x).unwrap();
        let (y, _) = t.forward(&x, None).unwrap();
        for col in y.column_iter() {
            let mean = col.sum() / 4.0;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 4.0;
            assert_relative_eq!(mean, 0.0, epsilon = 1e-9);
            assert_relative_eq!(var, 1.0, epsilon = 1e-5);
        }

        // Second call keeps the first batch statistics.
        let before = t.bias().clone();
        t.initialize(&(x * 3.0)).unwrap();
        assert_eq!(t.bias(), &before);
    }

    #[test]
    fn test_rejects_mismatched_parameters() {
        assert!(
            ElementwiseAffine::from_parameters(DVector::zeros(2), DVector::zeros(3)).is_err()
        );
        assert!(ElementwiseAffine::new(3).forward(&DMatrix::zeros(1, 2), None).is_err());
        assert_eq!(ElementwiseAffine::new(3).parameter_count().trainable, 6);
    }
}
