use mf_core::{Result, Transform};
use nalgebra::{DMatrix, DVector};

/// `y = x`, zero log-determinant, any width.
///
/// Used as the default inner transform of a PIE model.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl Transform for IdentityTransform {
    fn name(&self) -> &str {
        "identity"
    }

    fn features(&self) -> Option<usize> {
        None
    }

    fn forward(
        &self,
        inputs: &DMatrix<f64>,
        _context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        Ok((inputs.clone(), DVector::zeros(inputs.nrows())))
    }

    fn inverse(
        &self,
        outputs: &DMatrix<f64>,
        _context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        Ok((outputs.clone(), DVector::zeros(outputs.nrows())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_noop() {
        let x = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, -1.0, 0.0, 4.5]);
        let ctx = DMatrix::from_element(1, 7, 3.0);
        let (y, ld) = IdentityTransform.forward(&x, Some(&ctx)).unwrap();
        assert_eq!(y, x);
        assert_eq!(ld, DVector::zeros(2));
        let (back, ld) = IdentityTransform.inverse(&y, None).unwrap();
        assert_eq!(back, x);
        assert_eq!(ld.len(), 2);
        assert_eq!(IdentityTransform.parameter_count().total, 0);
    }
}
