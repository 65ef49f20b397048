//! Split between manifold and orthogonal coordinates.

use mf_core::batch::{ensure_same_rows, ensure_width};
use mf_core::{Error, Result};
use nalgebra::DMatrix;

/// Splits an `input_dim` batch into its first `output_dim` coordinates (the
/// manifold part) and the remaining `input_dim - output_dim` (the orthogonal
/// part).
///
/// The inverse concatenates the two parts again. When no orthogonal part is
/// supplied it is filled with zeros, i.e. the point is placed on the manifold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionSplit {
    input_dim: usize,
    output_dim: usize,
}

impl ProjectionSplit {
    /// Projection from `input_dim` to `output_dim` coordinates.
    pub fn new(input_dim: usize, output_dim: usize) -> Result<Self> {
        if output_dim >= input_dim {
            return Err(Error::Dimension(format!(
                "projection output dim {output_dim} must be smaller than input dim {input_dim}"
            )));
        }
        Ok(Self { input_dim, output_dim })
    }

    /// Ambient width.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Manifold width.
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Orthogonal width.
    pub fn orthogonal_dim(&self) -> usize {
        self.input_dim - self.output_dim
    }

    /// `h -> (h_manifold, h_orthogonal)`.
    pub fn forward(&self, h: &DMatrix<f64>) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
        ensure_width(h, self.input_dim, "ProjectionSplit::forward")?;
        let manifold = h.columns(0, self.output_dim).into_owned();
        let orthogonal = h.columns(self.output_dim, self.orthogonal_dim()).into_owned();
        Ok((manifold, orthogonal))
    }

    /// `(h_manifold, h_orthogonal?) -> h`; a missing orthogonal part is zero-filled.
    pub fn inverse(
        &self,
        h_manifold: &DMatrix<f64>,
        orthogonal_inputs: Option<&DMatrix<f64>>,
    ) -> Result<DMatrix<f64>> {
        ensure_width(h_manifold, self.output_dim, "ProjectionSplit::inverse manifold")?;
        let mut h = DMatrix::zeros(h_manifold.nrows(), self.input_dim);
        h.columns_mut(0, self.output_dim).copy_from(h_manifold);
        if let Some(orth) = orthogonal_inputs {
            ensure_width(orth, self.orthogonal_dim(), "ProjectionSplit::inverse orthogonal")?;
            ensure_same_rows(h_manifold, orth, "ProjectionSplit::inverse")?;
            h.columns_mut(self.output_dim, self.orthogonal_dim()).copy_from(orth);
        }
        Ok(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_and_merge() {
        let p = ProjectionSplit::new(5, 2).unwrap();
        let h = DMatrix::from_fn(3, 5, |i, j| (10 * i + j) as f64);
        let (m, o) = p.forward(&h).unwrap();
        assert_eq!(m.shape(), (3, 2));
        assert_eq!(o.shape(), (3, 3));
        assert_eq!(o[(1, 0)], 12.0);
        assert_eq!(p.inverse(&m, Some(&o)).unwrap(), h);
    }

    #[test]
    fn test_missing_orthogonal_is_zero_filled() {
        let p = ProjectionSplit::new(4, 1).unwrap();
        let m = DMatrix::from_row_slice(2, 1, &[1.5, -2.0]);
        let h = p.inverse(&m, None).unwrap();
        assert_eq!(h, DMatrix::from_row_slice(2, 4, &[1.5, 0.0, 0.0, 0.0, -2.0, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_shape_errors() {
        assert!(matches!(ProjectionSplit::new(3, 3), Err(Error::Dimension(_))));
        let p = ProjectionSplit::new(4, 2).unwrap();
        assert!(p.forward(&DMatrix::zeros(1, 3)).is_err());
        let m = DMatrix::zeros(2, 2);
        assert!(p.inverse(&m, Some(&DMatrix::zeros(3, 2))).is_err());
        assert!(p.inverse(&m, Some(&DMatrix::zeros(2, 1))).is_err());
    }
}
