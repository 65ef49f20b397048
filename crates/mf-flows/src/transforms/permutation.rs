use mf_core::batch::ensure_width;
use mf_core::{Error, Result, Transform};
use nalgebra::{DMatrix, DVector};
use rand::RngCore;
use rand::seq::SliceRandom;

/// Feature permutation: output column `i` is input column `perm[i]`.
///
/// Volume preserving, so the log-determinant is always zero.
#[derive(Debug, Clone)]
pub struct Permutation {
    perm: Vec<usize>,
    inverse_perm: Vec<usize>,
}

impl Permutation {
    /// Permutation from an explicit index list.
    pub fn new(perm: Vec<usize>) -> Result<Self> {
        let n = perm.len();
        let mut inverse_perm = vec![usize::MAX; n];
        for (i, &p) in perm.iter().enumerate() {
            if p >= n || inverse_perm[p] != usize::MAX {
                return Err(Error::Validation(format!(
                    "Permutation: {perm:?} is not a permutation of 0..{n}"
                )));
            }
            inverse_perm[p] = i;
        }
        Ok(Self { perm, inverse_perm })
    }

    /// Reverse the feature order.
    pub fn reverse(features: usize) -> Self {
        let perm: Vec<usize> = (0..features).rev().collect();
        Self { inverse_perm: perm.clone(), perm }
    }

    /// Uniformly random permutation.
    pub fn random(features: usize, rng: &mut dyn RngCore) -> Self {
        let mut perm: Vec<usize> = (0..features).collect();
        perm.shuffle(rng);
        let mut inverse_perm = vec![0; features];
        for (i, &p) in perm.iter().enumerate() {
            inverse_perm[p] = i;
        }
        Self { perm, inverse_perm }
    }

    /// Output-to-input index map.
    pub fn indices(&self) -> &[usize] {
        &self.perm
    }

    fn gather(x: &DMatrix<f64>, idx: &[usize]) -> DMatrix<f64> {
        DMatrix::from_fn(x.nrows(), idx.len(), |i, j| x[(i, idx[j])])
    }
}

impl Transform for Permutation {
    fn name(&self) -> &str {
        "permutation"
    }

    fn features(&self) -> Option<usize> {
        Some(self.perm.len())
    }

    fn forward(
        &self,
        inputs: &DMatrix<f64>,
        _context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        ensure_width(inputs, self.perm.len(), "Permutation::forward")?;
        Ok((Self::gather(inputs, &self.perm), DVector::zeros(inputs.nrows())))
    }

    fn inverse(
        &self,
        outputs: &DMatrix<f64>,
        _context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        ensure_width(outputs, self.perm.len(), "Permutation::inverse")?;
        Ok((Self::gather(outputs, &self.inverse_perm), DVector::zeros(outputs.nrows())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_explicit_permutation() {
        let t = Permutation::new(vec![2, 0, 1]).unwrap();
        let x = DMatrix::from_row_slice(1, 3, &[10.0, 20.0, 30.0]);
        let (y, ld) = t.forward(&x, None).unwrap();
        assert_eq!(y, DMatrix::from_row_slice(1, 3, &[30.0, 10.0, 20.0]));
        assert_eq!(ld[0], 0.0);
        let (back, _) = t.inverse(&y, None).unwrap();
        assert_eq!(back, x);
    }

    #[test]
    fn test_invalid_permutation_rejected() {
        assert!(Permutation::new(vec![0, 0, 1]).is_err());
        assert!(Permutation::new(vec![0, 3]).is_err());
    }

    #[test]
    fn test_reverse_and_random_are_invertible() {
        let x = DMatrix::from_fn(3, 6, |i, j| (i * 6 + j) as f64);
        let mut rng = StdRng::seed_from_u64(11);
        for t in [Permutation::reverse(6), Permutation::random(6, &mut rng)] {
            let (y, _) = t.forward(&x, None).unwrap();
            let (back, _) = t.inverse(&y, None).unwrap();
            assert_eq!(back, x);
        }
        assert_eq!(Permutation::reverse(3).indices(), &[2, 1, 0]);
    }
}
