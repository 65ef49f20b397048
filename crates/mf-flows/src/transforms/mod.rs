//! Batched bijective transforms.
//!
//! Every layer maps an `n x features` batch to a batch of the same shape and
//! reports `log|det J|` per sample. Layers compose with [`CompositeTransform`].

mod affine;
mod composite;
mod coupling;
mod identity;
mod linear;
mod permutation;

pub use affine::ElementwiseAffine;
pub use composite::{CompositeTransform, Frozen};
pub use coupling::{AffineCoupling, MaskKind};
pub use identity::IdentityTransform;
pub use linear::InvertibleLinear;
pub use permutation::Permutation;

#[cfg(test)]
pub(crate) mod testing {
    use mf_core::Transform;
    use nalgebra::DMatrix;

    /// `log|det J|` of `t.forward` at a single sample, by central differences.
    pub fn fd_log_abs_det(t: &dyn Transform, x: &[f64], context: Option<&DMatrix<f64>>) -> f64 {
        let d = x.len();
        let h = 1e-6;
        let mut jac = DMatrix::<f64>::zeros(d, d);
        for j in 0..d {
            let mut plus = x.to_vec();
            let mut minus = x.to_vec();
            plus[j] += h;
            minus[j] -= h;
            let (yp, _) = t.forward(&DMatrix::from_row_slice(1, d, &plus), context).unwrap();
            let (ym, _) = t.forward(&DMatrix::from_row_slice(1, d, &minus), context).unwrap();
            for i in 0..d {
                jac[(i, j)] = (yp[(0, i)] - ym[(0, i)]) / (2.0 * h);
            }
        }
        jac.lu().determinant().abs().ln()
    }

    /// Max absolute difference between two batches of equal shape.
    pub fn max_abs_diff(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
        assert_eq!(a.shape(), b.shape());
        (a - b).iter().fold(0.0_f64, |m, v| m.max(v.abs()))
    }
}
