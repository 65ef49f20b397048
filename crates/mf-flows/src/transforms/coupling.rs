//! # Affine Coupling Layer
//!
//! RealNVP-style coupling: the input is split by a mask into an identity part
//! and a transformed part. A conditioner network reads the identity part (and
//! the context, if the layer is conditional) and produces a scale and shift for
//! the transformed part:
//!
//! ```text
//! y_id = x_id
//! y_tr = x_tr * scale + shift,   scale = sigmoid(raw + 2) + 1e-3
//! ```
//!
//! The Jacobian is triangular, so `log|det J| = sum(log scale)`.

use mf_core::batch::{context_row, ensure_context, ensure_width};
use mf_core::{Error, ParameterCount, Result, Transform};
use mf_prob::math::sigmoid;
use nalgebra::{DMatrix, DVector};
use rand::RngCore;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

const SCALE_OFFSET: f64 = 2.0;
const MIN_SCALE: f64 = 1e-3;

/// Which coordinates pass through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskKind {
    /// Even indices are passed through.
    Even,
    /// Odd indices are passed through.
    Odd,
}

impl MaskKind {
    fn passes(self, i: usize) -> bool {
        match self {
            MaskKind::Even => i % 2 == 0,
            MaskKind::Odd => i % 2 == 1,
        }
    }

    /// The complementary mask.
    pub fn flipped(self) -> Self {
        match self {
            MaskKind::Even => MaskKind::Odd,
            MaskKind::Odd => MaskKind::Even,
        }
    }
}

/// Fully connected ReLU network used as the coupling conditioner.
#[derive(Debug, Clone)]
struct Mlp {
    /// `(out x in)` weight per layer.
    weights: Vec<DMatrix<f64>>,
    biases: Vec<DVector<f64>>,
}

impl Mlp {
    fn new(
        input_dim: usize,
        hidden_dim: usize,
        output_dim: usize,
        num_hidden: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Self> {
        let mut dims = vec![input_dim];
        dims.extend(std::iter::repeat_n(hidden_dim, num_hidden));
        dims.push(output_dim);

        let mut weights = Vec::with_capacity(dims.len() - 1);
        let mut biases = Vec::with_capacity(dims.len() - 1);
        for pair in dims.windows(2) {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let std = 1.0 / (fan_in.max(1) as f64).sqrt();
            let normal = Normal::new(0.0, std)
                .map_err(|e| Error::Validation(format!("conditioner init: {e}")))?;
            weights.push(DMatrix::from_fn(fan_out, fan_in, |_, _| normal.sample(&mut *rng)));
            biases.push(DVector::zeros(fan_out));
        }
        Ok(Self { weights, biases })
    }

    /// Row-batched forward pass.
    fn forward(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let last = self.weights.len() - 1;
        let mut h = x.clone();
        for (k, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            h = &h * w.transpose();
            for mut row in h.row_iter_mut() {
                row += b.transpose();
            }
            if k < last {
                h.apply(|v| *v = v.max(0.0));
            }
        }
        h
    }

    fn n_params(&self) -> usize {
        self.weights.iter().map(|w| w.len()).sum::<usize>()
            + self.biases.iter().map(|b| b.len()).sum::<usize>()
    }
}

/// Affine coupling layer, optionally conditioned on a context vector.
#[derive(Debug, Clone)]
pub struct AffineCoupling {
    features: usize,
    context_features: usize,
    mask: MaskKind,
    identity_idx: Vec<usize>,
    transform_idx: Vec<usize>,
    conditioner: Mlp,
}

impl AffineCoupling {
    /// Build a coupling layer with a randomly initialized conditioner.
    ///
    /// `hidden` is the conditioner width, `layers` its number of hidden layers,
    /// and `context_features` the width of the context (0 for unconditional).
    pub fn new(
        features: usize,
        hidden: usize,
        layers: usize,
        mask: MaskKind,
        context_features: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Self> {
        if features < 2 {
            return Err(Error::Validation(format!(
                "AffineCoupling: needs at least 2 features, got {features}"
            )));
        }
        if hidden == 0 {
            return Err(Error::Validation("AffineCoupling: hidden width must be > 0".into()));
        }
        if layers == 0 {
            return Err(Error::Validation(
                "AffineCoupling: conditioner needs at least one hidden layer".into(),
            ));
        }
        let (identity_idx, transform_idx): (Vec<usize>, Vec<usize>) =
            (0..features).partition(|&i| mask.passes(i));
        let conditioner = Mlp::new(
            identity_idx.len() + context_features,
            hidden,
            2 * transform_idx.len(),
            layers,
            rng,
        )?;
        Ok(Self { features, context_features, mask, identity_idx, transform_idx, conditioner })
    }

    /// Mask of coordinates passed through unchanged.
    pub fn mask(&self) -> MaskKind {
        self.mask
    }

    /// Width of the context this layer reads (0 if unconditional).
    pub fn context_features(&self) -> usize {
        self.context_features
    }

    /// Conditioner output split into `(scale, shift)`, each `n x |transform_idx|`.
    fn scale_and_shift(
        &self,
        x: &DMatrix<f64>,
        context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
        let n = x.nrows();
        let n_id = self.identity_idx.len();
        let net_input = match (self.context_features, context) {
            (0, _) => DMatrix::from_fn(n, n_id, |i, j| x[(i, self.identity_idx[j])]),
            (c, Some(ctx)) => {
                ensure_context(ctx, n, c, "AffineCoupling context")?;
                DMatrix::from_fn(n, n_id + c, |i, j| {
                    if j < n_id {
                        x[(i, self.identity_idx[j])]
                    } else {
                        ctx[(context_row(ctx, i), j - n_id)]
                    }
                })
            }
            (c, None) => {
                return Err(Error::Shape(format!(
                    "AffineCoupling: layer is conditioned on {c} context features \
                     but no context was given"
                )));
            }
        };
        let params = self.conditioner.forward(&net_input);
        let n_tr = self.transform_idx.len();
        let scale =
            DMatrix::from_fn(n, n_tr, |i, j| sigmoid(params[(i, j)] + SCALE_OFFSET) + MIN_SCALE);
        let shift = params.columns(n_tr, n_tr).into_owned();
        Ok((scale, shift))
    }
}

impl Transform for AffineCoupling {
    fn name(&self) -> &str {
        "affine_coupling"
    }

    fn features(&self) -> Option<usize> {
        Some(self.features)
    }

    fn forward(
        &self,
        inputs: &DMatrix<f64>,
        context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        ensure_width(inputs, self.features, "AffineCoupling::forward")?;
        let (scale, shift) = self.scale_and_shift(inputs, context)?;
        let mut outputs = inputs.clone();
        for (j, &col) in self.transform_idx.iter().enumerate() {
            for i in 0..inputs.nrows() {
                outputs[(i, col)] = inputs[(i, col)] * scale[(i, j)] + shift[(i, j)];
            }
        }
        let log_det = DVector::from_iterator(
            inputs.nrows(),
            scale.row_iter().map(|row| row.iter().map(|s| s.ln()).sum::<f64>()),
        );
        Ok((outputs, log_det))
    }

    fn inverse(
        &self,
        outputs: &DMatrix<f64>,
        context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        ensure_width(outputs, self.features, "AffineCoupling::inverse")?;
        // The identity part is untouched, so the conditioner sees the same input.
        let (scale, shift) = self.scale_and_shift(outputs, context)?;
        let mut inputs = outputs.clone();
        for (j, &col) in self.transform_idx.iter().enumerate() {
            for i in 0..outputs.nrows() {
                inputs[(i, col)] = (outputs[(i, col)] - shift[(i, j)]) / scale[(i, j)];
            }
        }
        let log_det = DVector::from_iterator(
            outputs.nrows(),
            scale.row_iter().map(|row| -row.iter().map(|s| s.ln()).sum::<f64>()),
        );
        Ok((inputs, log_det))
    }

    fn parameter_count(&self) -> ParameterCount {
        ParameterCount::trainable(self.conditioner.n_params())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::testing::{fd_log_abs_det, max_abs_diff};
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn coupling(context_features: usize) -> AffineCoupling {
        let mut rng = StdRng::seed_from_u64(42);
        AffineCoupling::new(5, 8, 2, MaskKind::Even, context_features, &mut rng).unwrap()
    }

    #[test]
    fn test_identity_half_passes_through() {
        let t = coupling(0);
        let x = DMatrix::from_row_slice(1, 5, &[0.1, -0.2, 0.3, 0.4, -0.5]);
        let (y, _) = t.forward(&x, None).unwrap();
        for i in [0, 2, 4] {
            assert_eq!(y[(0, i)], x[(0, i)]);
        }
    }

    #[test]
    fn test_roundtrip_and_fd_log_det() {
        let t = coupling(0);
        let row = [0.7, -1.1, 0.25, 2.0, -0.4];
        let x = DMatrix::from_row_slice(1, 5, &row);
        let (y, ld) = t.forward(&x, None).unwrap();
        let (back, ld_inv) = t.inverse(&y, None).unwrap();
        assert!(max_abs_diff(&x, &back) < 1e-10);
        assert_relative_eq!(ld[0] + ld_inv[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(ld[0], fd_log_abs_det(&t, &row, None), epsilon = 1e-5);
    }

    #[test]
    fn test_context_changes_output() {
        let t = coupling(2);
        let x = DMatrix::from_row_slice(2, 5, &[0.1, 0.2, 0.3, 0.4, 0.5, 1.0, -1.0, 0.5, 0.0, 2.0]);
        let c1 = DMatrix::from_row_slice(1, 2, &[0.0, 0.0]);
        let c2 = DMatrix::from_row_slice(1, 2, &[3.0, -2.0]);
        let (y1, _) = t.forward(&x, Some(&c1)).unwrap();
        let (y2, _) = t.forward(&x, Some(&c2)).unwrap();
        assert!(max_abs_diff(&y1, &y2) > 1e-6);

        let (back, _) = t.inverse(&y2, Some(&c2)).unwrap();
        assert!(max_abs_diff(&x, &back) < 1e-10);
    }

    #[test]
    fn test_conditional_layer_requires_context() {
        let t = coupling(2);
        let x = DMatrix::<f64>::zeros(3, 5);
        assert!(matches!(t.forward(&x, None), Err(Error::Shape(_))));
        let wrong_rows = DMatrix::<f64>::zeros(2, 2);
        assert!(matches!(t.forward(&x, Some(&wrong_rows)), Err(Error::Shape(_))));
    }

    #[test]
    fn test_unconditional_layer_ignores_context() {
        let t = coupling(0);
        let x = DMatrix::from_row_slice(1, 5, &[0.1, 0.2, 0.3, 0.4, 0.5]);
        let ctx = DMatrix::from_element(1, 9, 4.0);
        assert_eq!(t.forward(&x, None).unwrap().0, t.forward(&x, Some(&ctx)).unwrap().0);
    }

    #[test]
    fn test_parameter_count() {
        // identity part: 3 features, transformed part: 2 -> conditioner 3 -> 8 -> 8 -> 4
        let t = coupling(0);
        assert_eq!(t.parameter_count().total, (3 * 8 + 8) + (8 * 8 + 8) + (8 * 4 + 4));
        let mut rng = StdRng::seed_from_u64(0);
        assert!(AffineCoupling::new(1, 4, 1, MaskKind::Odd, 0, &mut rng).is_err());
    }

    #[test]
    fn test_rejects_empty_conditioner() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            AffineCoupling::new(4, 8, 0, MaskKind::Even, 0, &mut rng),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            AffineCoupling::new(4, 0, 1, MaskKind::Even, 0, &mut rng),
            Err(Error::Validation(_))
        ));
    }
}
