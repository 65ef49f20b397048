use mf_core::{Error, ParameterCount, Result, Transform};
use nalgebra::{DMatrix, DVector};

/// Sequential chain of transforms; log-determinants add up.
///
/// `forward` applies the layers in order, `inverse` in reverse order. Every
/// layer receives the same context.
#[derive(Default)]
pub struct CompositeTransform {
    layers: Vec<Box<dyn Transform>>,
}

impl CompositeTransform {
    /// Empty chain (behaves as the identity).
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain from existing layers, checking adjacent widths agree.
    pub fn from_layers(layers: Vec<Box<dyn Transform>>) -> Result<Self> {
        let mut chain = Self::new();
        for layer in layers {
            chain.push(layer)?;
        }
        Ok(chain)
    }

    /// Append a layer.
    pub fn push(&mut self, layer: Box<dyn Transform>) -> Result<()> {
        if let (Some(have), Some(next)) = (self.features(), layer.features()) {
            if have != next {
                return Err(Error::Validation(format!(
                    "CompositeTransform: layer '{}' has {next} features, chain has {have}",
                    layer.name()
                )));
            }
        }
        self.layers.push(layer);
        Ok(())
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// `true` if the chain has no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layer names in application order.
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name()).collect()
    }
}

impl Transform for CompositeTransform {
    fn name(&self) -> &str {
        "composite"
    }

    fn features(&self) -> Option<usize> {
        self.layers.iter().find_map(|l| l.features())
    }

    fn forward(
        &self,
        inputs: &DMatrix<f64>,
        context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        let mut x = inputs.clone();
        let mut total = DVector::zeros(inputs.nrows());
        for layer in &self.layers {
            let (y, log_det) = layer.forward(&x, context)?;
            total += log_det;
            x = y;
        }
        Ok((x, total))
    }

    fn inverse(
        &self,
        outputs: &DMatrix<f64>,
        context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        let mut y = outputs.clone();
        let mut total = DVector::zeros(outputs.nrows());
        for layer in self.layers.iter().rev() {
            let (x, log_det) = layer.inverse(&y, context)?;
            total += log_det;
            y = x;
        }
        Ok((y, total))
    }

    fn parameter_count(&self) -> ParameterCount {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }
}

/// Wraps a transform and marks all of its parameters as non-trainable.
pub struct Frozen<T>(pub T);

impl<T: Transform> Transform for Frozen<T> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn features(&self) -> Option<usize> {
        self.0.features()
    }

    fn forward(
        &self,
        inputs: &DMatrix<f64>,
        context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        self.0.forward(inputs, context)
    }

    fn inverse(
        &self,
        outputs: &DMatrix<f64>,
        context: Option<&DMatrix<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        self.0.inverse(outputs, context)
    }

    fn parameter_count(&self) -> ParameterCount {
        self.0.parameter_count().frozen()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::testing::{fd_log_abs_det, max_abs_diff};
    use crate::transforms::{
        AffineCoupling, ElementwiseAffine, IdentityTransform, InvertibleLinear, MaskKind,
        Permutation,
    };
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn chain() -> CompositeTransform {
        let mut rng = StdRng::seed_from_u64(5);
        CompositeTransform::from_layers(vec![
            Box::new(
                ElementwiseAffine::from_parameters(
                    DVector::from_vec(vec![0.1, -0.2, 0.3, 0.0]),
                    DVector::from_vec(vec![0.5, 0.0, -0.5, 1.0]),
                )
                .unwrap(),
            ),
            Box::new(AffineCoupling::new(4, 6, 1, MaskKind::Even, 0, &mut rng).unwrap()),
            Box::new(Permutation::reverse(4)),
            Box::new(InvertibleLinear::random_orthogonal(4, &mut rng).unwrap()),
            Box::new(AffineCoupling::new(4, 6, 1, MaskKind::Odd, 0, &mut rng).unwrap()),
            Box::new(IdentityTransform),
        ])
        .unwrap()
    }

    #[test]
    fn test_log_dets_add_up() {
        let t = chain();
        assert_eq!(t.len(), 6);
        let row = [0.2, -0.7, 1.3, 0.05];
        let x = DMatrix::from_row_slice(1, 4, &row);
        let (y, ld) = t.forward(&x, None).unwrap();
        assert_relative_eq!(ld[0], fd_log_abs_det(&t, &row, None), epsilon = 1e-5);

        let (back, ld_inv) = t.inverse(&y, None).unwrap();
        assert!(max_abs_diff(&x, &back) < 1e-10);
        assert_relative_eq!(ld[0] + ld_inv[0], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let mut t = CompositeTransform::new();
        assert!(t.is_empty());
        assert_eq!(t.features(), None);
        t.push(Box::new(IdentityTransform)).unwrap();
        t.push(Box::new(Permutation::reverse(3))).unwrap();
        assert!(t.push(Box::new(Permutation::reverse(4))).is_err());
        assert_eq!(t.features(), Some(3));
        assert_eq!(t.layer_names(), vec!["identity", "permutation"]);
    }

    #[test]
    fn test_frozen_reports_no_trainable_parameters() {
        let t = chain();
        let count = t.parameter_count();
        assert!(count.trainable > 0);
        let frozen = Frozen(t);
        assert_eq!(frozen.parameter_count().total, count.total);
        assert_eq!(frozen.parameter_count().trainable, 0);
    }
}
