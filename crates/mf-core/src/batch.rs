//! Shape checks for row-major sample batches.
//!
//! A batch is a `DMatrix<f64>` with one row per sample. Context batches either
//! carry one row per sample or a single row that is broadcast to every sample.

use nalgebra::DMatrix;

use crate::{Error, Result};

/// Fail unless `x` has exactly `expected` columns.
pub fn ensure_width(x: &DMatrix<f64>, expected: usize, what: &str) -> Result<()> {
    if x.ncols() != expected {
        return Err(Error::Shape(format!(
            "{what}: expected {expected} features, got {} (batch {}x{})",
            x.ncols(),
            x.nrows(),
            x.ncols()
        )));
    }
    Ok(())
}

/// Fail unless `a` and `b` hold the same number of samples.
pub fn ensure_same_rows(a: &DMatrix<f64>, b: &DMatrix<f64>, what: &str) -> Result<()> {
    if a.nrows() != b.nrows() {
        return Err(Error::Shape(format!(
            "{what}: batch sizes differ ({} vs {})",
            a.nrows(),
            b.nrows()
        )));
    }
    Ok(())
}

/// Validate a context batch for `n` samples with `features` columns.
pub fn ensure_context(context: &DMatrix<f64>, n: usize, features: usize, what: &str) -> Result<()> {
    ensure_width(context, features, what)?;
    if context.nrows() != 1 && context.nrows() != n {
        return Err(Error::Shape(format!(
            "{what}: context has {} rows, expected 1 or {n}",
            context.nrows()
        )));
    }
    Ok(())
}

/// Row of `context` that applies to sample `i` (row 0 when broadcasting).
#[inline]
pub fn context_row(context: &DMatrix<f64>, i: usize) -> usize {
    if context.nrows() == 1 { 0 } else { i }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_width() {
        let x = DMatrix::<f64>::zeros(4, 3);
        assert!(ensure_width(&x, 3, "x").is_ok());
        assert!(matches!(ensure_width(&x, 2, "x"), Err(Error::Shape(_))));
    }

    #[test]
    fn test_context_broadcast_rules() {
        let single = DMatrix::<f64>::zeros(1, 2);
        let full = DMatrix::<f64>::zeros(5, 2);
        let bad = DMatrix::<f64>::zeros(3, 2);
        assert!(ensure_context(&single, 5, 2, "ctx").is_ok());
        assert!(ensure_context(&full, 5, 2, "ctx").is_ok());
        assert!(ensure_context(&bad, 5, 2, "ctx").is_err());
        assert!(ensure_context(&full, 5, 3, "ctx").is_err());
        assert_eq!(context_row(&single, 4), 0);
        assert_eq!(context_row(&full, 4), 4);
    }
}
