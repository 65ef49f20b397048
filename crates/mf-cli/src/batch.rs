//! JSON batch files: `{"x": [[...], ...], "context": [[...], ...]}`.

use anyhow::Result;
use nalgebra::{DMatrix, DVector};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
struct BatchJson {
    x: Vec<Vec<f64>>,
    #[serde(default)]
    context: Option<Vec<Vec<f64>>>,
}

/// Samples (one per row) and optional context read from a batch file.
pub struct Batch {
    pub x: DMatrix<f64>,
    pub context: Option<DMatrix<f64>>,
}

pub fn load_batch(path: &Path) -> Result<Batch> {
    tracing::info!(path = %path.display(), "loading batch");
    let bytes = std::fs::read(path)?;
    let input: BatchJson = serde_json::from_slice(&bytes)?;
    let x = dmatrix_from_nested("x", input.x)?;
    let context = input.context.map(|c| dmatrix_from_nested("context", c)).transpose()?;
    tracing::info!(
        rows = x.nrows(),
        cols = x.ncols(),
        conditional = context.is_some(),
        "batch loaded"
    );
    Ok(Batch { x, context })
}

/// Parse an inline context row such as `"0.5,1.0"`.
pub fn parse_context_row(s: &str) -> Result<DMatrix<f64>> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()?;
    dmatrix_from_nested("context", vec![values])
}

pub fn dmatrix_from_nested(name: &str, rows: Vec<Vec<f64>>) -> Result<DMatrix<f64>> {
    if rows.is_empty() {
        anyhow::bail!("{name} must be non-empty");
    }
    let nrows = rows.len();
    let ncols = rows[0].len();
    if ncols == 0 {
        anyhow::bail!("{name} rows must be non-empty");
    }
    for (i, r) in rows.iter().enumerate() {
        if r.len() != ncols {
            anyhow::bail!(
                "{name} must be rectangular: row {i} has len {}, expected {}",
                r.len(),
                ncols
            );
        }
        if r.iter().any(|v| !v.is_finite()) {
            anyhow::bail!("{name} must contain only finite values");
        }
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Ok(DMatrix::from_row_slice(nrows, ncols, &flat))
}

pub fn dmatrix_to_nested(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter().map(|row| row.iter().copied().collect()).collect()
}

pub fn dvector_to_vec(v: &DVector<f64>) -> Vec<f64> {
    v.iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_roundtrip() {
        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let m = dmatrix_from_nested("x", rows.clone()).unwrap();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m[(1, 0)], 4.0);
        assert_eq!(dmatrix_to_nested(&m), rows);
    }

    #[test]
    fn test_rejects_ragged_and_non_finite() {
        assert!(dmatrix_from_nested("x", vec![]).is_err());
        assert!(dmatrix_from_nested("x", vec![vec![1.0], vec![1.0, 2.0]]).is_err());
        assert!(dmatrix_from_nested("x", vec![vec![f64::NAN]]).is_err());
    }

    #[test]
    fn test_parse_context_row() {
        let c = parse_context_row("0.5, -1").unwrap();
        assert_eq!(c.shape(), (1, 2));
        assert_eq!(c[(0, 1)], -1.0);
        assert!(parse_context_row("a,b").is_err());
    }
}
