//! Common data types for manifold-flow

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Logical shape of a single sample, e.g. `[8]` for vectors or `[3, 16, 16]` for images.
///
/// Batches are always stored flattened (one row per sample); the shape is kept
/// so callers can reshape outputs back into their native layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a shape from its dimensions.
    pub fn new(dims: Vec<usize>) -> Self {
        Self(dims)
    }

    /// Dimensions of the shape.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of scalar entries in one sample (product of all dimensions).
    pub fn total(&self) -> usize {
        self.0.iter().product()
    }

    /// `true` when the shape has no axes or any axis has length zero.
    pub fn is_degenerate(&self) -> bool {
        self.0.is_empty() || self.0.contains(&0)
    }
}

impl From<usize> for Shape {
    fn from(n: usize) -> Self {
        Self(vec![n])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

/// Number of scalar parameters held by a model component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterCount {
    /// All parameters.
    pub total: usize,
    /// Parameters an optimizer would update.
    pub trainable: usize,
}

impl ParameterCount {
    /// Count where every parameter is trainable.
    pub fn trainable(n: usize) -> Self {
        Self { total: n, trainable: n }
    }

    /// Same total, nothing trainable.
    pub fn frozen(self) -> Self {
        Self { total: self.total, trainable: 0 }
    }

    /// Estimated storage in bytes assuming `f32` parameters.
    pub fn size_bytes_f32(&self) -> usize {
        self.total * std::mem::size_of::<f32>()
    }
}

impl Add for ParameterCount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self { total: self.total + rhs.total, trainable: self.trainable + rhs.trainable }
    }
}

impl AddAssign for ParameterCount {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for ParameterCount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}
