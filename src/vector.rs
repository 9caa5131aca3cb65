//! Dense per-block integer vectors and the elementwise arithmetic the marker engine uses.

use crate::block_map::BlockIndex;
use crate::error::Error;
use std::ops::Deref;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A dense per-block integer vector.
///
/// Serves both as a basic block vector (execution counts) and as a count stamp
/// vector (largest instruction count a block was seen at). Signed so that
/// relative vectors can be expressed for arbitrary inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct BlockVector(Vec<i64>);

impl BlockVector {
    #[must_use]
    pub fn zeros(len: usize) -> Self {
        Self(vec![0; len])
    }

    #[must_use]
    pub fn as_slice(&self) -> &[i64] {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<i64> {
        self.0
    }

    pub(crate) fn get_mut(&mut self, index: BlockIndex) -> Option<&mut i64> {
        self.0.get_mut(index)
    }

    fn check_len(&self, other: &Self) -> Result<(), Error> {
        if self.0.len() == other.0.len() {
            Ok(())
        } else {
            Err(Error::LengthMismatch {
                left: self.0.len(),
                right: other.0.len(),
            })
        }
    }

    /// Elementwise `self + other`
    pub fn combine(&self, other: &Self) -> Result<Self, Error> {
        self.check_len(other)?;
        Ok(Self(
            self.0.iter().zip(&other.0).map(|(a, b)| a + b).collect(),
        ))
    }

    /// In-place `self += other`
    pub fn accumulate(&mut self, other: &Self) -> Result<(), Error> {
        self.check_len(other)?;
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a += b;
        }
        Ok(())
    }

    /// Elementwise `self - other`: the work done after `other` up to `self`
    /// when both are cumulative vectors
    pub fn relative(&self, other: &Self) -> Result<Self, Error> {
        self.check_len(other)?;
        Ok(Self(
            self.0.iter().zip(&other.0).map(|(a, b)| a - b).collect(),
        ))
    }

    /// Index of the largest value, first one on ties
    #[must_use]
    pub fn argmax(&self) -> Option<BlockIndex> {
        let mut best: Option<(BlockIndex, i64)> = None;
        for (index, &value) in self.0.iter().enumerate() {
            if best.is_none_or(|(_, max)| value > max) {
                best = Some((index, value));
            }
        }
        best.map(|(index, _)| index)
    }

    /// Sum of every element
    #[must_use]
    pub fn total(&self) -> i64 {
        self.0.iter().sum()
    }
}

impl Deref for BlockVector {
    type Target = [i64];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<i64>> for BlockVector {
    fn from(values: Vec<i64>) -> Self {
        Self(values)
    }
}

impl FromIterator<i64> for BlockVector {
    fn from_iter<T: IntoIterator<Item = i64>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
