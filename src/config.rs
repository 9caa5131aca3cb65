//! Run parameters for marker extraction and region selection.
//!
//! Every struct has a `Default` matching the values the hooks are normally run
//! with, and a `validate` that rejects nonsensical values before any trace is
//! touched. With the `serde` feature a whole [`AnalysisConfig`] can be read from JSON;
//! missing fields fall back to their defaults.

use crate::error::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters of the marker engine
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MarkerConfig {
    /// How many regions before the start region the warmup window spans
    pub num_warmup_regions: u32,
    /// Fraction of `region_length` a block's count stamp must reach to be a stable marker
    pub grace_percentage: f64,
    /// Planned instruction count of each region
    pub region_length: u64,
}

impl MarkerConfig {
    /// Count stamp a block must reach to count as inside the grace period
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.region_length as f64 * self.grace_percentage
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&self.grace_percentage) {
            return Err(Error::InvalidRequest(format!(
                "grace percentage must be within [0, 1], got {}",
                self.grace_percentage
            )));
        }
        if self.region_length == 0 {
            return Err(Error::InvalidRequest(String::from(
                "region length must be positive",
            )));
        }
        Ok(())
    }
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            num_warmup_regions: 1,
            grace_percentage: 0.9,
            region_length: 100_000_000,
        }
    }
}

/// How candidate cluster counts are scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Criterion {
    /// Highest silhouette score wins; needs at least two clusters
    #[default]
    Silhouette,
    /// Lowest Bayesian information criterion wins
    Bic,
}

/// Parameters of the selection engine
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SelectionConfig {
    pub min_clusters: usize,
    pub max_clusters: usize,
    pub criterion: Criterion,
    /// Project profiles onto this many principal components first
    pub reduced_dimensions: Option<usize>,
    /// Seed for every stochastic step
    pub seed: u64,
    /// Return the matrix the clustering actually ran on
    pub keep_transformed: bool,
}

impl SelectionConfig {
    /// Reject requests that cannot be satisfied by `regions` regions
    pub fn validate(&self, regions: usize) -> Result<(), Error> {
        if self.min_clusters == 0 {
            return Err(Error::InvalidRequest(String::from(
                "cluster count must be at least 1",
            )));
        }
        if self.min_clusters > self.max_clusters {
            return Err(Error::InvalidRequest(format!(
                "empty cluster range {}..={}",
                self.min_clusters, self.max_clusters
            )));
        }
        if self.max_clusters > regions {
            return Err(Error::InvalidRequest(format!(
                "{} clusters requested but only {regions} regions available",
                self.max_clusters
            )));
        }
        if self.reduced_dimensions == Some(0) {
            return Err(Error::InvalidRequest(String::from(
                "cannot reduce to zero dimensions",
            )));
        }
        Ok(())
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_clusters: 2,
            max_clusters: 10,
            criterion: Criterion::default(),
            reduced_dimensions: None,
            seed: 627,
            keep_transformed: false,
        }
    }
}

/// Everything one analysis run needs
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AnalysisConfig {
    pub markers: MarkerConfig,
    pub selection: SelectionConfig,
}

#[cfg(feature = "serde")]
impl AnalysisConfig {
    /// Read a config from JSON; absent fields keep their defaults
    pub fn from_json(input: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(input)
            .map_err(|e| Error::ParseError(format!("invalid config: {e}")))?;
        config.markers.validate()?;
        Ok(config)
    }
}
