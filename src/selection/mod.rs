//! Clustering regions by behaviour and picking one representative per cluster.
//!
//! Each region's basic block vector is weighted by the static instruction count
//! of every block and scaled to sum to one, giving the fraction of the region's
//! instructions spent in each block. Regions with similar profiles execute the
//! same phase of the program; simulating the region nearest each cluster center,
//! weighted by cluster size, approximates simulating all of them.
//!
//! The numerical work sits behind the [`Clusterer`] and [`Reducer`] traits.
//! [`LinfaBackend`] implements both.

mod backend;
mod bic;
mod random;

pub use backend::LinfaBackend;
pub use bic::bic_score;
pub use random::random_regions;

use crate::aggregate::RegionAggregator;
use crate::block_map::BlockMap;
use crate::config::{Criterion, SelectionConfig};
use crate::error::Error;
use crate::static_info::StaticInfo;
use crate::trace::RegionId;
use crate::tracing;
use crate::vector::BlockVector;

use ndarray::{Array2, ArrayView1};
use std::borrow::Cow;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Outcome of fitting `k` clusters
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterFit {
    /// Cluster of every row, in `0..k`
    pub labels: Vec<usize>,
    /// One row per cluster
    pub centers: Array2<f64>,
    /// Sum of squared distances from each row to its center
    pub inertia: f64,
    /// Iterations until convergence, when the backend reports it
    pub iterations: Option<u64>,
}

pub trait Clusterer {
    /// Partition the rows of `data` into `k` clusters, drawing any randomness from `seed`
    fn fit(&self, data: &Array2<f64>, k: usize, seed: u64) -> Result<ClusterFit, Error>;

    /// Mean silhouette coefficient of a labelling; needs at least two clusters
    fn silhouette_score(&self, data: &Array2<f64>, labels: &[usize]) -> Result<f64, Error>;
}

pub trait Reducer {
    /// Project the rows of `data` onto `dimensions` components fitted on those same rows
    fn reduce(&self, data: &Array2<f64>, dimensions: usize) -> Result<Array2<f64>, Error>;
}

pub(crate) fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Basic block vector of every region, in region order
pub fn region_profiles(aggregator: &RegionAggregator) -> Result<Vec<BlockVector>, Error> {
    (0..aggregator.total_regions())
        .map(|region| {
            let region = RegionId::try_from(region)
                .map_err(|e| Error::InvalidRequest(format!("region {region}: {e}")))?;
            aggregator.region_bbv(region)
        })
        .collect()
}

/// Static instruction count of every block, in block index order
pub fn instruction_weights(blocks: &BlockMap, info: &StaticInfo) -> Result<Vec<f64>, Error> {
    blocks
        .iter()
        .map(|(id, _)| info.lookup(id).map(|block| block.inst_count as f64))
        .collect()
}

/// Every block weighs the same; profiles become plain execution frequencies
#[must_use]
pub fn uniform_weights(blocks: &BlockMap) -> Vec<f64> {
    vec![1.0; blocks.len()]
}

/// One row per region: `profile * weights`, scaled to sum to one
pub fn normalize(profiles: &[BlockVector], weights: &[f64]) -> Result<Array2<f64>, Error> {
    let mut matrix = Array2::zeros((profiles.len(), weights.len()));

    for (region, (profile, mut row)) in profiles.iter().zip(matrix.rows_mut()).enumerate() {
        if profile.len() != weights.len() {
            return Err(Error::LengthMismatch {
                left: profile.len(),
                right: weights.len(),
            });
        }
        for ((slot, &count), &weight) in row.iter_mut().zip(profile.iter()).zip(weights) {
            *slot = count as f64 * weight;
        }
        let total = row.sum();
        if total == 0.0 {
            return Err(Error::NormalizationError(format!(
                "region {region} has no weighted instructions"
            )));
        }
        row /= total;
    }

    Ok(matrix)
}

/// One cluster of regions and the region standing in for it
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Cluster {
    /// Member nearest the center; `None` when no region landed in the cluster
    pub representative: Option<RegionId>,
    pub members: Vec<RegionId>,
    /// Share of the execution the cluster stands for, as a member count
    pub weight: usize,
}

/// A chosen clustering of the regions
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ClusterSelection {
    pub num_clusters: usize,
    pub inertia: f64,
    pub iterations: Option<u64>,
    /// Score of every candidate cluster count that was tried
    pub scores: Vec<(usize, f64)>,
    /// Cluster of every region
    pub labels: Vec<usize>,
    pub clusters: Vec<Cluster>,
    /// Clusters that ended up with no members
    pub empty_clusters: Vec<usize>,
    /// The matrix clustering ran on, one row per region
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub transformed: Option<Vec<Vec<f64>>>,
}

impl ClusterSelection {
    pub fn representatives(&self) -> impl Iterator<Item = Option<RegionId>> + '_ {
        self.clusters.iter().map(|c| c.representative)
    }

    pub fn weights(&self) -> impl Iterator<Item = usize> + '_ {
        self.clusters.iter().map(|c| c.weight)
    }

    /// Representatives of every non-empty cluster, in cluster order
    #[must_use]
    pub fn simulation_points(&self) -> Vec<(RegionId, usize)> {
        self.clusters
            .iter()
            .filter_map(|c| c.representative.map(|r| (r, c.weight)))
            .collect()
    }
}

/// Searches cluster counts and derives representatives and weights
#[derive(Debug, Clone)]
pub struct SelectionEngine<B> {
    backend: B,
    config: SelectionConfig,
}

impl<B: Clusterer + Reducer> SelectionEngine<B> {
    #[must_use]
    pub const fn new(backend: B, config: SelectionConfig) -> Self {
        Self { backend, config }
    }

    #[must_use]
    pub const fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Cluster the rows of `profiles`, row `i` being region `i`
    pub fn select(&self, profiles: &Array2<f64>) -> Result<ClusterSelection, Error> {
        let _span = tracing::span!(tracing::Level::DEBUG, "selection::select").entered();
        let (regions, dimensions) = profiles.dim();
        self.config.validate(regions)?;
        let region_ids = (0..regions)
            .map(RegionId::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidRequest(format!("too many regions: {e}")))?;

        let data = match self.config.reduced_dimensions {
            Some(target) if target < dimensions && target < regions => {
                Cow::Owned(self.backend.reduce(profiles, target)?)
            }
            _ => Cow::Borrowed(profiles),
        };

        let (k, scores) = self.search(&data)?;
        let fit = self.backend.fit(&data, k, self.config.seed)?;
        if fit.labels.len() != regions {
            return Err(Error::LengthMismatch {
                left: fit.labels.len(),
                right: regions,
            });
        }

        let mut clusters = Vec::with_capacity(k);
        let mut empty_clusters = vec![];
        for (cluster, center) in fit.centers.rows().into_iter().enumerate() {
            let mut representative: Option<(RegionId, f64)> = None;
            let mut members = vec![];
            for ((&label, &region), row) in fit.labels.iter().zip(&region_ids).zip(data.rows()) {
                if label != cluster {
                    continue;
                }
                members.push(region);
                let distance = euclidean(row, center);
                if representative.is_none_or(|(_, best)| distance < best) {
                    representative = Some((region, distance));
                }
            }
            if members.is_empty() {
                tracing::event!(tracing::Level::WARN, cluster, "cluster has no members");
                empty_clusters.push(cluster);
            }
            clusters.push(Cluster {
                representative: representative.map(|(region, _)| region),
                weight: members.len(),
                members,
            });
        }

        let transformed = self
            .config
            .keep_transformed
            .then(|| data.rows().into_iter().map(|row| row.to_vec()).collect());

        Ok(ClusterSelection {
            num_clusters: k,
            inertia: fit.inertia,
            iterations: fit.iterations,
            scores,
            labels: fit.labels,
            clusters,
            empty_clusters,
            transformed,
        })
    }

    /// Best cluster count under the configured criterion, and every score seen
    fn search(&self, data: &Array2<f64>) -> Result<(usize, Vec<(usize, f64)>), Error> {
        let _span = tracing::span!(tracing::Level::DEBUG, "selection::search").entered();
        let regions = data.nrows();
        let SelectionConfig {
            min_clusters,
            max_clusters,
            criterion,
            ..
        } = self.config;

        let candidates = match criterion {
            // a silhouette needs two clusters and a point outside each
            Criterion::Silhouette => {
                min_clusters.max(2)..=max_clusters.min(regions.saturating_sub(1))
            }
            Criterion::Bic => min_clusters..=max_clusters,
        };
        if candidates.is_empty() {
            return Err(Error::InvalidRequest(format!(
                "no cluster count in {min_clusters}..={max_clusters} can be scored \
                 by {criterion:?} over {regions} regions"
            )));
        }

        let mut scores = vec![];
        let mut best: Option<(usize, f64)> = None;
        for k in candidates {
            let fit = self.backend.fit(data, k, self.config.seed)?;
            let score = match criterion {
                Criterion::Silhouette => self.backend.silhouette_score(data, &fit.labels)?,
                Criterion::Bic => bic_score(data, &fit),
            };
            tracing::event!(tracing::Level::TRACE, k, score, "scored cluster count");
            scores.push((k, score));
            if !score.is_nan() && best.is_none_or(|(_, top)| improves(criterion, score, top)) {
                best = Some((k, score));
            }
        }

        let (k, _) = best.ok_or_else(|| {
            Error::ClusteringError(String::from("every candidate cluster count scored NaN"))
        })?;
        tracing::event!(tracing::Level::DEBUG, k, "chose cluster count");
        Ok((k, scores))
    }
}

fn improves(criterion: Criterion, score: f64, best: f64) -> bool {
    match criterion {
        Criterion::Silhouette => score > best,
        Criterion::Bic => score < best,
    }
}

/// Weighted, normalized profiles of every region of a trace
pub fn weighted_profiles(
    aggregator: &RegionAggregator,
    info: &StaticInfo,
) -> Result<Array2<f64>, Error> {
    let weights = instruction_weights(aggregator.blocks(), info)?;
    normalize(&region_profiles(aggregator)?, &weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceTable;
    use ndarray::array;

    /// Labels rows by their first column: below 0.5 is cluster 0, otherwise cluster `k - 1`
    struct Threshold;

    impl Clusterer for Threshold {
        fn fit(&self, data: &Array2<f64>, k: usize, _seed: u64) -> Result<ClusterFit, Error> {
            let labels: Vec<usize> = data
                .rows()
                .into_iter()
                .map(|row| if row[0] < 0.5 { 0 } else { k - 1 })
                .collect();
            let mut centers = Array2::zeros((k, data.ncols()));
            for (cluster, mut center) in centers.rows_mut().into_iter().enumerate() {
                let members: Vec<_> = data
                    .rows()
                    .into_iter()
                    .zip(&labels)
                    .filter(|&(_, &label)| label == cluster)
                    .map(|(row, _)| row)
                    .collect();
                for row in &members {
                    center += row;
                }
                if !members.is_empty() {
                    center /= members.len() as f64;
                }
            }
            Ok(ClusterFit {
                labels,
                centers,
                inertia: 0.0,
                iterations: Some(1),
            })
        }

        fn silhouette_score(&self, _data: &Array2<f64>, labels: &[usize]) -> Result<f64, Error> {
            // favour exactly two distinct labels
            let mut distinct = labels.to_vec();
            distinct.sort_unstable();
            distinct.dedup();
            Ok(if distinct.len() == 2 { 1.0 } else { 0.0 })
        }
    }

    impl Reducer for Threshold {
        fn reduce(&self, data: &Array2<f64>, dimensions: usize) -> Result<Array2<f64>, Error> {
            Ok(data.slice(ndarray::s![.., ..dimensions]).to_owned())
        }
    }

    fn config(min: usize, max: usize) -> SelectionConfig {
        SelectionConfig {
            min_clusters: min,
            max_clusters: max,
            ..SelectionConfig::default()
        }
    }

    fn two_phases() -> Array2<f64> {
        array![
            [1.0, 0.0],
            [0.9, 0.1],
            [0.1, 0.9],
            [0.0, 1.0],
            [0.95, 0.05],
        ]
    }

    #[test]
    fn normalize_weights_and_scales_rows() {
        let profiles = vec![BlockVector::from(vec![1, 1]), BlockVector::from(vec![0, 4])];
        let matrix = normalize(&profiles, &[3.0, 1.0]).unwrap();
        assert_eq!(matrix, array![[0.75, 0.25], [0.0, 1.0]]);
    }

    #[test]
    fn zero_row_is_normalization_error() {
        let profiles = vec![BlockVector::from(vec![1, 0]), BlockVector::from(vec![0, 4])];
        assert!(matches!(
            normalize(&profiles, &[1.0, 0.0]),
            Err(Error::NormalizationError(_))
        ));
    }

    #[test]
    fn normalize_checks_lengths() {
        let profiles = vec![BlockVector::from(vec![1, 0, 2])];
        assert_eq!(
            normalize(&profiles, &[1.0, 1.0]),
            Err(Error::LengthMismatch { left: 3, right: 2 })
        );
    }

    #[test]
    fn weights_come_from_static_info() {
        let table: TraceTable = "bb_id,0,0,7,3\nbbv,0,0,2,2".parse().unwrap();
        let blocks = BlockMap::from_table(&table);
        let info = StaticInfo::parse("[0:f] [3:a:10] [7:b:30]").unwrap();
        assert_eq!(instruction_weights(&blocks, &info).unwrap(), vec![30.0, 10.0]);
        assert_eq!(uniform_weights(&blocks), vec![1.0, 1.0]);

        let aggregator = RegionAggregator::new(&table, &blocks);
        let profiles = weighted_profiles(&aggregator, &info).unwrap();
        assert_eq!(profiles, array![[0.75, 0.25]]);

        let partial = StaticInfo::parse("[0:f] [3:a:10]").unwrap();
        assert!(matches!(
            instruction_weights(&blocks, &partial),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn representatives_members_and_weights() {
        let engine = SelectionEngine::new(Threshold, config(2, 2));
        let selection = engine.select(&two_phases()).unwrap();

        assert_eq!(selection.num_clusters, 2);
        assert_eq!(selection.labels, vec![1, 1, 0, 0, 1]);
        assert_eq!(selection.clusters[0].members, vec![2, 3]);
        assert_eq!(selection.clusters[1].members, vec![0, 1, 4]);
        // center of cluster 1 is (0.95, 0.05), which region 4 sits on
        assert_eq!(selection.clusters[1].representative, Some(4));
        // regions 2 and 3 are about equally far from (0.05, 0.95)
        assert_eq!(selection.clusters[0].representative, Some(2));
        assert_eq!(selection.weights().sum::<usize>(), 5);
        assert!(selection.empty_clusters.is_empty());
        assert!(selection.transformed.is_none());
    }

    #[test]
    fn empty_clusters_are_reported() {
        let engine = SelectionEngine::new(
            Threshold,
            SelectionConfig {
                criterion: Criterion::Bic,
                ..config(3, 3)
            },
        );
        let selection = engine.select(&two_phases()).unwrap();
        assert_eq!(selection.num_clusters, 3);
        assert_eq!(selection.empty_clusters, vec![1]);
        assert_eq!(selection.clusters[1].representative, None);
        assert_eq!(selection.clusters[1].weight, 0);
        assert_eq!(selection.simulation_points(), vec![(2, 2), (4, 3)]);
    }

    #[test]
    fn silhouette_search_picks_best_k() {
        let engine = SelectionEngine::new(Threshold, config(1, 4));
        let selection = engine.select(&two_phases()).unwrap();
        // k = 1 cannot be scored, so the search starts at 2
        assert_eq!(selection.scores.first().map(|&(k, _)| k), Some(2));
        assert_eq!(selection.scores.len(), 3);
        assert_eq!(selection.num_clusters, 2);
    }

    #[test]
    fn bic_search_reports_raw_scores() {
        let engine = SelectionEngine::new(
            Threshold,
            SelectionConfig {
                criterion: Criterion::Bic,
                ..config(1, 3)
            },
        );
        let selection = engine.select(&two_phases()).unwrap();
        let data = two_phases();
        let raw = bic_score(&data, &Threshold.fit(&data, 2, 0).unwrap());
        assert_eq!(selection.scores[1], (2, raw));
        let best = selection
            .scores
            .iter()
            .copied()
            .fold(f64::INFINITY, |best, (_, score)| best.min(score));
        assert!(selection.scores.iter().any(|&(k, s)| k == selection.num_clusters && s == best));
    }

    #[test]
    fn reduction_and_transformed_output() {
        let engine = SelectionEngine::new(
            Threshold,
            SelectionConfig {
                reduced_dimensions: Some(1),
                keep_transformed: true,
                ..config(2, 2)
            },
        );
        let selection = engine.select(&two_phases()).unwrap();
        let transformed = selection.transformed.unwrap();
        assert_eq!(transformed.len(), 5);
        assert!(transformed.iter().all(|row| row.len() == 1));
    }

    #[test]
    fn rejects_unsatisfiable_requests() {
        let engine = SelectionEngine::new(Threshold, config(2, 6));
        assert!(matches!(
            engine.select(&two_phases()),
            Err(Error::InvalidRequest(_))
        ));

        let engine = SelectionEngine::new(Threshold, config(2, 2));
        assert!(matches!(
            engine.select(&array![[1.0], [0.0]]),
            Err(Error::InvalidRequest(_))
        ));
    }

    /// Delegates to [`Threshold`] and remembers every seed it was fitted with
    #[derive(Default)]
    struct SeedLog {
        seeds: std::cell::RefCell<Vec<u64>>,
    }

    impl Clusterer for SeedLog {
        fn fit(&self, data: &Array2<f64>, k: usize, seed: u64) -> Result<ClusterFit, Error> {
            self.seeds.borrow_mut().push(seed);
            Threshold.fit(data, k, seed)
        }

        fn silhouette_score(&self, data: &Array2<f64>, labels: &[usize]) -> Result<f64, Error> {
            Threshold.silhouette_score(data, labels)
        }
    }

    impl Reducer for SeedLog {
        fn reduce(&self, data: &Array2<f64>, dimensions: usize) -> Result<Array2<f64>, Error> {
            Threshold.reduce(data, dimensions)
        }
    }

    #[test]
    fn every_fit_uses_the_configured_seed() {
        let engine = SelectionEngine::new(
            SeedLog::default(),
            SelectionConfig {
                seed: 99,
                ..config(2, 3)
            },
        );
        engine.select(&two_phases()).unwrap();

        let seeds = engine.backend.seeds.borrow();
        // two candidates, then the refit
        assert_eq!(seeds.as_slice(), &[99, 99, 99]);
    }
}
