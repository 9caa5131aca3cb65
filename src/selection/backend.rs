use super::{ClusterFit, Clusterer, Reducer};
use crate::error::Error;
use crate::tracing;

use linfa::metrics::SilhouetteScore;
use linfa::traits::{Fit, Predict};
use linfa::{Dataset, DatasetBase};
use linfa_clustering::KMeans;
use linfa_reduction::Pca;
use ndarray::{Array1, Array2};
use rand_xoshiro::Xoshiro256Plus;
use rand_xoshiro::rand_core::SeedableRng;

/// k-means, silhouette scoring and PCA from the linfa toolkit.
///
/// Every fit starts from a generator seeded with the seed it is given, so refitting
/// the same data at the same `k` reproduces the same model.
#[derive(Debug, Clone, PartialEq)]
pub struct LinfaBackend {
    pub max_iterations: u64,
    pub tolerance: f64,
    /// Independent initialisations per fit; the lowest inertia wins
    pub n_runs: usize,
}

impl Default for LinfaBackend {
    fn default() -> Self {
        Self {
            max_iterations: 300,
            tolerance: 1e-4,
            n_runs: 10,
        }
    }
}

impl Clusterer for LinfaBackend {
    fn fit(&self, data: &Array2<f64>, k: usize, seed: u64) -> Result<ClusterFit, Error> {
        let _span = tracing::span!(tracing::Level::DEBUG, "LinfaBackend::fit", k).entered();
        let dataset = Dataset::from(data.clone());
        let model = KMeans::params_with_rng(k, Xoshiro256Plus::seed_from_u64(seed))
            .n_runs(self.n_runs)
            .max_n_iterations(self.max_iterations)
            .tolerance(self.tolerance)
            .fit(&dataset)
            .map_err(|e| Error::ClusteringError(format!("k-means with k = {k}: {e}")))?;

        let labels: Array1<usize> = model.predict(data);
        Ok(ClusterFit {
            labels: labels.to_vec(),
            centers: model.centroids().clone(),
            inertia: model.inertia(),
            iterations: None,
        })
    }

    fn silhouette_score(&self, data: &Array2<f64>, labels: &[usize]) -> Result<f64, Error> {
        let dataset = DatasetBase::new(data.clone(), Array1::from_vec(labels.to_vec()));
        dataset
            .silhouette_score()
            .map_err(|e| Error::ClusteringError(format!("silhouette score: {e}")))
    }
}

impl Reducer for LinfaBackend {
    fn reduce(&self, data: &Array2<f64>, dimensions: usize) -> Result<Array2<f64>, Error> {
        let _span =
            tracing::span!(tracing::Level::DEBUG, "LinfaBackend::reduce", dimensions).entered();
        let dataset = Dataset::from(data.clone());
        let pca = Pca::params(dimensions)
            .fit(&dataset)
            .map_err(|e| Error::ClusteringError(format!("PCA to {dimensions} dimensions: {e}")))?;
        let reduced: Array2<f64> = pca.predict(data);
        Ok(reduced)
    }
}
