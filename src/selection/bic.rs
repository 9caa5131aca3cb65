use super::{ClusterFit, euclidean};
use ndarray::Array2;

/// Bayesian information criterion of a k-means fit; lower is better.
///
/// Treats the distance from each point to its nearest center as the point's
/// negative log likelihood (up to a factor of two), and charges `ln(n)` for
/// each of the `(k - 1) + d * k + 1` free parameters.
#[must_use]
pub fn bic_score(data: &Array2<f64>, fit: &ClusterFit) -> f64 {
    let (points, dimensions) = data.dim();
    let clusters = fit.centers.nrows();

    let free_parameters = (clusters.saturating_sub(1) + dimensions * clusters + 1) as f64;
    let log_likelihood: f64 = data
        .rows()
        .into_iter()
        .map(|row| {
            fit.centers
                .rows()
                .into_iter()
                .map(|center| euclidean(row, center))
                .fold(f64::INFINITY, f64::min)
        })
        .map(|distance| -0.5 * distance)
        .sum();

    -2.0 * log_likelihood + free_parameters * (points as f64).ln()
}
