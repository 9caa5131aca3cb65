use crate::error::Error;
use crate::trace::RegionId;

use rand::Rng;
use rand::seq::index;

/// `count` distinct region ids drawn uniformly from `0..total`, in increasing order.
///
/// The baseline that clustering-based selection is measured against.
///
/// ```rust
/// use phasemark::rand::{SeedableRng, rngs::StdRng};
///
/// let mut rng = StdRng::seed_from_u64(627);
/// let regions = phasemark::random_regions(100, 5, &mut rng).unwrap();
/// assert_eq!(regions.len(), 5);
/// assert!(regions.windows(2).all(|w| w[0] < w[1]));
/// ```
pub fn random_regions<R: Rng + ?Sized>(
    total: usize,
    count: usize,
    rng: &mut R,
) -> Result<Vec<RegionId>, Error> {
    if count > total {
        return Err(Error::InvalidRequest(format!(
            "cannot pick {count} of {total} regions"
        )));
    }
    let mut regions = index::sample(rng, total, count)
        .into_iter()
        .map(|index| {
            RegionId::try_from(index)
                .map_err(|e| Error::InvalidRequest(format!("region {index} out of range: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    regions.sort_unstable();
    Ok(regions)
}
