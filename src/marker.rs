//! Phase-boundary markers.
//!
//! For every region `i` the engine locates three checkpoints inside the full
//! execution: where the warmup window begins, where region `i` begins, and where
//! it ends. Each checkpoint is a `(block, count)` pair meaning "the `count`-th
//! execution of `block` after the previous checkpoint".
//!
//! The engine makes a single forward pass and carries two pieces of state: the
//! cumulative basic block vector through the current region, and a history of
//! that vector after every earlier region. The warmup and start checkpoints are
//! computed from differences between those cumulative snapshots, so regions must be
//! visited in increasing id order.
//!
//! ```rust
//! use phasemark::{BlockMap, MarkerConfig, MarkerEngine, RegionAggregator, TraceTable};
//!
//! let table: TraceTable = "bb_id,0,0,A,B
//! bbv,0,0,5,3
//! csv,0,0,10,10
//! bb_id,1,0,A,B
//! bbv,1,0,0,2
//! csv,1,0,20,25"
//!     .parse()
//!     .unwrap();
//! let blocks = BlockMap::from_table(&table);
//! let aggregator = RegionAggregator::new(&table, &blocks);
//! let config = MarkerConfig {
//!     num_warmup_regions: 0,
//!     grace_percentage: 0.5,
//!     region_length: 20,
//! };
//!
//! let markers = MarkerEngine::new(&aggregator, config)
//!     .unwrap()
//!     .form_all_markers()
//!     .unwrap();
//! let second = markers.get(1).unwrap();
//! assert_eq!(second.end_block.as_str(), "A");
//! assert_eq!(second.end_count, 0);
//! ```

use crate::aggregate::RegionAggregator;
use crate::block_map::{BlockId, BlockIndex};
use crate::config::MarkerConfig;
use crate::error::Error;
use crate::history::SnapshotHistory;
use crate::trace::RegionId;
use crate::tracing;
use crate::vector::BlockVector;
use crate::HashSet;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The block chosen for one boundary, and its execution count in the window before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub index: BlockIndex,
    pub count: i64,
}

/// Strategy that picks a boundary block from a count stamp vector and a delta vector.
///
/// `count_stamp[i]` is how far into the region block `i` was last seen,
/// `delta[i]` how often it ran inside the window that ends at the boundary.
/// Returns `None` only when both vectors are empty.
pub trait BoundarySearch {
    fn search(
        &self,
        count_stamp: &BlockVector,
        delta: &BlockVector,
        threshold: f64,
    ) -> Result<Option<Boundary>, Error>;
}

fn check_aligned(count_stamp: &BlockVector, delta: &BlockVector) -> Result<(), Error> {
    if count_stamp.len() == delta.len() {
        Ok(())
    } else {
        Err(Error::LengthMismatch {
            left: count_stamp.len(),
            right: delta.len(),
        })
    }
}

/// Falls back to the block seen latest in the region
fn latest_stamp(count_stamp: &BlockVector, delta: &BlockVector) -> Option<Boundary> {
    let index = count_stamp.argmax()?;
    delta.get(index).map(|&count| Boundary { index, count })
}

/// Prefer the least frequently executed block among those seen inside the grace
/// period, i.e. with a count stamp of at least `threshold`.
///
/// Rare blocks are unlikely to sit in the middle of a hot loop, which makes them
/// stable checkpoints. When no block reaches the threshold (a region cut short,
/// typically the last one) the block with the largest count stamp is used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GracePeriodSearch;

impl BoundarySearch for GracePeriodSearch {
    fn search(
        &self,
        count_stamp: &BlockVector,
        delta: &BlockVector,
        threshold: f64,
    ) -> Result<Option<Boundary>, Error> {
        check_aligned(count_stamp, delta)?;

        let mut least: Option<Boundary> = None;
        for (index, (&stamp, &count)) in count_stamp.iter().zip(delta.iter()).enumerate() {
            if (stamp as f64) < threshold {
                continue;
            }
            if least.is_none_or(|b| count < b.count) {
                least = Some(Boundary { index, count });
            }
        }

        Ok(least.or_else(|| latest_stamp(count_stamp, delta)))
    }
}

/// Always take the block with the largest count stamp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatestStampSearch;

impl BoundarySearch for LatestStampSearch {
    fn search(
        &self,
        count_stamp: &BlockVector,
        delta: &BlockVector,
        _threshold: f64,
    ) -> Result<Option<Boundary>, Error> {
        check_aligned(count_stamp, delta)?;
        Ok(latest_stamp(count_stamp, delta))
    }
}

#[cfg(feature = "serde")]
mod region_sentinel {
    //! `None` is written as `-1`, the "before the trace starts" region
    use crate::trace::RegionId;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(region: &Option<RegionId>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(region.map_or(-1, i64::from))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<RegionId>, D::Error> {
        let raw = i64::deserialize(d)?;
        Ok(RegionId::try_from(raw).ok())
    }
}

/// Warmup, start and end checkpoints of one region
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct Marker {
    pub region: RegionId,
    /// Region whose end opens the warmup window; `None` before the trace starts
    #[cfg_attr(feature = "serde", serde(with = "region_sentinel"))]
    pub warmup_region: Option<RegionId>,
    /// Region whose end is this region's start; `None` for region 0
    #[cfg_attr(feature = "serde", serde(with = "region_sentinel"))]
    pub start_region: Option<RegionId>,
    pub warmup_block: BlockId,
    pub warmup_count: i64,
    pub start_block: BlockId,
    pub start_count: i64,
    pub end_block: BlockId,
    pub end_count: i64,
}

fn sentinel(region: Option<RegionId>) -> i64 {
    region.map_or(-1, i64::from)
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{},{},{}",
            self.region,
            sentinel(self.warmup_region),
            sentinel(self.start_region),
            self.warmup_block,
            self.warmup_count,
            self.start_block,
            self.start_count,
            self.end_block,
            self.end_count
        )
    }
}

/// A region the engine could not mark, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRegion {
    pub region: RegionId,
    pub error: Error,
}

/// Markers of every region that could be processed, in region order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MarkerTable {
    markers: Vec<Marker>,
    #[cfg_attr(feature = "serde", serde(skip))]
    skipped: Vec<SkippedRegion>,
}

impl MarkerTable {
    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Marker of `region`, or `NotFound` if it was never emitted
    pub fn get(&self, region: RegionId) -> Result<&Marker, Error> {
        self.markers
            .iter()
            .find(|m| m.region == region)
            .ok_or_else(|| Error::NotFound(format!("no marker for region {region}")))
    }

    /// Regions dropped because of recoverable trace errors
    #[must_use]
    pub fn skipped(&self) -> &[SkippedRegion] {
        &self.skipped
    }
}

impl fmt::Display for MarkerTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "region,warmup_rid,start_rid,warmup_bid,warmup_count,start_bid,start_count,end_bid,end_count"
        )?;
        for marker in &self.markers {
            writeln!(f, "{marker}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a MarkerTable {
    type Item = &'a Marker;
    type IntoIter = std::slice::Iter<'a, Marker>;
    fn into_iter(self) -> Self::IntoIter {
        self.markers.iter()
    }
}

/// Running state of one forward pass
struct PassState {
    global: BlockVector,
    history: SnapshotHistory<BlockVector>,
}

/// The phase-boundary state machine.
///
/// Each of the three boundaries has its own [`BoundarySearch`] policy: `W` for the
/// warmup boundary, `S` for the start and `E` for the end. By default all three
/// use [`GracePeriodSearch`].
#[derive(Debug)]
pub struct MarkerEngine<'a, 't, W = GracePeriodSearch, S = W, E = W> {
    aggregator: &'a RegionAggregator<'t>,
    config: MarkerConfig,
    warmup_search: W,
    start_search: S,
    end_search: E,
}

impl<'a, 't> MarkerEngine<'a, 't> {
    pub fn new(aggregator: &'a RegionAggregator<'t>, config: MarkerConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            aggregator,
            config,
            warmup_search: GracePeriodSearch,
            start_search: GracePeriodSearch,
            end_search: GracePeriodSearch,
        })
    }
}

impl<'a, 't, W, S, E> MarkerEngine<'a, 't, W, S, E>
where
    W: BoundarySearch,
    S: BoundarySearch,
    E: BoundarySearch,
{
    /// Use one policy for all three boundaries
    #[must_use]
    pub fn with_search<T>(self, search: T) -> MarkerEngine<'a, 't, T, T, T>
    where
        T: BoundarySearch + Clone,
    {
        self.with_searches(search.clone(), search.clone(), search)
    }

    /// Use a separate policy for the warmup, start and end boundaries.
    ///
    /// ```rust
    /// use phasemark::{
    ///     BlockMap, GracePeriodSearch, LatestStampSearch, MarkerConfig, MarkerEngine,
    ///     RegionAggregator, TraceTable,
    /// };
    ///
    /// let table: TraceTable = "bb_id,0,0,A,B\nbbv,0,0,5,3\ncsv,0,0,10,10".parse().unwrap();
    /// let blocks = BlockMap::from_table(&table);
    /// let aggregator = RegionAggregator::new(&table, &blocks);
    /// let engine = MarkerEngine::new(&aggregator, MarkerConfig::default())
    ///     .unwrap()
    ///     .with_searches(LatestStampSearch, LatestStampSearch, GracePeriodSearch);
    /// assert_eq!(engine.form_all_markers().unwrap().len(), 1);
    /// ```
    #[must_use]
    pub fn with_searches<W2, S2, E2>(
        self,
        warmup: W2,
        start: S2,
        end: E2,
    ) -> MarkerEngine<'a, 't, W2, S2, E2>
    where
        W2: BoundarySearch,
        S2: BoundarySearch,
        E2: BoundarySearch,
    {
        MarkerEngine {
            aggregator: self.aggregator,
            config: self.config,
            warmup_search: warmup,
            start_search: start,
            end_search: end,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &MarkerConfig {
        &self.config
    }

    /// Markers for every region of the trace.
    ///
    /// Regions whose samples are malformed are logged, recorded in
    /// [`MarkerTable::skipped`] and passed over; any other error aborts the run.
    pub fn form_all_markers(&self) -> Result<MarkerTable, Error> {
        let _span = tracing::span!(tracing::Level::DEBUG, "markers::form_all").entered();
        let total = self.aggregator.total_regions();
        self.run(total, |_| true)
    }

    /// Markers for `targets` only.
    ///
    /// Every earlier region is still folded into the cumulative state; the pass
    /// stops as soon as every target has been handled.
    pub fn form_targeted_markers(&self, targets: &[RegionId]) -> Result<MarkerTable, Error> {
        let _span = tracing::span!(tracing::Level::DEBUG, "markers::form_targeted").entered();
        if targets.is_empty() {
            return Err(Error::InvalidRequest(String::from(
                "no target regions given",
            )));
        }
        let total = self.aggregator.total_regions();
        if let Some(&out_of_range) = targets.iter().find(|&&r| r as usize >= total) {
            return Err(Error::InvalidRequest(format!(
                "target region {out_of_range} is outside the trace ({total} regions)"
            )));
        }

        let wanted: HashSet<RegionId> = targets.iter().copied().collect();
        let last = wanted.iter().copied().max().map_or(0, |r| r as usize + 1);
        self.run(last, |region| wanted.contains(&region))
    }

    fn run(&self, regions: usize, wanted: impl Fn(RegionId) -> bool) -> Result<MarkerTable, Error> {
        let block_count = self.aggregator.block_count();
        let mut state = PassState {
            global: BlockVector::zeros(block_count),
            history: SnapshotHistory::new(),
        };
        let mut table = MarkerTable::default();

        for region in (0..regions).filter_map(|r| RegionId::try_from(r).ok()) {
            let outcome = self.advance(&mut state, region, wanted(region));
            state.history.push(state.global.clone());

            match outcome {
                Ok(Some(marker)) => {
                    tracing::event!(tracing::Level::TRACE, region, "marker formed");
                    table.markers.push(marker);
                }
                Ok(None) => {}
                Err(error) if error.is_recoverable() => {
                    tracing::event!(
                        tracing::Level::WARN,
                        region,
                        %error,
                        "skipping region"
                    );
                    if wanted(region) {
                        table.skipped.push(SkippedRegion { region, error });
                    }
                }
                Err(error) => return Err(error),
            }
        }

        Ok(table)
    }

    /// Fold `region` into the cumulative vector, and mark it if `wanted`
    fn advance(
        &self,
        state: &mut PassState,
        region: RegionId,
        wanted: bool,
    ) -> Result<Option<Marker>, Error> {
        let end_bbv = self.aggregator.region_bbv(region)?;
        state.global.accumulate(&end_bbv)?;

        if wanted {
            self.mark(state, region).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Cumulative vector and count stamp at the end of `region`, zeros before the trace
    fn resolve(
        &self,
        state: &PassState,
        region: Option<RegionId>,
    ) -> Result<(BlockVector, BlockVector), Error> {
        let Some(region) = region else {
            let zeros = BlockVector::zeros(self.aggregator.block_count());
            return Ok((zeros.clone(), zeros));
        };
        let bbv = state.history.get(region).cloned().ok_or_else(|| {
            Error::NotFound(format!("no cumulative snapshot for region {region}"))
        })?;
        let count_stamp = self.aggregator.region_count_stamp(region)?;
        Ok((bbv, count_stamp))
    }

    fn mark(&self, state: &PassState, region: RegionId) -> Result<Marker, Error> {
        let end_count_stamp = self.aggregator.region_count_stamp(region)?;

        let (warmup_region, start_region) =
            boundary_regions(region, self.config.num_warmup_regions);
        let (warmup_bbv, warmup_count_stamp) = self.resolve(state, warmup_region)?;
        let (start_bbv, start_count_stamp) = self.resolve(state, start_region)?;

        let relative_start = start_bbv.relative(&warmup_bbv)?;
        let relative_end = state.global.relative(&start_bbv)?;

        let threshold = self.config.threshold();
        let mut warmup = locate(
            &self.warmup_search,
            &warmup_count_stamp,
            &warmup_bbv,
            threshold,
            region,
        )?;
        let mut start = locate(
            &self.start_search,
            &start_count_stamp,
            &relative_start,
            threshold,
            region,
        )?;
        let end = locate(
            &self.end_search,
            &end_count_stamp,
            &relative_end,
            threshold,
            region,
        )?;

        // a zero count carries no position; report the canonical block instead
        if warmup.count == 0 {
            warmup.index = 0;
        }
        if start.count == 0 {
            start.index = 0;
        }

        Ok(Marker {
            region,
            warmup_region,
            start_region,
            warmup_block: self.block_id(warmup.index)?,
            warmup_count: warmup.count,
            start_block: self.block_id(start.index)?,
            start_count: start.count,
            end_block: self.block_id(end.index)?,
            end_count: end.count,
        })
    }

    fn block_id(&self, index: BlockIndex) -> Result<BlockId, Error> {
        self.aggregator
            .blocks()
            .block_id(index)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no block at index {index}")))
    }
}

fn locate<B: BoundarySearch>(
    search: &B,
    count_stamp: &BlockVector,
    delta: &BlockVector,
    threshold: f64,
    region: RegionId,
) -> Result<Boundary, Error> {
    search
        .search(count_stamp, delta, threshold)?
        .ok_or_else(|| Error::trace(region, "trace has no basic blocks"))
}

/// Regions whose ends open the warmup and start windows of `region`.
///
/// A warmup window that would coincide with the start window is dropped.
#[must_use]
pub fn boundary_regions(
    region: RegionId,
    num_warmup_regions: u32,
) -> (Option<RegionId>, Option<RegionId>) {
    let start = region.checked_sub(1);
    let warmup = region
        .checked_sub(num_warmup_regions)
        .and_then(|r| r.checked_sub(1));
    if warmup == start {
        (None, start)
    } else {
        (warmup, start)
    }
}
