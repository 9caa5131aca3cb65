//! Per-region reconstruction of basic block vectors and count stamps.

use crate::HashMap;
use crate::block_map::BlockMap;
use crate::error::Error;
use crate::trace::{RegionId, RegionLabel, SampleKind, TraceRow, TraceTable};
use crate::tracing;
use crate::vector::BlockVector;

/// Rows of one region and thread, split by kind, in stream order
#[derive(Debug, Default)]
struct ThreadRows<'t> {
    thread: &'t str,
    block_ids: Vec<&'t TraceRow>,
    bbv: Vec<&'t TraceRow>,
    count_stamp: Vec<&'t TraceRow>,
}

/// Pure, per-region views over an immutable trace.
///
/// Rows are bucketed by region and thread once, up front. A `bb_id` row is paired
/// with the `bbv` (or `csv`) row of the same region and thread at the same
/// position, and cells are paired by column.
#[derive(Debug)]
pub struct RegionAggregator<'t> {
    blocks: &'t BlockMap,
    regions: HashMap<RegionId, Vec<ThreadRows<'t>>>,
}

impl<'t> RegionAggregator<'t> {
    #[must_use]
    pub fn new(table: &'t TraceTable, blocks: &'t BlockMap) -> Self {
        let _span = tracing::span!(tracing::Level::DEBUG, "RegionAggregator::new").entered();
        let mut regions: HashMap<RegionId, Vec<ThreadRows<'t>>> = HashMap::new();

        for row in table.rows_iter() {
            let RegionLabel::Id(region) = row.region else {
                continue;
            };
            let threads = regions.entry(region).or_default();
            let position = match threads.iter().position(|t| t.thread == row.thread) {
                Some(position) => position,
                None => {
                    threads.push(ThreadRows {
                        thread: &row.thread,
                        ..ThreadRows::default()
                    });
                    threads.len() - 1
                }
            };
            let Some(rows) = threads.get_mut(position) else {
                continue;
            };
            match row.kind {
                SampleKind::BlockIds => rows.block_ids.push(row),
                SampleKind::Bbv => rows.bbv.push(row),
                SampleKind::CountStamp => rows.count_stamp.push(row),
                _ => {}
            }
        }

        Self { blocks, regions }
    }

    /// Dimensionality of every vector this aggregator produces
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of distinct region ids in the trace
    #[must_use]
    pub fn total_regions(&self) -> usize {
        self.regions.len()
    }

    #[must_use]
    pub const fn blocks(&self) -> &'t BlockMap {
        self.blocks
    }

    /// Execution count of every block within `region`, summed over threads and samples
    pub fn region_bbv(&self, region: RegionId) -> Result<BlockVector, Error> {
        self.fold_region(region, |rows| &rows.bbv, |slot, value| *slot += value)
    }

    /// Largest count stamp of every block within `region`
    pub fn region_count_stamp(&self, region: RegionId) -> Result<BlockVector, Error> {
        self.fold_region(region, |rows| &rows.count_stamp, |slot, value| {
            *slot = (*slot).max(value);
        })
    }

    fn fold_region<S, F>(&self, region: RegionId, select: S, fold: F) -> Result<BlockVector, Error>
    where
        S: for<'r> Fn(&'r ThreadRows<'t>) -> &'r Vec<&'t TraceRow>,
        F: Fn(&mut i64, i64),
    {
        let mut vector = BlockVector::zeros(self.block_count());
        let Some(threads) = self.regions.get(&region) else {
            return Ok(vector);
        };

        for rows in threads {
            for (ids, values) in rows.block_ids.iter().zip(select(rows)) {
                for (id, value) in ids.values.iter().zip(&values.values) {
                    let (Some(id), Some(value)) = (id, value) else {
                        continue;
                    };
                    let index = self.blocks.index_of(id).ok_or_else(|| {
                        Error::trace(region, format!("unknown block id {id:?}"))
                    })?;
                    let value = value.parse::<i64>().map_err(|e| {
                        Error::trace(
                            region,
                            format!("bad sample value {value:?} for block {id:?}: {e}"),
                        )
                    })?;
                    let slot = vector.get_mut(index).ok_or(Error::LengthMismatch {
                        left: index + 1,
                        right: self.block_count(),
                    })?;
                    fold(slot, value);
                }
            }
        }

        Ok(vector)
    }
}
