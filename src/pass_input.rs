//! The nine numbers the instrumentation pass needs to place one region's
//! boundary hooks.

use crate::block_map::BlockId;
use crate::error::Error;
use crate::marker::MarkerTable;
use crate::static_info::StaticInfo;
use crate::trace::RegionId;
use std::fmt;

#[cfg(feature = "serde")]
use serde::Serialize;

/// "Stop at the `count`-th execution of block `block_id` in function `function_id`"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Checkpoint {
    pub function_id: u64,
    pub block_id: u64,
    pub count: i64,
}

impl Checkpoint {
    fn resolve(info: &StaticInfo, block: &BlockId, count: i64) -> Result<Self, Error> {
        let block_id = block
            .as_str()
            .parse::<u64>()
            .map_err(|e| Error::NotFound(format!("block {block} is not a static block id: {e}")))?;
        let function_id = info.lookup(block)?.function_id;
        Ok(Self {
            function_id,
            block_id,
            count,
        })
    }
}

/// Warmup, start and end checkpoints of one region.
///
/// A warmup or start window that opens before the trace begins is all zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PassInput {
    pub region: RegionId,
    pub warmup: Checkpoint,
    pub start: Checkpoint,
    pub end: Checkpoint,
}

impl PassInput {
    pub fn for_region(
        markers: &MarkerTable,
        info: &StaticInfo,
        region: RegionId,
    ) -> Result<Self, Error> {
        let marker = markers.get(region)?;

        let warmup = match marker.warmup_region {
            Some(_) => Checkpoint::resolve(info, &marker.warmup_block, marker.warmup_count)?,
            None => Checkpoint::default(),
        };
        let start = match marker.start_region {
            Some(_) => Checkpoint::resolve(info, &marker.start_block, marker.start_count)?,
            None => Checkpoint::default(),
        };
        let end = Checkpoint::resolve(info, &marker.end_block, marker.end_count)?;

        Ok(Self {
            region,
            warmup,
            start,
            end,
        })
    }

    /// `(warmupFn, warmupBlock, warmupCount, startFn, ..., endCount)`
    #[must_use]
    pub const fn as_tuple(&self) -> (u64, u64, i64, u64, u64, i64, u64, u64, i64) {
        (
            self.warmup.function_id,
            self.warmup.block_id,
            self.warmup.count,
            self.start.function_id,
            self.start.block_id,
            self.start.count,
            self.end.function_id,
            self.end.block_id,
            self.end.count,
        )
    }

    /// Comma-separated form read by the pass
    #[must_use]
    pub fn to_csv_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PassInput {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (a, b, c, d, e, g, h, i, j) = self.as_tuple();
        write!(f, "{a},{b},{c},{d},{e},{g},{h},{i},{j}")
    }
}
