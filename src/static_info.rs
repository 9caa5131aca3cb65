//! Compile-time facts about every instrumented basic block.
//!
//! The instrumentation pass writes one line per function:
//!
//! ```text
//! [3:main] [10:entry:4] [11:for.body:12]
//! ```
//!
//! a `[functionId:functionName]` header followed by
//! `[blockId:blockName:instructionCount]` descriptors. Trace block ids are the
//! decimal `blockId`s.

use crate::HashMap;
use crate::block_map::BlockId;
use crate::error::Error;
use crate::parsers;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Static description of one basic block
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct BlockInfo {
    pub name: String,
    /// IR instructions in the block, used as its weight when normalizing profiles
    pub inst_count: u64,
    pub function_name: String,
    pub function_id: u64,
}

/// Map from numeric block id to its [`BlockInfo`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticInfo {
    blocks: HashMap<u64, BlockInfo>,
}

impl StaticInfo {
    /// Parse the pass's static dump; when a block id repeats the last line wins
    pub fn parse(input: &str) -> Result<Self, Error> {
        let lines = parsers::parse_lines(input, parsers::static_info::static_line)?;
        Ok(lines.into_iter().flatten().collect())
    }

    #[must_use]
    pub fn get(&self, block: u64) -> Option<&BlockInfo> {
        self.blocks.get(&block)
    }

    /// Info for a block as it is named in the trace
    pub fn lookup(&self, block: &BlockId) -> Result<&BlockInfo, Error> {
        block
            .as_str()
            .parse::<u64>()
            .ok()
            .and_then(|id| self.get(id))
            .ok_or_else(|| Error::NotFound(format!("block {block} has no static info")))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &BlockInfo)> {
        self.blocks.iter().map(|(&id, info)| (id, info))
    }
}

impl FromIterator<(u64, BlockInfo)> for StaticInfo {
    fn from_iter<T: IntoIterator<Item = (u64, BlockInfo)>>(iter: T) -> Self {
        Self {
            blocks: iter.into_iter().collect(),
        }
    }
}

impl FromStr for StaticInfo {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
