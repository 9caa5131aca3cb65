#![doc = include_str!("../README.md")]

mod aggregate;
mod block_map;
mod config;
mod error;
mod history;
mod marker;
mod parsers;
mod pass_input;
pub mod selection;
mod static_info;
mod trace;
mod tracing;
mod vector;

pub use crate::aggregate::RegionAggregator;
pub use crate::block_map::{BlockId, BlockIndex, BlockMap};
pub use crate::config::{AnalysisConfig, Criterion, MarkerConfig, SelectionConfig};
pub use crate::error::Error;
pub use crate::marker::{
    Boundary, BoundarySearch, GracePeriodSearch, LatestStampSearch, Marker, MarkerEngine,
    MarkerTable, SkippedRegion, boundary_regions,
};
pub use crate::pass_input::{Checkpoint, PassInput};
pub use crate::selection::{
    ClusterSelection, LinfaBackend, SelectionEngine, random_regions, weighted_profiles,
};
pub use crate::static_info::{BlockInfo, StaticInfo};
pub use crate::trace::{RegionId, RegionLabel, SampleKind, TraceRow, TraceTable};
pub use crate::vector::BlockVector;

pub use rand;

pub(crate) use hashbrown::{HashMap, HashSet};
