//! The decoded sample stream emitted by the analysis hooks.
//!
//! Every row of the stream is `kind,region,thread,value_1,..,value_m`. The hooks
//! write three rows per region and thread: `bb_id` (the block ids touched),
//! `bbv` (how often each was executed) and `csv` (the instruction count stamp
//! each block was last seen at), positionally aligned. A trailing
//! `region_inst,N/A,N/A,...` row holds the instruction count of every region.
//!
//! ```rust
//! use phasemark::TraceTable;
//!
//! let table: TraceTable = "type,region,thread,data
//! bb_id,0,0,3,8
//! bbv,0,0,12,1
//! csv,0,0,90,100
//! region_inst,N/A,N/A,100"
//!     .parse()
//!     .unwrap();
//!
//! assert_eq!(table.total_regions(), 1);
//! assert_eq!(table.region_instruction_counts().unwrap(), vec![100]);
//! ```

use crate::error::Error;
use crate::parsers;
use crate::HashSet;
use std::str;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Ordinal id of an execution region, 0-based and contiguous
pub type RegionId = u32;

/// What a trace row carries
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[non_exhaustive]
pub enum SampleKind {
    /// `bb_id`: block identifiers
    BlockIds,
    /// `bbv`: execution counts aligned with the preceding `bb_id` row
    Bbv,
    /// `csv`: count stamps aligned with the preceding `bb_id` row
    CountStamp,
    /// `region_inst`: instruction count per region
    RegionInstructions,
    /// anything else, including the header row; ignored by the analysis
    Other(String),
}

impl SampleKind {
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "bb_id" => SampleKind::BlockIds,
            "bbv" => SampleKind::Bbv,
            "csv" => SampleKind::CountStamp,
            "region_inst" => SampleKind::RegionInstructions,
            other => SampleKind::Other(other.to_string()),
        }
    }
}

/// The region column of a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum RegionLabel {
    Id(RegionId),
    /// `N/A` or the literal header `region`; never counted as a region
    Unassigned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct TraceRow {
    pub kind: SampleKind,
    pub region: RegionLabel,
    pub thread: String,
    /// `None` marks an empty cell
    pub values: Vec<Option<String>>,
}

impl TraceRow {
    /// Present cells only, with their column position
    pub fn present_values(&self) -> impl Iterator<Item = (usize, &str)> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(col, v)| v.as_deref().map(|v| (col, v)))
    }
}

/// All rows of one captured trace, in stream order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct TraceTable {
    rows: Vec<TraceRow>,
}

impl TraceTable {
    #[must_use]
    pub const fn from_rows(rows: Vec<TraceRow>) -> Self {
        Self { rows }
    }

    /// Decode a delimited sample stream
    pub fn parse(input: &str) -> Result<Self, Error> {
        let rows = parsers::parse_lines(input, parsers::trace::trace_row)?;
        Ok(Self::from_rows(rows))
    }

    pub fn rows_iter(&self) -> impl Iterator<Item = &TraceRow> {
        self.rows.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows of a given kind, in stream order
    pub fn rows_of_kind<'a>(&'a self, kind: &'a SampleKind) -> impl Iterator<Item = &'a TraceRow> {
        self.rows.iter().filter(move |row| row.kind == *kind)
    }

    /// Rows labelled with `region`, in stream order
    pub fn region_rows(&self, region: RegionId) -> impl Iterator<Item = &TraceRow> {
        self.rows
            .iter()
            .filter(move |row| row.region == RegionLabel::Id(region))
    }

    /// Number of distinct region ids, sentinels excluded
    #[must_use]
    pub fn total_regions(&self) -> usize {
        self.rows
            .iter()
            .filter_map(|row| match row.region {
                RegionLabel::Id(id) => Some(id),
                RegionLabel::Unassigned => None,
            })
            .collect::<HashSet<_>>()
            .len()
    }

    /// Dynamic instruction count of every region, from the `region_inst` row.
    ///
    /// Empty when the trace has no such row. Missing cells count as zero.
    pub fn region_instruction_counts(&self) -> Result<Vec<u64>, Error> {
        let Some(row) = self.rows_of_kind(&SampleKind::RegionInstructions).next() else {
            return Ok(vec![]);
        };

        row.values
            .iter()
            .enumerate()
            .map(|(region, cell)| match cell.as_deref() {
                None => Ok(0),
                Some(text) => text.parse::<u64>().map_err(|e| {
                    Error::ParseError(format!(
                        "region_inst value {text:?} for region {region}: {e}"
                    ))
                }),
            })
            .collect()
    }
}

impl str::FromStr for TraceTable {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_REGIONS: &str = "type,region,thread,data
bb_id,0,0,1,2
bbv,0,0,5,3
csv,0,0,10,10
bb_id,1,0,1,2
bbv,1,0,0,2
csv,1,0,20,25
region_inst,N/A,N/A,20,25
";

    #[test]
    fn parses_rows_in_order() {
        let table: TraceTable = TWO_REGIONS.parse().unwrap();
        assert_eq!(table.len(), 8);
        let kinds: Vec<_> = table.rows_iter().map(|r| r.kind.clone()).collect();
        assert_eq!(kinds.first(), Some(&SampleKind::Other("type".to_string())));
        assert_eq!(kinds.last(), Some(&SampleKind::RegionInstructions));
    }

    #[test]
    fn sentinels_are_not_regions() {
        let table: TraceTable = TWO_REGIONS.parse().unwrap();
        assert_eq!(table.total_regions(), 2);
    }

    #[test]
    fn region_rows_filters_by_id() {
        let table: TraceTable = TWO_REGIONS.parse().unwrap();
        assert_eq!(table.region_rows(1).count(), 3);
        assert_eq!(table.region_rows(7).count(), 0);
    }

    #[test]
    fn instruction_counts() {
        let table: TraceTable = TWO_REGIONS.parse().unwrap();
        assert_eq!(table.region_instruction_counts().unwrap(), vec![20, 25]);

        let table: TraceTable = "bbv,0,0,1".parse().unwrap();
        assert!(table.region_instruction_counts().unwrap().is_empty());

        let table: TraceTable = "region_inst,N/A,N/A,4,,x".parse().unwrap();
        assert!(matches!(
            table.region_instruction_counts(),
            Err(Error::ParseError(_))
        ));
    }

    #[test]
    fn parse_error_names_line() {
        let err = "bbv,0,0,1\nbbv,zero,0,1".parse::<TraceTable>().unwrap_err();
        assert!(err.to_string().starts_with("line 2:"));
    }

    #[test]
    fn present_values_skips_empty_cells() {
        let table: TraceTable = "bb_id,0,0,4,,6".parse().unwrap();
        let row = table.rows_iter().next().unwrap();
        let present: Vec<_> = row.present_values().collect();
        assert_eq!(present, vec![(0, "4"), (2, "6")]);
    }

    #[test]
    fn empty_input_is_empty_table() {
        let table: TraceTable = "\n\n".parse().unwrap();
        assert!(table.is_empty());
        assert_eq!(table.total_regions(), 0);
    }
}
