use super::{cell, cells};
use crate::trace::{RegionId, RegionLabel, SampleKind, TraceRow};

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_till1},
    character::complete::{self, digit1},
    combinator::{map, map_res, opt, value},
    sequence::preceded,
};

fn kind(input: &str) -> IResult<&str, SampleKind> {
    map(take_till1(|c: char| c == ','), SampleKind::from_label).parse(input)
}

fn region_label(input: &str) -> IResult<&str, RegionLabel> {
    alt((
        map(map_res(digit1, str::parse::<RegionId>), RegionLabel::Id),
        value(RegionLabel::Unassigned, alt((tag("N/A"), tag("region")))),
    ))
    .parse(input)
}

/// `kind,region,thread[,value...]`
pub fn trace_row(input: &str) -> IResult<&str, Option<TraceRow>> {
    let (input, (kind, region, thread)) = (
        kind,
        preceded(complete::char(','), region_label),
        preceded(complete::char(','), cell),
    )
        .parse(input)?;
    let (input, values) = opt(preceded(complete::char(','), cells)).parse(input)?;

    let values = values
        .unwrap_or_default()
        .into_iter()
        .map(|v| (!v.is_empty()).then(|| v.to_string()))
        .collect();

    Ok((
        input,
        Some(TraceRow {
            kind,
            region,
            thread: thread.to_string(),
            values,
        }),
    ))
}
