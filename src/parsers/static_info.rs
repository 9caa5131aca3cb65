use super::unsigned;
use crate::static_info::BlockInfo;

use nom::{
    IResult, Parser,
    bytes::complete::take_till1,
    character::complete::{self, space0},
    combinator::{all_consuming, map_res, rest, verify},
    error::{Error, ErrorKind},
    multi::many0,
    sequence::{delimited, preceded, separated_pair, terminated},
};

/// Text between a `[` and the next `]`
fn bracketed(input: &str) -> IResult<&str, &str> {
    delimited(
        complete::char('['),
        take_till1(|c: char| c == ']'),
        complete::char(']'),
    )
    .parse(input)
}

/// `[funcId:funcName]`
fn function_header(input: &str) -> IResult<&str, (u64, &str)> {
    map_res(bracketed, |body| {
        all_consuming(separated_pair(
            unsigned,
            complete::char(':'),
            verify(rest, |name: &str| !name.is_empty()),
        ))
        .parse(body)
        .map(|(_, header)| header)
    })
    .parse(input)
}

/// Body of `[blockId:blockName:instCount]`; the name may itself contain colons
fn block_body(body: &str) -> Result<(u64, &str, u64), nom::Err<Error<&str>>> {
    let (name_and_count, id) = terminated(unsigned, complete::char(':')).parse(body)?;
    let Some((name, count)) = name_and_count.rsplit_once(':') else {
        return Err(nom::Err::Error(Error::new(name_and_count, ErrorKind::Char)));
    };
    let (_, count) = all_consuming(unsigned).parse(count)?;
    Ok((id, name, count))
}

fn block_descriptor(input: &str) -> IResult<&str, (u64, &str, u64)> {
    map_res(bracketed, block_body).parse(input)
}

/// A function header followed by its block descriptors.
///
/// Lines that do not open with a function header carry nothing and yield `None`.
pub fn static_line(input: &str) -> IResult<&str, Option<Vec<(u64, BlockInfo)>>> {
    let input = input.trim_start();
    let Ok((input, (function_id, function_name))) = function_header(input) else {
        return Ok(("", None));
    };

    let (input, blocks) =
        terminated(many0(preceded(space0, block_descriptor)), space0).parse(input)?;

    let blocks = blocks
        .into_iter()
        .map(|(id, name, inst_count)| {
            (
                id,
                BlockInfo {
                    name: name.to_string(),
                    inst_count,
                    function_name: function_name.to_string(),
                    function_id,
                },
            )
        })
        .collect();
    Ok((input, Some(blocks)))
}
