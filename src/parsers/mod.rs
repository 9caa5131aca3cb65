mod nom_xt;
pub(crate) mod static_info;
pub(crate) mod trace;

use crate::error::Error;

use nom::{
    IResult, Parser,
    bytes::complete::take_till,
    character::complete::{self, digit1},
    combinator::map_res,
};
use nom_xt::xt_list_with_separator;

/// A single comma-delimited cell, possibly empty
pub fn cell(input: &str) -> IResult<&str, &str> {
    take_till(|c: char| c == ',').parse(input)
}

/// Every cell of a comma-delimited line, empty ones included
pub fn cells(input: &str) -> IResult<&str, Vec<&str>> {
    xt_list_with_separator(cell, complete::char(',')).parse(input)
}

pub fn unsigned(input: &str) -> IResult<&str, u64> {
    map_res(digit1, str::parse::<u64>).parse(input)
}

/// Run `line_parser` over every non-blank line, numbering errors from 1.
///
/// Lines are stripped of a trailing `\r` so files written on any platform parse alike.
pub(crate) fn parse_lines<'a, O, P>(input: &'a str, mut line_parser: P) -> Result<Vec<O>, Error>
where
    P: Parser<&'a str, Output = Option<O>, Error = nom::error::Error<&'a str>>,
{
    let mut parsed = vec![];
    for (number, line) in input.lines().enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            continue;
        }
        let failure = match line_parser.parse(line) {
            Ok(("", Some(o))) => {
                parsed.push(o);
                continue;
            }
            Ok(("", None)) => continue,
            Ok((rest, _)) => format!("unexpected trailing input {rest:?}"),
            Err(e) => Error::from(e).to_string(),
        };
        return Err(Error::ParseError(format!("line {}: {failure}", number + 1)));
    }
    Ok(parsed)
}
