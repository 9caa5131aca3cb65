use nom::{Input, Parser, error::ParseError};

///like `nom::separated_list1` but the element parser may match nothing, so
///empty cells between separators (`a,,b`) are kept as empty elements
pub fn xt_list_with_separator<I, F, D, E>(
    mut parser: F,
    mut delimiter: D,
) -> impl Parser<I, Output = Vec<<F as Parser<I>>::Output>, Error = E>
where
    I: Clone + Input + Copy,
    F: Parser<I, Error = E>,
    D: Parser<I, Error = E>,
    E: ParseError<I>,
{
    move |mut input: I| {
        let mut acc = vec![];
        loop {
            let (i, o) = parser.parse(input)?;
            acc.push(o);
            input = i;
            match delimiter.parse(input) {
                Ok((i, _)) => input = i,
                Err(nom::Err::Error(_)) => break,
                Err(e) => return Err(e),
            }
        }
        Ok((input, acc))
    }
}
