use nom::{
    bytes::complete::tag,
    character::complete::digit1,
    combinator::{map_res, opt},
    sequence::{preceded, tuple},
    Finish, IResult,
};
use thiserror::Error;

/// Header is the parsed form of a `@@ -a,b +c,d @@` hunk header.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) old_start: usize,
    pub(crate) old_len: usize,
    pub(crate) new_start: usize,
    pub(crate) new_len: usize,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hunk header: {0}")]
    InvalidHeader(String),

    #[error("missing hunk header")]
    NoHeader,
}

impl Header {
    pub(crate) fn parse(line: &str) -> Result<Self, Error> {
        Ok(Finish::finish(header(line))
            .map_err(|e| {
                if e.input.is_empty() {
                    Error::NoHeader
                } else {
                    Error::InvalidHeader(line.to_string())
                }
            })?
            .1)
    }
}

fn header(input: &str) -> IResult<&str, Header> {
    // Anything after the closing @@ is a section heading and is ignored.
    let (rest, (_, (old_start, old_len), _, (new_start, new_len), _)) =
        tuple((tag("@@ -"), range, tag(" +"), range, tag(" @@")))(input)?;

    Ok((
        rest,
        Header {
            old_start,
            old_len,
            new_start,
            new_len,
        },
    ))
}

// A range is `start,len`, where an omitted length means a single line.
fn range(input: &str) -> IResult<&str, (usize, usize)> {
    let (rest, (start, len)) = tuple((number, opt(preceded(tag(","), number))))(input)?;
    Ok((rest, (start, len.unwrap_or(1))))
}

fn number(input: &str) -> IResult<&str, usize> {
    map_res(digit1, str::parse::<usize>)(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(
            Header::parse("@@ -1,3 +0,0 @@").unwrap(),
            Header {
                old_start: 1,
                old_len: 3,
                new_start: 0,
                new_len: 0
            }
        );

        assert_eq!(
            Header::parse("@@ -20 +21,2 @@ fn main() {").unwrap(),
            Header {
                old_start: 20,
                old_len: 1,
                new_start: 21,
                new_len: 2
            }
        );

        assert!(matches!(Header::parse(""), Err(Error::NoHeader)));

        assert!(matches!(
            Header::parse("@@ -1,3 @@"),
            Err(Error::InvalidHeader(_))
        ));

        assert!(matches!(
            Header::parse("@@ -x,1 +1 @@"),
            Err(Error::InvalidHeader(_))
        ));

        assert!(matches!(
            Header::parse("--- a/file"),
            Err(Error::InvalidHeader(_))
        ));
    }
}
