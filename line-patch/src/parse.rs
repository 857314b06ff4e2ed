use std::{iter::Enumerate, str::SplitTerminator};

use thiserror::Error;

use crate::{
    header::{self, Header},
    Hunk, Line, Op,
};

/// HunkReader yields the hunks of unified patch text, one at a time.
pub(crate) struct HunkReader<'a> {
    lines: std::iter::Peekable<Enumerate<SplitTerminator<'a, char>>>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of patch: hunk at line {line} wanted {want} more line(s)")]
    EndOfPatch { line: usize, want: usize },

    #[error("header parsing error on line {line}: {error}")]
    Header {
        #[source]
        error: header::Error,
        line: usize,
    },

    #[error("unexpected content on line {line}: {content:?}")]
    UnexpectedLine { line: usize, content: String },
}

impl<'a> HunkReader<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        // Only '\n' ends a line; a '\r' before it belongs to the content.
        Self {
            lines: text.split_terminator('\n').enumerate().peekable(),
        }
    }

    fn read_body(&mut self, header: &Header, header_line: usize) -> Result<Vec<Line>, Error> {
        let mut old_left = header.old_len;
        let mut new_left = header.new_len;
        let mut lines: Vec<Line> = Vec::new();

        while old_left > 0 || new_left > 0 {
            let (number, raw) = match self.lines.next() {
                Some(line) => line,
                None => {
                    return Err(Error::EndOfPatch {
                        line: header_line + 1,
                        want: old_left.max(new_left),
                    })
                }
            };

            // Some tools strip the single space from empty context lines.
            let (op, text) = match raw.chars().next() {
                Some(' ') => (Op::Context, &raw[1..]),
                None => (Op::Context, ""),
                Some('-') => (Op::Delete, &raw[1..]),
                Some('+') => (Op::Insert, &raw[1..]),
                Some('\\') => {
                    mark_no_newline(&mut lines, number)?;
                    continue;
                }
                Some(_) => {
                    return Err(Error::UnexpectedLine {
                        line: number + 1,
                        content: raw.to_string(),
                    })
                }
            };

            let (old_used, new_used) = match op {
                Op::Context => (1, 1),
                Op::Delete => (1, 0),
                Op::Insert => (0, 1),
            };
            if old_used > old_left || new_used > new_left {
                return Err(Error::UnexpectedLine {
                    line: number + 1,
                    content: raw.to_string(),
                });
            }
            old_left -= old_used;
            new_left -= new_used;

            lines.push(Line {
                op,
                text: text.to_string(),
                no_newline: false,
            });
        }

        // A "\ No newline" marker can trail the last line of the hunk.
        if let Some((number, raw)) = self.lines.peek() {
            if raw.starts_with('\\') {
                let number = *number;
                self.lines.next();
                mark_no_newline(&mut lines, number)?;
            }
        }

        Ok(lines)
    }
}

fn mark_no_newline(lines: &mut Vec<Line>, number: usize) -> Result<(), Error> {
    match lines.last_mut() {
        Some(last) => {
            last.no_newline = true;
            Ok(())
        }
        None => Err(Error::UnexpectedLine {
            line: number + 1,
            content: String::from("\\ No newline at end of file"),
        }),
    }
}

impl<'a> Iterator for HunkReader<'a> {
    type Item = Result<Hunk, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (number, raw) = self.lines.next()?;

            // File headers and blank separators between hunks carry nothing we
            // need.
            if raw.is_empty()
                || raw.starts_with("--- ")
                || raw.starts_with("+++ ")
                || raw.starts_with("diff ")
                || raw.starts_with("Index: ")
            {
                continue;
            }

            let header = match Header::parse(raw) {
                Ok(header) => header,
                Err(error) => {
                    return Some(Err(Error::Header {
                        error,
                        line: number + 1,
                    }))
                }
            };

            return Some(self.read_body(&header, number).map(|lines| Hunk {
                old_start: header.old_start,
                old_len: header.old_len,
                new_start: header.new_start,
                new_len: header.new_len,
                lines,
            }));
        }
    }
}
