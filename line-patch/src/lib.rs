//! Line-level patches in unified diff format.
//!
//! The main producer is [`Patch::deletion`], which records a file's entire
//! content as removed. Applied in reverse to empty content, such a patch
//! restores the file, which is how deleted files can be brought back later.

use std::fmt::{self, Display, Write};

use thiserror::Error;

mod header;
mod parse;

const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// Text split into lines, remembering whether the final line ended with a
/// newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    lines: Vec<String>,
    trailing_newline: bool,
}

impl Text {
    pub fn new(content: &str) -> Self {
        // str::lines() would be enough if it didn't throw away whether the
        // last line had a newline, so walk the content by hand.
        let mut lines = Vec::new();
        let mut rest = content;
        let mut trailing_newline = true;

        while !rest.is_empty() {
            match rest.find('\n') {
                Some(end) => {
                    lines.push(rest[..end].to_string());
                    rest = &rest[end + 1..];
                }
                None => {
                    lines.push(rest.to_string());
                    trailing_newline = false;
                    break;
                }
            }
        }

        Self {
            lines,
            trailing_newline,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join("\n"))?;
        if self.trailing_newline && !self.lines.is_empty() {
            f.write_char('\n')?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Context,
    Delete,
    Insert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub op: Op,
    pub text: String,
    /// Set when this line is the last in its file and has no newline.
    pub no_newline: bool,
}

/// A single `@@` hunk. Starts are 1-indexed; a zero length range starts at
/// the line the hunk is inserted after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<Line>,
}

impl Hunk {
    fn reversed(&self) -> Self {
        Self {
            old_start: self.new_start,
            old_len: self.new_len,
            new_start: self.old_start,
            new_len: self.old_len,
            lines: self
                .lines
                .iter()
                .map(|line| Line {
                    op: match line.op {
                        Op::Context => Op::Context,
                        Op::Delete => Op::Insert,
                        Op::Insert => Op::Delete,
                    },
                    text: line.text.clone(),
                    no_newline: line.no_newline,
                })
                .collect(),
        }
    }

    // Whether the last line on the new side of the hunk lacks a newline.
    fn new_side_missing_newline(&self) -> bool {
        self.lines
            .iter()
            .rev()
            .find(|line| line.op != Op::Delete)
            .map(|line| line.no_newline)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    hunks: Vec<Hunk>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("hunk starting at line {start} is out of range")]
    OutOfRange { start: usize },

    #[error("line {line} does not match the patch: expected {want:?}")]
    Mismatch { line: usize, want: String },

    #[error(transparent)]
    Parse(#[from] parse::Error),
}

impl Patch {
    /// Builds the patch that removes every line of `text`.
    pub fn deletion(text: &Text) -> Self {
        if text.is_empty() {
            return Self::default();
        }

        let last = text.lines.len() - 1;
        Self {
            hunks: vec![Hunk {
                old_start: 1,
                old_len: text.lines.len(),
                new_start: 0,
                new_len: 0,
                lines: text
                    .lines
                    .iter()
                    .enumerate()
                    .map(|(i, line)| Line {
                        op: Op::Delete,
                        text: line.clone(),
                        no_newline: i == last && !text.trailing_newline,
                    })
                    .collect(),
            }],
        }
    }

    /// Parses unified patch text.
    pub fn parse(text: &str) -> Result<Self, Error> {
        Ok(Self {
            hunks: parse::HunkReader::new(text).collect::<Result<Vec<Hunk>, parse::Error>>()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// Returns the patch that undoes this one.
    pub fn reverse(&self) -> Self {
        Self {
            hunks: self.hunks.iter().map(Hunk::reversed).collect(),
        }
    }

    pub fn apply(&self, text: &Text) -> Result<Text, Error> {
        let old = &text.lines;
        let mut output = Vec::with_capacity(old.len());
        let mut trailing_newline = text.trailing_newline;
        let mut pos = 0;

        for hunk in self.hunks.iter() {
            let start = match (hunk.old_start, hunk.old_len) {
                (start, 0) => start,
                (0, _) => return Err(Error::OutOfRange { start: 0 }),
                (start, _) => start - 1,
            };
            if start < pos || start + hunk.old_len > old.len() {
                return Err(Error::OutOfRange {
                    start: hunk.old_start,
                });
            }

            output.extend(old[pos..start].iter().cloned());
            pos = start;

            for line in hunk.lines.iter() {
                if line.op != Op::Insert {
                    match old.get(pos) {
                        Some(have) if have == &line.text => {}
                        _ => {
                            return Err(Error::Mismatch {
                                line: pos + 1,
                                want: line.text.clone(),
                            })
                        }
                    }
                    pos += 1;
                }
                if line.op != Op::Delete {
                    output.push(line.text.clone());
                }
            }

            if pos == old.len() {
                trailing_newline = !hunk.new_side_missing_newline();
            }
        }
        output.extend(old[pos..].iter().cloned());

        Ok(Text {
            lines: output,
            trailing_newline,
        })
    }

    pub fn apply_reverse(&self, text: &Text) -> Result<Text, Error> {
        self.reverse().apply(text)
    }
}

impl Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for hunk in self.hunks.iter() {
            writeln!(
                f,
                "@@ -{},{} +{},{} @@",
                hunk.old_start, hunk.old_len, hunk.new_start, hunk.new_len
            )?;
            for line in hunk.lines.iter() {
                let prefix = match line.op {
                    Op::Context => ' ',
                    Op::Delete => '-',
                    Op::Insert => '+',
                };
                writeln!(f, "{}{}", prefix, line.text)?;
                if line.no_newline {
                    writeln!(f, "{}", NO_NEWLINE_MARKER)?;
                }
            }
        }
        Ok(())
    }
}
