//! `diff` turns detected file changes into buffered diff records.
//!
//! Each change becomes one YAML file in the diff buffer directory. The buffer
//! is append-only from this side: the uploader consumes records and removes
//! them once they've been handled.

use structopt::StructOpt;

mod buffer;
pub use buffer::{DiffBuffer, DATETIME_FORMAT};

mod error;
pub use error::Error;

mod expand;
pub use expand::{expand_dir_delete, expand_dir_rename};

mod record;
pub use record::{DiffKind, DiffRecord, DirRenamePayload, RenamePayload};

pub mod validate;
pub use validate::{is_valid_diff, Invalid};

// Command line options that are required by the [`DiffBuffer`].
//
// These should be injected into the global `StructOpt` implementation using the
// `flatten` attribute.
#[derive(Clone, Debug, StructOpt)]
pub struct Opt {
    #[structopt(
        long,
        env = "CODESYNC_SOURCE",
        default_value = "cli",
        help = "origin tag stamped on every diff record and shipped log event"
    )]
    pub source: String,
}
