use std::io;

use thiserror::Error;

use crate::Invalid;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid diff: {0}")]
    Invalid(#[from] Invalid),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("cannot find a free buffer file name after {0} attempts")]
    NameCollision(usize),

    #[error(transparent)]
    Store(#[from] codesync_store::Error),

    #[error(transparent)]
    Walk(#[from] walkdir::Error),
}
