use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file service error: {0}")]
    Api(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("file service accepted the file without returning an ID")]
    MissingId,

    #[error(transparent)]
    Store(#[from] codesync_store::Error),
}
