use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot decode record {path}: {err}")]
    Decode {
        path: PathBuf,
        #[source]
        err: serde_yaml::Error,
    },

    #[error(transparent)]
    Encode(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("cannot determine the home directory; pass --root instead")]
    NoHomeDirectory,

    #[error("cannot replace {path}: {err}")]
    Persist {
        path: PathBuf,
        #[source]
        err: tempfile::PersistError,
    },
}

impl Error {
    pub(crate) fn decode<P: Into<PathBuf>>(path: P, err: serde_yaml::Error) -> Self {
        Self::Decode {
            path: path.into(),
            err,
        }
    }
}
