//! `upload` reconciles buffered changes with the remote file service.
//!
//! The [`Reconciler`] follows an "upload, then record" rule: the repo config
//! only changes once the remote side has confirmed the change, so a failed
//! operation can simply be retried with the same buffered record.

use structopt::StructOpt;

mod api;
pub use api::{FileApi, FileMetadata, FileResponse, UploadTarget};

mod error;
pub use error::Error;

mod http;
pub use http::HttpApi;

mod reconciler;
pub use reconciler::{NewFile, Reconciler, CONNECTION_ERROR_MESSAGE};

// Command line options that are required by the [`HttpApi`].
//
// These should be injected into the global `StructOpt` implementation using the
// `flatten` attribute.
#[derive(Clone, Debug, StructOpt)]
pub struct Opt {
    #[structopt(
        long,
        env = "CODESYNC_API_HOST",
        default_value = "https://api.codesync.com",
        help = "base URL of the remote file service"
    )]
    pub api_host: String,
}

impl Opt {
    pub fn api(&self) -> Result<HttpApi, Error> {
        HttpApi::new(&self.api_host)
    }
}
