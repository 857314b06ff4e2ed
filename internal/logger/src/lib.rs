//! `logger` ships diagnostic messages to the remote log service.
//!
//! Every signed-in identity writes to its own log stream, named after its
//! email, inside a shared log group. The stream hands out a sequence token
//! with each accepted batch that must accompany the next one; [`Shipper`]
//! keeps those tokens in the store and recovers when they go stale.

use structopt::StructOpt;

mod error;
pub use error::{Error, PutError};

mod http;
pub use http::{HttpConnector, HttpSink};

mod shipper;
pub use shipper::{Settings, Shipper};

mod sink;
pub use sink::{Connector, Credentials, LogEvent, LogSink};

// Command line options that are required by the [`Shipper`].
//
// These should be injected into the global `StructOpt` implementation using the
// `flatten` attribute.
#[derive(Clone, Debug, StructOpt)]
pub struct Opt {
    #[structopt(
        long,
        env = "CODESYNC_LOG_ENDPOINT",
        default_value = "https://logs.us-east-1.amazonaws.com",
        help = "remote log service endpoint"
    )]
    pub log_endpoint: String,

    #[structopt(
        long,
        env = "CODESYNC_LOG_GROUP",
        default_value = "client",
        help = "log group that every stream is written to"
    )]
    pub log_group: String,
}

impl Opt {
    pub fn connector(&self) -> HttpConnector {
        HttpConnector::new(&self.log_endpoint)
    }

    pub fn settings(&self, source: &str) -> Settings {
        Settings {
            log_group: self.log_group.clone(),
            source: source.to_string(),
        }
    }
}
