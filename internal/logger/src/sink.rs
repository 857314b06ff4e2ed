use async_trait::async_trait;
use serde::Serialize;

use crate::{Error, PutError};

/// Credentials of one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub message: String,
}

/// A client for the remote log service, bound to one identity.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Appends `events` to `stream` in `group`.
    ///
    /// On success, returns the token the stream expects with the next batch.
    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        events: &[LogEvent],
        sequence_token: Option<&str>,
    ) -> Result<Option<String>, PutError>;
}

/// Builds [`LogSink`]s for identities.
pub trait Connector: Send + Sync {
    type Sink: LogSink;

    fn connect(&self, credentials: &Credentials) -> Result<Self::Sink, Error>;
}
