use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot build log client: {0}")]
    Client(#[source] reqwest::Error),

    #[error(transparent)]
    Put(#[from] PutError),

    #[error(transparent)]
    Store(#[from] codesync_store::Error),
}

/// A failed `put_log_events` call.
#[derive(Debug, Error)]
pub enum PutError {
    /// The batch was accepted before, under a different token.
    #[error("log events already accepted: {message}")]
    DataAlreadyAccepted {
        expected_sequence_token: Option<String>,
        message: String,
    },

    /// The token sent doesn't match what the stream expects next.
    #[error("invalid sequence token: {message}")]
    InvalidSequenceToken {
        expected_sequence_token: Option<String>,
        message: String,
    },

    #[error("log service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl PutError {
    /// Whether this is a sequence token mismatch that a retry can fix.
    pub fn is_token_mismatch(&self) -> bool {
        matches!(
            self,
            Self::DataAlreadyAccepted { .. } | Self::InvalidSequenceToken { .. }
        )
    }

    /// The token the stream expects next, if this is a token mismatch.
    ///
    /// The structured field wins. Failing that, the last run of digits in the
    /// message is used; a message without one means the stream expects no
    /// token.
    pub fn expected_sequence_token(&self) -> Option<String> {
        let (expected, message) = match self {
            Self::DataAlreadyAccepted {
                expected_sequence_token,
                message,
            }
            | Self::InvalidSequenceToken {
                expected_sequence_token,
                message,
            } => (expected_sequence_token, message),
            _ => return None,
        };

        if let Some(token) = expected.as_ref().filter(|token| !token.is_empty()) {
            return Some(token.clone());
        }

        DIGITS
            .find_iter(message)
            .last()
            .map(|found| found.as_str().to_string())
    }
}
