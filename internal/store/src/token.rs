use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Last sequence token accepted by the remote log stream, per email.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SequenceTokenTable(BTreeMap<String, Option<String>>);

impl SequenceTokenTable {
    pub fn get(&self, email: &str) -> Option<&str> {
        self.0
            .get(email)
            .and_then(|token| token.as_deref())
            .filter(|token| !token.is_empty())
    }

    /// Records the token to send next for `email`. `None` means the stream
    /// expects no token at all.
    pub fn set(&mut self, email: &str, token: Option<String>) {
        self.0.insert(email.to_string(), token);
    }
}
