use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::{record, Error};

/// A signed-in identity, as persisted in the user table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct User {
    #[serde(default)]
    pub access_key: String,

    #[serde(default)]
    pub secret_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl User {
    /// Whether the user carries the credentials needed to ship logs.
    pub fn has_credentials(&self) -> bool {
        !self.access_key.is_empty() && !self.secret_key.is_empty()
    }
}

/// The persisted user table, keyed by email.
///
/// The table is ordered by email, which makes [`UserTable::first`]
/// deterministic no matter how the file on disk happens to be laid out.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct UserTable(BTreeMap<String, User>);

impl UserTable {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        record::read_or_default(path)
    }

    pub fn get(&self, email: &str) -> Option<&User> {
        self.0.get(email)
    }

    pub fn first(&self) -> Option<(&str, &User)> {
        self.0.iter().next().map(|(email, user)| (email.as_str(), user))
    }

    pub fn insert(&mut self, email: &str, user: User) {
        self.0.insert(email.to_string(), user);
    }

    /// Resolves the identity to act as: `hint` if it names a known user,
    /// otherwise the first user in the table.
    pub fn resolve(&self, hint: Option<&str>) -> Option<(&str, &User)> {
        match hint.and_then(|email| self.0.get_key_value(email)) {
            Some((email, user)) => Some((email.as_str(), user)),
            None => self.first(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() -> anyhow::Result<()> {
        let table: UserTable = serde_yaml::from_str(
            "
zed@example.com:
  access_key: zk
  secret_key: zs
amy@example.com:
  access_key: ak
  secret_key: as
  access_token: tok
",
        )?;

        let (email, user) = table.resolve(Some("zed@example.com")).unwrap();
        assert_eq!(email, "zed@example.com");
        assert_eq!(user.access_key, "zk");

        // Unknown or absent hints fall back to the first email in order.
        assert_eq!(table.resolve(Some("who@example.com")).unwrap().0, "amy@example.com");
        assert_eq!(table.resolve(None).unwrap().0, "amy@example.com");

        assert!(UserTable::default().resolve(None).is_none());

        Ok(())
    }

    #[test]
    fn test_has_credentials() {
        let mut user = User {
            access_key: "ak".into(),
            ..User::default()
        };
        assert!(!user.has_credentials());

        user.secret_key = "sk".into();
        assert!(user.has_credentials());
    }
}
