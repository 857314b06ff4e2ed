use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier the remote service assigns to an uploaded file.
pub type FileId = u64;

/// The persisted repo config: repo path → branch → relative path → file ID.
///
/// A `None` file ID means the file is known locally but hasn't been uploaded
/// yet.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RepoConfig {
    #[serde(default)]
    pub repos: BTreeMap<String, Repo>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Repo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default)]
    pub branches: BTreeMap<String, BTreeMap<String, Option<FileId>>>,

    // Keys written by other clients are carried through untouched, since the
    // whole file is rewritten on every change.
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_yaml::Value>,
}

impl RepoConfig {
    pub fn repo(&self, repo_path: &str) -> Option<&Repo> {
        self.repos.get(repo_path)
    }

    pub fn file_id(&self, repo_path: &str, branch: &str, rel_path: &str) -> Option<FileId> {
        self.repos
            .get(repo_path)
            .and_then(|repo| repo.branches.get(branch))
            .and_then(|files| files.get(rel_path))
            .copied()
            .flatten()
    }

    pub fn set_file_id(&mut self, repo_path: &str, branch: &str, rel_path: &str, id: FileId) {
        self.repos
            .entry(repo_path.to_string())
            .or_default()
            .branches
            .entry(branch.to_string())
            .or_default()
            .insert(rel_path.to_string(), Some(id));
    }

    /// Moves whatever is recorded for `old_rel_path` to `new_rel_path`,
    /// returning the file ID that moved.
    pub fn rename_file(
        &mut self,
        repo_path: &str,
        branch: &str,
        old_rel_path: &str,
        new_rel_path: &str,
    ) -> Option<FileId> {
        let files = self
            .repos
            .get_mut(repo_path)?
            .branches
            .get_mut(branch)?;

        let id = files.remove(old_rel_path)?;
        files.insert(new_rel_path.to_string(), id);
        id
    }

    /// Removes the entry for `rel_path`. Returns true if there was one.
    pub fn remove_file(&mut self, repo_path: &str, branch: &str, rel_path: &str) -> bool {
        self.repos
            .get_mut(repo_path)
            .and_then(|repo| repo.branches.get_mut(branch))
            .map(|files| files.remove(rel_path).is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = "
repos:
  /home/me/repo:
    id: 42
    email: me@example.com
    is_disconnected: false
    branches:
      main:
        src/lib.rs: 1001
        README.md: ~
";

    #[test]
    fn test_decode() -> anyhow::Result<()> {
        let config: RepoConfig = serde_yaml::from_str(CONFIG)?;

        let repo = config.repo("/home/me/repo").unwrap();
        assert_eq!(repo.id, Some(42));
        assert_eq!(repo.email.as_deref(), Some("me@example.com"));
        assert_eq!(
            repo.other.get("is_disconnected"),
            Some(&serde_yaml::Value::Bool(false))
        );

        assert_eq!(config.file_id("/home/me/repo", "main", "src/lib.rs"), Some(1001));
        assert_eq!(config.file_id("/home/me/repo", "main", "README.md"), None);
        assert_eq!(config.file_id("/home/me/repo", "dev", "src/lib.rs"), None);
        assert_eq!(config.file_id("/elsewhere", "main", "src/lib.rs"), None);

        Ok(())
    }

    #[test]
    fn test_unknown_keys_survive_round_trip() -> anyhow::Result<()> {
        let config: RepoConfig = serde_yaml::from_str(CONFIG)?;
        let again: RepoConfig = serde_yaml::from_str(&serde_yaml::to_string(&config)?)?;
        assert_eq!(config, again);

        Ok(())
    }

    #[test]
    fn test_mutations() -> anyhow::Result<()> {
        let mut config: RepoConfig = serde_yaml::from_str(CONFIG)?;

        config.set_file_id("/home/me/repo", "main", "new.txt", 7);
        assert_eq!(config.file_id("/home/me/repo", "main", "new.txt"), Some(7));

        assert_eq!(
            config.rename_file("/home/me/repo", "main", "src/lib.rs", "src/main.rs"),
            Some(1001)
        );
        assert_eq!(config.file_id("/home/me/repo", "main", "src/lib.rs"), None);
        assert_eq!(config.file_id("/home/me/repo", "main", "src/main.rs"), Some(1001));

        // Renaming something unknown changes nothing.
        assert_eq!(
            config.rename_file("/home/me/repo", "main", "nope", "still-nope"),
            None
        );
        assert!(!config.repos["/home/me/repo"].branches["main"].contains_key("still-nope"));

        assert!(config.remove_file("/home/me/repo", "main", "README.md"));
        assert!(!config.remove_file("/home/me/repo", "main", "README.md"));
        assert!(!config.remove_file("/elsewhere", "main", "README.md"));

        Ok(())
    }
}
