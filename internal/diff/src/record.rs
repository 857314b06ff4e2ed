use serde::{Deserialize, Deserializer, Serialize};

/// The kind of change a record describes. A record carries at most one kind
/// flag; none at all means a plain content edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    Edit,
    NewFile,
    Rename,
    DirRename,
    Deleted,
}

/// One buffered change event.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DiffRecord {
    pub source: String,
    pub created_at: String,
    /// New file and delete records may carry a null diff.
    #[serde(deserialize_with = "null_as_empty")]
    pub diff: String,
    pub repo_path: String,
    pub branch: String,
    pub file_relative_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_new_file: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_rename: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dir_rename: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<bool>,
}

impl DiffRecord {
    pub fn new(
        source: &str,
        created_at: String,
        repo_path: &str,
        branch: &str,
        rel_path: &str,
        diff: &str,
        kind: DiffKind,
    ) -> Self {
        let flag = |want: DiffKind| if kind == want { Some(true) } else { None };

        Self {
            source: source.to_string(),
            created_at,
            diff: diff.to_string(),
            repo_path: repo_path.to_string(),
            branch: branch.to_string(),
            file_relative_path: rel_path.to_string(),
            is_new_file: flag(DiffKind::NewFile),
            is_rename: flag(DiffKind::Rename),
            is_dir_rename: flag(DiffKind::DirRename),
            is_deleted: flag(DiffKind::Deleted),
        }
    }

    pub fn kind(&self) -> DiffKind {
        let set = |flag: Option<bool>| flag.unwrap_or(false);

        if set(self.is_new_file) {
            DiffKind::NewFile
        } else if set(self.is_rename) {
            DiffKind::Rename
        } else if set(self.is_dir_rename) {
            DiffKind::DirRename
        } else if set(self.is_deleted) {
            DiffKind::Deleted
        } else {
            DiffKind::Edit
        }
    }

    pub(crate) fn flags(&self) -> [bool; 4] {
        [
            self.is_new_file.unwrap_or(false),
            self.is_rename.unwrap_or(false),
            self.is_dir_rename.unwrap_or(false),
            self.is_deleted.unwrap_or(false),
        ]
    }

    /// Decodes the rename descriptor carried in `diff`.
    pub fn rename_payload(&self) -> Result<RenamePayload, serde_json::Error> {
        serde_json::from_str(&self.diff)
    }

    /// Decodes the directory rename descriptor carried in `diff`.
    pub fn dir_rename_payload(&self) -> Result<DirRenamePayload, serde_json::Error> {
        serde_json::from_str(&self.diff)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Payload of a file rename record.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RenamePayload {
    pub old_rel_path: String,
    pub new_rel_path: String,
    pub old_abs_path: String,
    pub new_abs_path: String,
}

/// Payload of a directory rename record; both paths are absolute.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DirRenamePayload {
    pub old_path: String,
    pub new_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_flags() {
        for kind in [
            DiffKind::Edit,
            DiffKind::NewFile,
            DiffKind::Rename,
            DiffKind::DirRename,
            DiffKind::Deleted,
        ]
        .iter()
        {
            let record = DiffRecord::new("cli", "now".into(), "/r", "main", "f", "x", *kind);
            assert_eq!(record.kind(), *kind);
            assert!(record.flags().iter().filter(|flag| **flag).count() <= 1);
        }
    }

    #[test]
    fn test_encoding_omits_unset_flags() -> anyhow::Result<()> {
        let record = DiffRecord::new(
            "cli",
            "2024-01-02 03:04:05".into(),
            "/home/me/repo",
            "main",
            "src/lib.rs",
            "",
            DiffKind::Deleted,
        );

        let encoded = serde_yaml::to_string(&record)?;
        assert!(encoded.contains("is_deleted: true"));
        assert!(!encoded.contains("is_new_file"));
        assert!(!encoded.contains("is_rename"));

        let decoded: DiffRecord = serde_yaml::from_str(&encoded)?;
        assert_eq!(decoded, record);

        Ok(())
    }

    #[test]
    fn test_null_diff() -> anyhow::Result<()> {
        let decoded: DiffRecord = serde_yaml::from_str(
            "source: cli\ncreated_at: now\ndiff: ~\nrepo_path: /r\nbranch: main\nfile_relative_path: f\nis_new_file: true\n",
        )?;
        assert_eq!(decoded.diff, "");
        assert_eq!(decoded.kind(), DiffKind::NewFile);

        Ok(())
    }
}
