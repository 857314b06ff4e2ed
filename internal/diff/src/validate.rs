//! Schema checks for diff records.
//!
//! Validation runs on the raw decoded document rather than on [`DiffRecord`],
//! so a record with missing keys is reported as such instead of as a decode
//! failure.

use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::DiffRecord;

/// Largest accepted `diff` payload, in bytes.
pub const DIFF_SIZE_LIMIT: usize = 16_000_000;

pub const REQUIRED_DIFF_KEYS: [&str; 6] = [
    "repo_path",
    "branch",
    "file_relative_path",
    "diff",
    "source",
    "created_at",
];

pub const REQUIRED_FILE_RENAME_DIFF_KEYS: [&str; 4] =
    ["old_abs_path", "new_abs_path", "old_rel_path", "new_rel_path"];

pub const REQUIRED_DIR_RENAME_DIFF_KEYS: [&str; 2] = ["old_path", "new_path"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Invalid {
    #[error("a record may carry only one kind flag")]
    ConflictingFlags,

    #[error("an edit record needs a non-empty diff")]
    EmptyDiff,

    #[error("missing key {0:?}")]
    MissingKey(&'static str),

    #[error("rename payload is missing key {0:?}")]
    MissingPayloadKey(&'static str),

    #[error("record is not a mapping")]
    NotAMapping,

    #[error("diff of {size} bytes exceeds the limit of {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("rename payload cannot be parsed")]
    UnparseablePayload,
}

/// Checks a decoded record document.
pub fn validate(raw: &Value) -> Result<(), Invalid> {
    let map = raw.as_mapping().ok_or(Invalid::NotAMapping)?;

    if let Some(key) = REQUIRED_DIFF_KEYS.iter().find(|key| !map.contains_key(**key)) {
        return Err(Invalid::MissingKey(*key));
    }

    let diff = map.get("diff").and_then(Value::as_str).unwrap_or("");
    let flags = [
        flag(map, "is_new_file"),
        flag(map, "is_rename"),
        flag(map, "is_dir_rename"),
        flag(map, "is_deleted"),
    ];

    validate_content(diff, flags)
}

pub fn is_valid_diff(raw: &Value) -> bool {
    validate(raw).is_ok()
}

impl DiffRecord {
    /// Checks a typed record, which by construction has every required key.
    pub fn validate(&self) -> Result<(), Invalid> {
        validate_content(&self.diff, self.flags())
    }
}

// flags are, in order: new file, rename, directory rename, deleted.
fn validate_content(diff: &str, flags: [bool; 4]) -> Result<(), Invalid> {
    if diff.len() > DIFF_SIZE_LIMIT {
        return Err(Invalid::TooLarge {
            size: diff.len(),
            max: DIFF_SIZE_LIMIT,
        });
    }

    let [is_new_file, is_rename, is_dir_rename, is_deleted] = flags;
    if flags.iter().filter(|set| **set).count() > 1 {
        return Err(Invalid::ConflictingFlags);
    }

    if is_rename || is_dir_rename {
        if diff.is_empty() {
            return Err(Invalid::UnparseablePayload);
        }
        let payload: Mapping =
            serde_yaml::from_str(diff).map_err(|_| Invalid::UnparseablePayload)?;

        let required: &[&'static str] = if is_rename {
            &REQUIRED_FILE_RENAME_DIFF_KEYS
        } else {
            &REQUIRED_DIR_RENAME_DIFF_KEYS
        };
        if let Some(key) = required.iter().find(|key| !payload.contains_key(**key)) {
            return Err(Invalid::MissingPayloadKey(*key));
        }
    } else if diff.is_empty() && !is_new_file && !is_deleted {
        return Err(Invalid::EmptyDiff);
    }

    Ok(())
}

fn flag(map: &Mapping, key: &str) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(false)
}
