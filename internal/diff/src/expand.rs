//! Expansion of directory events into per-file records.
//!
//! Neither expansion sorts what it finds: records come out in walk order.

use std::{
    fs,
    path::{Path, PathBuf},
};

use codesync_store::{rel_path_string, Paths, Tree};
use walkdir::WalkDir;

use crate::{DiffBuffer, DiffKind, DirRenamePayload, Error, RenamePayload};

/// Emits one file rename record for every file now under `payload.new_path`.
///
/// The old location of each file is found by swapping the new directory
/// prefix for the old one. Returns the paths of the records written.
pub fn expand_dir_rename(
    buffer: &DiffBuffer,
    repo_path: &str,
    branch: &str,
    payload: &DirRenamePayload,
) -> Result<Vec<PathBuf>, Error> {
    let new_dir = Path::new(&payload.new_path);
    let old_dir = Path::new(&payload.old_path);
    if !new_dir.is_dir() {
        log::debug!("{} is not a directory; nothing to expand", new_dir.display());
        return Ok(Vec::new());
    }

    let mut written = Vec::new();
    for entry in WalkDir::new(new_dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let new_abs = entry.path();
        let old_abs = match new_abs.strip_prefix(new_dir) {
            Ok(suffix) => old_dir.join(suffix),
            Err(_) => continue,
        };
        let (old_rel, new_rel) = match (
            old_abs.strip_prefix(repo_path),
            new_abs.strip_prefix(repo_path),
        ) {
            (Ok(old_rel), Ok(new_rel)) => (rel_path_string(old_rel), rel_path_string(new_rel)),
            _ => {
                log::warn!(
                    "{} is outside of repo {}; skipping",
                    new_abs.display(),
                    repo_path
                );
                continue;
            }
        };

        let diff = serde_json::to_string(&RenamePayload {
            old_rel_path: old_rel,
            new_rel_path: new_rel.clone(),
            old_abs_path: old_abs.to_string_lossy().into_owned(),
            new_abs_path: new_abs.to_string_lossy().into_owned(),
        })?;
        if let Some(path) = buffer.manage_diff(repo_path, branch, &new_rel, &diff, DiffKind::Rename)? {
            written.push(path);
        }
    }

    Ok(written)
}

/// Archives every file of a deleted directory and emits a delete record for
/// each one.
///
/// Members are found in the shadow tree, since the directory itself is gone.
/// A file already present in the deleted tree was handled by an earlier run
/// and is skipped, so running this twice doesn't duplicate anything.
pub fn expand_dir_delete(
    buffer: &DiffBuffer,
    paths: &Paths,
    repo_path: &str,
    branch: &str,
    rel_path: &str,
) -> Result<Vec<PathBuf>, Error> {
    let shadow_root = paths.mirror_root(Tree::Shadow, repo_path, branch);
    let shadow_dir = paths.mirror(Tree::Shadow, repo_path, branch, rel_path);
    if !shadow_dir.is_dir() {
        log::debug!("{} is not in the shadow tree; nothing to expand", rel_path);
        return Ok(Vec::new());
    }

    let mut written = Vec::new();
    for entry in WalkDir::new(&shadow_dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let file_rel = match entry.path().strip_prefix(&shadow_root) {
            Ok(rel) => rel_path_string(rel),
            Err(_) => continue,
        };
        let archived = paths.mirror(Tree::Deleted, repo_path, branch, &file_rel);
        if archived.exists() {
            log::trace!("{} is already archived", file_rel);
            continue;
        }

        // The archived copy marks the file as handled, so it must only exist
        // once the record does.
        let record = buffer.manage_diff(repo_path, branch, &file_rel, "", DiffKind::Deleted)?;
        if let Err(e) = archive(entry.path(), &archived) {
            if let Some(path) = record.as_ref() {
                buffer.remove(path)?;
            }
            return Err(e.into());
        }
        written.extend(record);
    }

    Ok(written)
}

fn archive(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to).map(|_| ())
}
