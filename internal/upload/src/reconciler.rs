use std::{fs, io, path::Path, sync::Arc};

use codesync_diff::DiffRecord;
use codesync_logger::{Connector, Shipper};
use codesync_store::{is_binary_file, ConfigHandle, FileId, Paths, Tree};
use line_patch::{Patch, Text};

use crate::{Error, FileApi, FileMetadata};

pub const CONNECTION_ERROR_MESSAGE: &str = "Failed to connect to the CodeSync servers";

/// Outcome of [`Reconciler::handle_new_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewFile {
    /// There was no pristine copy left to upload.
    Skipped,
    Uploaded(FileId),
    /// The upload failed and was reported; the record stays buffered.
    Deferred,
}

/// Applies buffered records to the remote file service and the repo config.
pub struct Reconciler<A, C>
where
    A: FileApi,
    C: Connector,
{
    api: A,
    paths: Paths,
    config: ConfigHandle,
    shipper: Arc<Shipper<C>>,
}

impl<A, C> Reconciler<A, C>
where
    A: FileApi,
    C: Connector,
{
    pub fn new(api: A, paths: Paths, config: ConfigHandle, shipper: Arc<Shipper<C>>) -> Self {
        Self {
            api,
            paths,
            config,
            shipper,
        }
    }

    /// Uploads the pristine copy of a new file and records its ID.
    ///
    /// Nothing local changes unless the upload succeeds. On success the
    /// pristine copy and the buffered record at `record_path` are removed.
    pub async fn handle_new_file(
        &self,
        token: &str,
        record: &DiffRecord,
        repo_id: u64,
        record_path: &Path,
    ) -> Result<NewFile, Error> {
        let rel_path = record.file_relative_path.as_str();
        let original = self
            .paths
            .mirror(Tree::Originals, &record.repo_path, &record.branch, rel_path);
        if !original.is_file() {
            log::debug!("no pristine copy of {}; already uploaded", rel_path);
            return Ok(NewFile::Skipped);
        }

        let id = match self.upload(token, record, repo_id, &original).await {
            Ok(id) => id,
            Err(e) => {
                self.shipper
                    .put_log_event(&format!("Error uploading new file to server: {}", e), None)
                    .await;
                return Ok(NewFile::Deferred);
            }
        };

        self.config
            .update(|config| config.set_file_id(&record.repo_path, &record.branch, rel_path, id))
            .await?;
        remove_if_exists(&original)?;
        remove_if_exists(record_path)?;

        log::info!("uploaded {} as file {}", rel_path, id);
        Ok(NewFile::Uploaded(id))
    }

    async fn upload(
        &self,
        token: &str,
        record: &DiffRecord,
        repo_id: u64,
        original: &Path,
    ) -> Result<FileId, Error> {
        let size = fs::metadata(original)?.len();
        let metadata = FileMetadata {
            repo_id,
            branch: record.branch.clone(),
            is_binary: is_binary_file(original)?,
            size,
            file_path: record.file_relative_path.clone(),
            created_at: record.created_at.clone(),
        };

        let resp = self.api.create_file(token, &metadata).await?;
        if let Some(error) = resp.error {
            return Err(Error::Api(error));
        }
        if let (true, Some(target)) = (size > 0, resp.url.as_ref()) {
            let content = tokio::fs::read(original).await?;
            self.api.upload_content(target, content).await?;
        }

        resp.id.ok_or(Error::MissingId)
    }

    /// Moves a renamed file's shadow copy and its config entry. Returns the
    /// file ID now recorded under `new_rel_path`.
    pub async fn handle_rename(
        &self,
        repo_path: &str,
        branch: &str,
        old_rel_path: &str,
        new_rel_path: &str,
    ) -> Result<Option<FileId>, Error> {
        let old_shadow = self.paths.mirror(Tree::Shadow, repo_path, branch, old_rel_path);
        let new_shadow = self.paths.mirror(Tree::Shadow, repo_path, branch, new_rel_path);
        if old_shadow.exists() {
            if let Some(parent) = new_shadow.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(&old_shadow, &new_shadow)?;
        }

        Ok(self
            .config
            .update(|config| config.rename_file(repo_path, branch, old_rel_path, new_rel_path))
            .await?)
    }

    /// Captures a patch that restores a deleted file, then forgets the file.
    ///
    /// The patch is empty when there's no text to capture. The mirrors and
    /// the config entry are cleaned up either way, but only once the patch
    /// has been built: an error before then leaves everything in place.
    pub async fn handle_delete(
        &self,
        repo_path: &str,
        branch: &str,
        rel_path: &str,
    ) -> Result<String, Error> {
        let shadow = self.paths.mirror(Tree::Shadow, repo_path, branch, rel_path);
        let diff = deletion_diff(&shadow)?;

        for tree in [Tree::Shadow, Tree::Originals, Tree::Deleted].iter() {
            remove_if_exists(self.paths.mirror(*tree, repo_path, branch, rel_path))?;
        }
        self.config
            .update(|config| config.remove_file(repo_path, branch, rel_path))
            .await?;

        Ok(diff)
    }

    /// Probes the health endpoint. A failed request is reported through the
    /// log shipper.
    pub async fn is_server_down(&self) -> bool {
        match self.api.health().await {
            Ok(body) => !body.get("status").map(is_truthy).unwrap_or(false),
            Err(e) => {
                log::debug!("health check failed: {}", e);
                self.shipper
                    .put_log_event(CONNECTION_ERROR_MESSAGE, None)
                    .await;
                true
            }
        }
    }
}

fn deletion_diff(shadow: &Path) -> Result<String, Error> {
    if !shadow.is_file() {
        log::debug!("{} has no shadow copy", shadow.display());
        return Ok(String::new());
    }
    if is_binary_file(shadow)? {
        log::debug!("{} is binary; not capturing its content", shadow.display());
        return Ok(String::new());
    }

    // Binary detection only samples the head of the file, so invalid UTF-8
    // can still turn up further in.
    let content = fs::read(shadow)?;
    Ok(Patch::deletion(&Text::new(&String::from_utf8_lossy(&content))).to_string())
}

fn is_truthy(value: &serde_json::Value) -> bool {
    use serde_json::Value;

    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn remove_if_exists<P: AsRef<Path>>(path: P) -> io::Result<()> {
    match fs::remove_file(path.as_ref()) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
