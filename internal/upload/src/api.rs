use std::collections::BTreeMap;

use async_trait::async_trait;
use codesync_store::FileId;
use serde::{Deserialize, Serialize};

use crate::Error;

/// What the file service is told about a new file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
    pub repo_id: u64,
    pub branch: String,
    pub is_binary: bool,
    pub size: u64,
    pub file_path: String,
    pub created_at: String,
}

/// A presigned form upload: post `fields` followed by the file to `url`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadTarget {
    pub url: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileResponse {
    #[serde(default)]
    pub id: Option<FileId>,

    /// Where to send the content, if the service wants it.
    #[serde(default)]
    pub url: Option<UploadTarget>,

    #[serde(default)]
    pub error: Option<String>,
}

/// The remote file service.
#[async_trait]
pub trait FileApi: Send + Sync {
    /// Registers a new file, authenticating with `token`.
    async fn create_file(&self, token: &str, metadata: &FileMetadata) -> Result<FileResponse, Error>;

    async fn upload_content(&self, target: &UploadTarget, content: Vec<u8>) -> Result<(), Error>;

    /// Fetches the JSON body of the health endpoint.
    async fn health(&self) -> Result<serde_json::Value, Error>;
}
