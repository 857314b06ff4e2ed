use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use crate::{Error, FileApi, FileMetadata, FileResponse, UploadTarget};

/// [`FileApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    host: String,
}

impl HttpApi {
    pub fn new(host: &str) -> Result<Self, Error> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            host: host.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }
}

#[async_trait]
impl FileApi for HttpApi {
    async fn create_file(&self, token: &str, metadata: &FileMetadata) -> Result<FileResponse, Error> {
        log::trace!("registering {} with the file service", metadata.file_path);

        Ok(self
            .client
            .post(self.url("/v1/files"))
            .header("authorization", format!("Basic {}", token))
            .json(metadata)
            .send()
            .await?
            .json()
            .await?)
    }

    async fn upload_content(&self, target: &UploadTarget, content: Vec<u8>) -> Result<(), Error> {
        let mut form = Form::new();
        for (key, value) in target.fields.iter() {
            form = form.text(key.clone(), value.clone());
        }
        // The object store requires the file to be the last field.
        form = form.part("file", Part::bytes(content).file_name("file"));

        self.client
            .post(&target.url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn health(&self) -> Result<serde_json::Value, Error> {
        Ok(self
            .client
            .get(self.url("/healthcheck"))
            .send()
            .await?
            .json()
            .await?)
    }
}
