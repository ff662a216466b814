use std::{path::Path, time::Duration};

use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{
    config::UploadConfig,
    db::Reading,
    error::{Result, SensingError},
};

/// One element of the `POST /v1/reading/batch` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub sensor_type: String,
    pub data: String,
    /// Milliseconds since the epoch, as a decimal string.
    pub timestamp: String,
    pub local_id: String,
}

impl From<&Reading> for BatchItem {
    fn from(reading: &Reading) -> Self {
        Self {
            sensor_type: reading.sensor_name.clone(),
            data: reading.payload.clone(),
            timestamp: reading.timestamp.to_string(),
            local_id: reading.local_id.clone(),
        }
    }
}

/// Backend acknowledgement for one stored reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAck {
    pub id: i64,
    pub data: String,
    #[serde(default)]
    pub local_id: Option<String>,
}

#[async_trait]
pub trait ReadingBackend: Send + Sync {
    async fn post_batch(&self, token: &str, items: &[BatchItem]) -> Result<Vec<BatchAck>>;

    async fn post_file(&self, token: &str, backend_id: i64, path: &Path, mime: &str)
        -> Result<()>;
}

/// Bearer token provider owned by the host's auth layer.
pub trait AuthTokenSource: Send + Sync {
    fn current(&self) -> Option<String>;
}

/// Fixed token, for hosts that configure one up front.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl AuthTokenSource for StaticToken {
    fn current(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.clone())
        }
    }
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &UploadConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|err| SensingError::Fatal(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn check_status(status: StatusCode, what: &str) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(SensingError::Transient(format!("{what} rejected with {status}")))
    }
}

#[async_trait]
impl ReadingBackend for HttpBackend {
    async fn post_batch(&self, token: &str, items: &[BatchItem]) -> Result<Vec<BatchAck>> {
        let response = self
            .client
            .post(self.url("/v1/reading/batch"))
            .bearer_auth(token)
            .json(items)
            .send()
            .await?;

        check_status(response.status(), "reading batch")?;
        Ok(response.json::<Vec<BatchAck>>().await?)
    }

    async fn post_file(
        &self,
        token: &str,
        backend_id: i64,
        path: &Path,
        mime: &str,
    ) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|err| SensingError::Transient(format!("bad mime type '{mime}': {err}")))?;

        let response = self
            .client
            .post(self.url(&format!("/v1/reading/{backend_id}/file")))
            .bearer_auth(token)
            .multipart(multipart::Form::new().part("file", part))
            .send()
            .await?;

        check_status(response.status(), "file upload")
    }
}
