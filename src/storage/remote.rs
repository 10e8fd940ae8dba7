//! HTTP object-store backend.
//!
//! Speaks the Supabase storage REST layout:
//!
//! | Operation | Request |
//! |---|---|
//! | put | `POST {endpoint}/storage/v1/object/{bucket}/{key}` with `x-upsert: true` |
//! | get | `GET {endpoint}/storage/v1/object/{bucket}/{key}` |
//! | delete | `DELETE {endpoint}/storage/v1/object/{bucket}` with `{"prefixes": [key]}` |
//!
//! Key segments are percent-encoded into the path, so a key can never
//! add a query string or fragment to the request.
//!
//! Uses the blocking client: batch workers are plain rayon threads with no
//! async runtime.

use super::{Storage, check_key};
use crate::config::RemoteStorageConfig;
use crate::error::{PipelineError, Result};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RemoteStore {
    client: Client,
    endpoint: Url,
    bucket: String,
    token: Option<String>,
}

impl RemoteStore {
    pub fn new(config: &RemoteStorageConfig) -> Result<Self> {
        Self::with_timeout(config, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(config: &RemoteStorageConfig, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| PipelineError::invalid("storage.endpoint", e.to_string()))?;
        if endpoint.cannot_be_a_base() {
            return Err(PipelineError::invalid(
                "storage.endpoint",
                "must be an http(s) base URL",
            ));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::StorageReadFailure(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            bucket: config.bucket.clone(),
            token: config.token(),
        })
    }

    /// `{endpoint}/storage/v1/object/{bucket}` followed by `segments`, each
    /// one percent-encoded.
    fn url<'a>(
        &self,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> std::result::Result<Url, String> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| format!("endpoint cannot be a base: {}", self.endpoint))?
            .pop_if_empty()
            .extend(["storage", "v1", "object", self.bucket.as_str()])
            .extend(segments);
        Ok(url)
    }

    fn object_url(&self, key: &str) -> std::result::Result<Url, String> {
        self.url(key.split('/'))
    }

    fn bucket_url(&self) -> std::result::Result<Url, String> {
        self.url([])
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

fn describe(status: StatusCode, body: String) -> String {
    if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    }
}

impl Storage for RemoteStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        check_key(key).map_err(PipelineError::StorageWriteFailure)?;
        let url = self.object_url(key).map_err(PipelineError::StorageWriteFailure)?;
        debug!(key, bytes = bytes.len(), "remote put");
        let response = self
            .authorized(self.client.post(url))
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .map_err(|e| PipelineError::StorageWriteFailure(format!("{key}: {e}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(key.to_string())
        } else {
            let body = response.text().unwrap_or_default();
            Err(PipelineError::StorageWriteFailure(format!(
                "{key}: {}",
                describe(status, body)
            )))
        }
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        check_key(key).map_err(PipelineError::StorageReadFailure)?;
        let url = self.object_url(key).map_err(PipelineError::StorageReadFailure)?;
        debug!(key, "remote get");
        let response = self
            .authorized(self.client.get(url))
            .send()
            .map_err(|e| PipelineError::StorageReadFailure(format!("{key}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PipelineError::NotFound(key.to_string()));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            // Supabase reports a missing object as 400 with a JSON body.
            if status == StatusCode::BAD_REQUEST && body.to_ascii_lowercase().contains("not found") {
                return Err(PipelineError::NotFound(key.to_string()));
            }
            return Err(PipelineError::StorageReadFailure(format!(
                "{key}: {}",
                describe(status, body)
            )));
        }
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| PipelineError::StorageReadFailure(format!("{key}: {e}")))
    }

    fn delete(&self, key: &str) -> Result<()> {
        check_key(key).map_err(PipelineError::StorageWriteFailure)?;
        let url = self.bucket_url().map_err(PipelineError::StorageWriteFailure)?;
        debug!(key, "remote delete");
        let response = self
            .authorized(self.client.delete(url))
            .json(&serde_json::json!({ "prefixes": [key] }))
            .send()
            .map_err(|e| PipelineError::StorageWriteFailure(format!("{key}: {e}")))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            let body = response.text().unwrap_or_default();
            Err(PipelineError::StorageWriteFailure(format!(
                "{key}: {}",
                describe(status, body)
            )))
        }
    }
}
