//! Object storage for uploaded documents.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;

use crate::error::StorageError;
use crate::locator::StorageLocator;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        locator: &StorageLocator,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// Media upload through the Cloud Storage JSON API.
#[derive(Clone)]
pub struct GcsObjectStore {
    endpoint: String,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

impl GcsObjectStore {
    pub const DEFAULT_ENDPOINT: &'static str = "https://storage.googleapis.com";

    pub fn new(endpoint: String, bearer_token: Option<String>) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bearer_token,
            client: reqwest::Client::new(),
        }
    }

    fn upload_url(&self, bucket: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o",
            self.endpoint,
            urlencoding::encode(bucket)
        )
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn put_object(
        &self,
        locator: &StorageLocator,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let size = bytes.len();
        let mut request = self
            .client
            .post(self.upload_url(&locator.bucket))
            .query(&[("uploadType", "media"), ("name", locator.object_name.as_str())])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(object = %locator, bytes = size, "Uploaded document");
        Ok(())
    }
}

/// Writes objects under `<root>/<bucket>/<object name>` on the local disk.
#[derive(Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, locator: &StorageLocator) -> PathBuf {
        self.root.join(&locator.bucket).join(&locator.object_name)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_object(
        &self,
        locator: &StorageLocator,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let path = self.path_for(locator);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let size = bytes.len();
        tokio::fs::write(&path, bytes).await?;

        tracing::info!(path = %path.display(), bytes = size, "Stored document locally");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Bytes,
        extract::{Path, Query},
        http::{HeaderMap, StatusCode},
        routing::post,
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(String, String, String, usize)>>>;

    async fn spawn_fake_gcs(status: StatusCode) -> (String, Seen) {
        let seen: Seen = Arc::default();
        let recorder = seen.clone();
        let app = Router::new().route(
            "/upload/storage/v1/b/:bucket/o",
            post(
                move |Path(bucket): Path<String>,
                      Query(q): Query<HashMap<String, String>>,
                      headers: HeaderMap,
                      body: Bytes| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    let name = q.get("name").cloned().unwrap_or_default();
                    recorder.lock().unwrap().push((bucket, name, auth, body.len()));
                    (status, "{}")
                },
            ),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), seen)
    }

    #[tokio::test]
    async fn test_gcs_upload_sends_media_request() {
        let (endpoint, seen) = spawn_fake_gcs(StatusCode::OK).await;
        let store = GcsObjectStore::new(endpoint, Some("secret".to_string()));
        let locator = StorageLocator::new("obe-files", "uploads/1_a.pdf");

        store
            .put_object(&locator, Bytes::from_static(b"%PDF-1.7"), "application/pdf")
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "obe-files");
        assert_eq!(seen[0].1, "uploads/1_a.pdf");
        assert_eq!(seen[0].2, "Bearer secret");
        assert_eq!(seen[0].3, 8);
    }

    #[tokio::test]
    async fn test_gcs_rejection_carries_status() {
        let (endpoint, _) = spawn_fake_gcs(StatusCode::FORBIDDEN).await;
        let store = GcsObjectStore::new(endpoint, None);
        let locator = StorageLocator::new("b", "o.pdf");

        let err = store
            .put_object(&locator, Bytes::from_static(&[1, 2, 3]), "application/pdf")
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Rejected { status: 403, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_local_store_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let locator = StorageLocator::new("bucket", "uploads/1_doc.pdf");

        store
            .put_object(&locator, Bytes::from_static(b"pdf"), "application/pdf")
            .await
            .unwrap();

        let written = tokio::fs::read(dir.path().join("bucket/uploads/1_doc.pdf"))
            .await
            .unwrap();
        assert_eq!(written, b"pdf");
    }
}
