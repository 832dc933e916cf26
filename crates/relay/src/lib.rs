//! Upload relay: put a document in object storage, have the remote parse
//! service read it from there, and hand back the structured result.

pub mod error;
pub mod locator;
pub mod parser;
pub mod retry;
pub mod storage;

pub use error::{ParseError, RelayError, StorageError};
pub use locator::{StorageLocator, sanitize_file_name};
pub use parser::{HttpParseService, ParseReply, ParseService};
pub use retry::RetryPolicy;
pub use storage::{GcsObjectStore, LocalObjectStore, ObjectStore};

use bytes::Bytes;
use chrono::Utc;
use handoff::ParseResult;
use std::sync::Arc;
use tracing::info;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A document that made it through storage and parsing.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub locator: StorageLocator,
    pub count: usize,
    pub result: ParseResult,
}

#[derive(Clone)]
pub struct Relay {
    storage: Arc<dyn ObjectStore>,
    parser: Arc<dyn ParseService>,
    bucket: String,
    retry: RetryPolicy,
}

impl Relay {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        parser: Arc<dyn ParseService>,
        bucket: String,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            parser,
            bucket,
            retry,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Store `bytes` under a fresh object name, then parse it.
    pub async fn process(
        &self,
        file_name: Option<&str>,
        bytes: Bytes,
    ) -> Result<ParsedDocument, RelayError> {
        let locator = StorageLocator::for_upload(&self.bucket, file_name, Utc::now());
        let size = bytes.len();

        self.retry
            .retry_if("upload_document", StorageError::is_retryable, || {
                self.storage.put_object(&locator, bytes.clone(), PDF_CONTENT_TYPE)
            })
            .await?;

        // Only transport failures are retried; an HTTP answer from the parser is final.
        let reply = self
            .retry
            .retry_if(
                "parse_document",
                |e: &ParseError| matches!(e, ParseError::Transport(_)),
                || self.parser.parse(&locator),
            )
            .await?;

        let count = reply.count.unwrap_or_else(|| reply.result.page_count());
        info!(
            object = %locator,
            bytes = size,
            pages = reply.result.page_count(),
            count,
            "Document parsed"
        );

        Ok(ParsedDocument {
            locator,
            count,
            result: reply.result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use handoff::{Element, Page};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingStore {
        uploads: Mutex<Vec<StorageLocator>>,
        payloads: Mutex<Vec<Bytes>>,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn put_object(
            &self,
            locator: &StorageLocator,
            bytes: Bytes,
            _content_type: &str,
        ) -> Result<(), StorageError> {
            self.payloads.lock().unwrap().push(bytes);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(StorageError::Rejected {
                    status: 503,
                    body: "busy".to_string(),
                });
            }
            self.uploads.lock().unwrap().push(locator.clone());
            Ok(())
        }
    }

    struct FixedParser(Result<ParseReply, u16>);

    #[async_trait]
    impl ParseService for FixedParser {
        async fn parse(&self, _locator: &StorageLocator) -> Result<ParseReply, ParseError> {
            match &self.0 {
                Ok(reply) => Ok(reply.clone()),
                Err(status) => Err(ParseError::Rejected {
                    status: *status,
                    message: format!("Parse service returned {status}"),
                }),
            }
        }
    }

    fn reply(count: Option<usize>) -> ParseReply {
        ParseReply {
            count,
            result: ParseResult::new(vec![
                Page::new(1, vec![Element::text("a")]),
                Page::new(2, vec![]),
            ]),
        }
    }

    fn relay(store: Arc<RecordingStore>, parser: FixedParser) -> Relay {
        Relay::new(
            store,
            Arc::new(parser),
            "obe-files".to_string(),
            RetryPolicy::new(2, 1, 1),
        )
    }

    #[tokio::test]
    async fn test_process_uploads_then_parses() {
        let store = Arc::new(RecordingStore::default());
        let relay = relay(store.clone(), FixedParser(Ok(reply(Some(7)))));

        let doc = relay.process(Some("my file.pdf"), Bytes::from_static(b"%PDF")).await.unwrap();

        assert_eq!(doc.count, 7);
        assert_eq!(doc.result.page_count(), 2);
        assert_eq!(doc.locator.bucket, "obe-files");
        assert!(doc.locator.object_name.starts_with("uploads/"));
        assert!(doc.locator.object_name.ends_with("_my_file.pdf"));
        assert_eq!(store.uploads.lock().unwrap().as_slice(), &[doc.locator.clone()]);
    }

    #[tokio::test]
    async fn test_count_falls_back_to_page_count() {
        let store = Arc::new(RecordingStore::default());
        let relay = relay(store, FixedParser(Ok(reply(None))));

        let doc = relay.process(None, Bytes::new()).await.unwrap();

        assert_eq!(doc.count, 2);
        assert!(doc.locator.object_name.ends_with("_upload.pdf"));
    }

    #[tokio::test]
    async fn test_transient_storage_failure_is_retried() {
        let store = Arc::new(RecordingStore {
            failures_left: AtomicUsize::new(2),
            ..RecordingStore::default()
        });
        let relay = relay(store.clone(), FixedParser(Ok(reply(None))));

        assert!(relay.process(None, Bytes::from_static(&[1])).await.is_ok());
        assert_eq!(store.uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retries_share_one_upload_buffer() {
        let store = Arc::new(RecordingStore {
            failures_left: AtomicUsize::new(2),
            ..RecordingStore::default()
        });
        let relay = relay(store.clone(), FixedParser(Ok(reply(None))));
        let document = Bytes::from(vec![7u8; 64 * 1024]);

        relay.process(None, document.clone()).await.unwrap();

        let payloads = store.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 3);
        assert!(payloads.iter().all(|p| p.as_ptr() == document.as_ptr()));
    }

    #[tokio::test]
    async fn test_storage_failure_stops_before_parse() {
        let store = Arc::new(RecordingStore {
            failures_left: AtomicUsize::new(10),
            ..RecordingStore::default()
        });
        let relay = relay(store, FixedParser(Ok(reply(None))));

        let err = relay.process(None, Bytes::from_static(&[1])).await.unwrap_err();

        assert!(matches!(err, RelayError::Storage(_)));
        assert_eq!(err.status_code(), 503);
    }

    #[tokio::test]
    async fn test_upstream_rejection_propagates_status() {
        let store = Arc::new(RecordingStore::default());
        let relay = relay(store, FixedParser(Err(422)));

        let err = relay.process(None, Bytes::from_static(&[1])).await.unwrap_err();

        assert_eq!(err.status_code(), 422);
        assert_eq!(err.to_string(), "Parse service returned 422");
    }
}
