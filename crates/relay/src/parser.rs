use async_trait::async_trait;
use handoff::ParseResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ParseError;
use crate::locator::StorageLocator;

/// Successful reply of the parse service.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseReply {
    /// Count reported by the service, if any.
    pub count: Option<usize>,
    pub result: ParseResult,
}

/// Remote document parser. Takes a storage locator, returns structured pages.
#[async_trait]
pub trait ParseService: Send + Sync {
    async fn parse(&self, locator: &StorageLocator) -> Result<ParseReply, ParseError>;
}

#[derive(Clone)]
pub struct HttpParseService {
    url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ParseRequest<'a> {
    bucket: &'a str,
    blob_path: &'a str,
}

#[derive(Deserialize)]
struct ParseResponse {
    count: Option<usize>,
    #[serde(default)]
    pages: Option<ParseResult>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

impl HttpParseService {
    pub fn new(url: String, timeout: Duration) -> Result<Self, ParseError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl ParseService for HttpParseService {
    async fn parse(&self, locator: &StorageLocator) -> Result<ParseReply, ParseError> {
        let request = ParseRequest {
            bucket: &locator.bucket,
            blob_path: &locator.object_name,
        };

        let response = self.client.post(&self.url).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error)
                .unwrap_or_else(|| format!("Parse service returned {}", status.as_u16()));
            return Err(ParseError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ParseResponse =
            serde_json::from_str(&body).map_err(|e| ParseError::Malformed(e.to_string()))?;
        let Some(result) = parsed.pages else {
            return Err(ParseError::Malformed("missing pages".to_string()));
        };

        tracing::debug!(
            object = %locator,
            pages = result.page_count(),
            elements = result.element_count(),
            "Parse service replied"
        );
        Ok(ParseReply {
            count: parsed.count,
            result,
        })
    }
}
