//! JSON replies with optional script-tag (JSONP) wrapping for cross-origin editors.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

pub const JSONP_CONTENT_TYPE: &str = "application/javascript; charset=utf-8";
const MAX_CALLBACK_LEN: usize = 64;

/// Uniform body for every failed token lookup.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ErrorBody {
    pub fn not_found() -> Self {
        Self {
            error: "NotFound",
            message: "Token expired or invalid".to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            error: "BadRequest",
            message: message.into(),
        }
    }
}

/// `a`, `cb_1`, `$jsonp.handlers.x`: dot-separated JavaScript identifiers.
pub fn is_valid_callback(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_CALLBACK_LEN {
        return false;
    }
    name.split('.').all(|segment| {
        let mut chars = segment.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => chars
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$'),
            _ => false,
        }
    })
}

/// A JSON body, sent either as-is or wrapped as `callback(json)`.
///
/// Wrapped replies always go out as 200 so the injected script still runs;
/// the outcome is carried in the body.
pub struct Reply {
    status: StatusCode,
    body: Value,
    callback: Option<String>,
}

impl Reply {
    pub fn new<T: Serialize>(status: StatusCode, body: &T, callback: Option<String>) -> Self {
        let body = serde_json::to_value(body).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to encode reply body");
            Value::Null
        });
        Self {
            status,
            body,
            callback,
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self.callback {
            None => (self.status, Json(self.body)).into_response(),
            Some(callback) => {
                let script = format!("{}({})", callback, self.body);
                (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, HeaderValue::from_static(JSONP_CONTENT_TYPE))],
                    script,
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_names() {
        for ok in ["cb", "obe_parse_456", "$", "_x1", "jQuery.cb_2", "a.b.c"] {
            assert!(is_valid_callback(ok), "{ok}");
        }
        let too_long = "a".repeat(65);
        for bad in ["", "1cb", "a..b", "a.", "alert(1)", "x;y", "cb-1", "café", too_long.as_str()] {
            assert!(!is_valid_callback(bad), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_jsonp_wraps_body_with_ok_status() {
        let reply = Reply::new(
            StatusCode::NOT_FOUND,
            &ErrorBody::not_found(),
            Some("obe_parse_789".to_string()),
        );
        let response = reply.into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            HeaderValue::from_static(JSONP_CONTENT_TYPE)
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let inner = text
            .strip_prefix("obe_parse_789(")
            .and_then(|t| t.strip_suffix(')'))
            .unwrap();
        let value: Value = serde_json::from_str(inner).unwrap();
        assert_eq!(value["error"], "NotFound");
        assert_eq!(value["message"], "Token expired or invalid");
    }

    #[tokio::test]
    async fn test_plain_json_keeps_status() {
        let response = Reply::new(StatusCode::NOT_FOUND, &ErrorBody::not_found(), None).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }
}
