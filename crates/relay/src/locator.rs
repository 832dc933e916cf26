use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_FILE_NAME: &str = "upload.pdf";
pub const UPLOAD_PREFIX: &str = "uploads/";

/// Where an uploaded document lives in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocator {
    pub bucket: String,
    pub object_name: String,
}

impl StorageLocator {
    pub fn new(bucket: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object_name: object_name.into(),
        }
    }

    /// Name a fresh upload: `uploads/<unix millis>_<sanitized file name>`.
    pub fn for_upload(bucket: &str, file_name: Option<&str>, now: DateTime<Utc>) -> Self {
        let object_name = format!(
            "{}{}_{}",
            UPLOAD_PREFIX,
            now.timestamp_millis(),
            sanitize_file_name(file_name)
        );
        Self::new(bucket, object_name)
    }

    pub fn uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.object_name)
    }

    /// Last path segment of the object name.
    pub fn display_name(&self) -> &str {
        self.object_name
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_FILE_NAME)
    }
}

impl fmt::Display for StorageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// Replace everything outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_name(file_name: Option<&str>) -> String {
    let name = file_name.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(DEFAULT_FILE_NAME);
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
