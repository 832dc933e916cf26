use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("nothing to split: serialized text is empty")]
    EmptyInput,

    #[error("chunk size must be positive, got {0}")]
    InvalidChunkSize(usize),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("serialized output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("value for {key} is {size} bytes, entry limit is {limit}")]
    ValueTooLarge { key: String, size: usize, limit: usize },

    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Failure to mint a retrieval token. Callers treat this as "no token".
#[derive(Debug, Error)]
pub enum MintError {
    #[error("failed to encode result: {0}")]
    Encode(#[from] CodecError),

    #[error("failed to write result to cache: {0}")]
    StoreWrite(#[from] StoreError),
}
