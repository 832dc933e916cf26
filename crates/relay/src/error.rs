use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage rejected upload: {status} {body}")]
    Rejected { status: u16, body: String },

    #[error("storage request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Network and local io failures may succeed on a second attempt; 5xx too.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Rejected { status, .. } => *status >= 500,
            StorageError::Transport(_) | StorageError::Io(_) => true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    /// Parse service answered with a non-success status.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// Parse service answered 2xx with a body we could not read.
    #[error("parse service returned an unreadable body: {0}")]
    Malformed(String),

    #[error("parse service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failure of the primary relay path. Always fatal to the caller's response.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("upload failed: {0}")]
    Storage(#[from] StorageError),

    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error("{0}")]
    MalformedUpstream(String),

    #[error("parse service unreachable: {0}")]
    Transport(String),
}

impl RelayError {
    /// HTTP status surfaced to the relay's caller.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::Storage(StorageError::Rejected { status, .. }) if *status >= 400 => *status,
            RelayError::Storage(_) => 500,
            RelayError::Upstream { status, .. } if *status >= 400 => *status,
            RelayError::Upstream { .. } => 500,
            RelayError::MalformedUpstream(_) | RelayError::Transport(_) => 502,
        }
    }
}

impl From<ParseError> for RelayError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Rejected { status, message } => RelayError::Upstream { status, message },
            ParseError::Malformed(msg) => RelayError::MalformedUpstream(msg),
            ParseError::Transport(err) => RelayError::Transport(err.to_string()),
        }
    }
}
