//! Error types for pooling, bulk streaming and scroll scans

use crate::bulk::BulkItem;
use serde_json::Value;
use thiserror::Error;

/// Failure of a single call against the cluster.
///
/// Returned by [`SearchClient`](crate::transport::SearchClient) implementations.
/// `Status` carries the HTTP status the server answered with; the other two
/// variants mean no usable response was received at all.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("TransportError({status}, '{message}')")]
    Status {
        status: u16,
        message: String,
        info: Value,
    },

    #[error("ConnectionError({0})")]
    Connection(String),

    #[error("ConnectionTimeout({0})")]
    Timeout(String),

    #[error("SerializationError({0})")]
    Decode(String),
}

impl TransportError {
    /// Build a status error without extra info
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        TransportError::Status {
            status,
            message: message.into(),
            info: Value::Null,
        }
    }

    /// HTTP status of the failed call, if the server answered at all
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Connection(_)
            | TransportError::Timeout(_)
            | TransportError::Decode(_) => None,
        }
    }

    /// True when the server pushed back (429) and the call may be retried later
    pub fn is_rejection(&self) -> bool {
        self.status_code() == Some(crate::bulk::REJECTED_STATUS)
    }

    /// True when the node itself could not be reached
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            TransportError::Connection(_) | TransportError::Timeout(_)
        )
    }

    /// Get the error type as a string for metrics labeling
    pub fn error_type(&self) -> &'static str {
        match self {
            TransportError::Status { status, .. } if *status == 429 => "rejected",
            TransportError::Status { .. } => "status",
            TransportError::Connection(_) => "connection",
            TransportError::Timeout(_) => "timeout",
            TransportError::Decode(_) => "decode",
        }
    }
}

/// Errors surfaced by searchlink operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Improperly configured: {0}")]
    Config(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Scroll {scroll_id} failed: {message}")]
    Scan { scroll_id: String, message: String },

    #[error("Invalid bulk action: {0}")]
    InvalidAction(String),

    #[error("{} document(s) failed to index.", errors.len())]
    BulkIndex { errors: Vec<BulkItem> },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Failed bulk records carried by an aggregate error
    pub fn bulk_errors(&self) -> Option<&[BulkItem]> {
        match self {
            Error::BulkIndex { errors } => Some(errors),
            _ => None,
        }
    }

    /// Underlying transport failure, if this error wraps one
    pub fn as_transport(&self) -> Option<&TransportError> {
        match self {
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
