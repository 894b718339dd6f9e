use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors returned by an [`ObjectStore`](super::ObjectStore) backend.
///
/// These cover the full lifecycle of a storage call: network issues,
/// HTTP errors, API-level rejections, and malformed responses.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// HTTP response with a non-2xx status code and no API error body
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),

    /// The requested file does not exist
    #[error("File not found: {0}")]
    NotFound(String),

    /// The API rejected the call; carries the provider's error summary
    #[error("Storage API error: {0}")]
    Api(String),

    /// Downloaded file exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,

    /// Response body could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Base URL is not HTTPS (plain HTTP is only allowed for localhost)
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

impl StorageError {
    /// Returns true if the error means the file is absent, as opposed to unreadable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

// ============================================================================
// Upload Session Types
// ============================================================================

/// Position inside an open resumable upload session.
///
/// `offset` is the number of bytes the backend has acknowledged so far;
/// the next segment must be appended at exactly this offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCursor {
    pub session_id: String,
    pub offset: u64,
}

impl UploadCursor {
    /// Cursor after `len` more bytes were accepted by the session.
    pub fn advanced(&self, len: usize) -> Self {
        Self {
            session_id: self.session_id.clone(),
            offset: self.offset.saturating_add(len as u64),
        }
    }
}

/// Totals for a completed chunked upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadSummary {
    /// Total bytes committed
    pub bytes: u64,
    /// Number of segments sent via `upload_step`
    pub segments: usize,
}
