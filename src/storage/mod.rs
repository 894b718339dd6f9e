//! Object storage access for the feed file.
//!
//! - [`ObjectStore`] is the seam between the feed update flow and a concrete backend
//! - [`DropboxClient`] talks to the Dropbox HTTP API
//! - [`ChunkedUpload`] buffers outgoing bytes into fixed-size upload segments

mod dropbox;
mod types;
mod upload;

use async_trait::async_trait;

pub use dropbox::{DropboxClient, DropboxEndpoints};
pub use types::{StorageError, UploadCursor, UploadSummary};
pub use upload::{ChunkedUpload, DEFAULT_PART_THRESHOLD, DEFAULT_WRITE_CHUNK};

/// A file store that supports whole-file reads and resumable, segmented writes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reads the full contents of `path`.
    ///
    /// Returns [`StorageError::NotFound`] when the file does not exist.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Resolves a public, direct-download URL for `path`.
    async fn public_url(&self, path: &str) -> Result<String, StorageError>;

    /// Sends one upload segment.
    ///
    /// With no cursor a new session is started with `data` as its first
    /// segment; otherwise `data` is appended at `cursor.offset`. Returns the
    /// cursor to use for the next segment.
    async fn upload_step(
        &self,
        data: Vec<u8>,
        cursor: Option<&UploadCursor>,
    ) -> Result<UploadCursor, StorageError>;

    /// Commits the session identified by `cursor` to `path`, overwriting any
    /// existing file. With no cursor an empty file is committed.
    async fn finish_upload(
        &self,
        path: &str,
        cursor: Option<&UploadCursor>,
    ) -> Result<(), StorageError>;
}
