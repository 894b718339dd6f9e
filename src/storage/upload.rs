use super::{ObjectStore, StorageError, UploadCursor, UploadSummary};

/// Buffered bytes are flushed as one segment once they reach this size (5MB).
pub const DEFAULT_PART_THRESHOLD: usize = 5 * 1024 * 1024;

/// Slice size used when feeding a complete payload through [`ChunkedUpload::write`] (4MB).
pub const DEFAULT_WRITE_CHUNK: usize = 4 * 1024 * 1024;

/// Accumulates outgoing bytes and sends them to an [`ObjectStore`] as
/// resumable upload segments.
///
/// Chunks passed to [`write`](Self::write) are buffered in memory. When the
/// buffer reaches the threshold it is sent as one segment and the returned
/// cursor is kept for the next one. [`finish`](Self::finish) sends whatever
/// remains and commits the session to the target path.
///
/// Every segment except the last is at least `threshold` bytes, and the
/// segments concatenate to exactly the bytes written.
pub struct ChunkedUpload<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    path: String,
    threshold: usize,
    buffer: Vec<u8>,
    cursor: Option<UploadCursor>,
    summary: UploadSummary,
}

impl<'a, S: ObjectStore + ?Sized> ChunkedUpload<'a, S> {
    pub fn new(store: &'a S, path: impl Into<String>) -> Self {
        Self::with_threshold(store, path, DEFAULT_PART_THRESHOLD)
    }

    /// A threshold of 0 is treated as 1, so every non-empty write is flushed.
    pub fn with_threshold(store: &'a S, path: impl Into<String>, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            store,
            path: path.into(),
            threshold,
            buffer: Vec::new(),
            cursor: None,
            summary: UploadSummary::default(),
        }
    }

    /// Bytes currently held in memory and not yet sent.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Cursor returned by the most recent segment, if any was sent.
    pub fn cursor(&self) -> Option<&UploadCursor> {
        self.cursor.as_ref()
    }

    /// Absorbs `chunk`, flushing the buffer if it reached the threshold.
    ///
    /// Returns only after the flush (if any) has completed.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        self.buffer.extend_from_slice(chunk);

        if self.buffer.len() < self.threshold {
            return Ok(());
        }
        self.flush().await
    }

    /// Feeds `bytes` through [`write`](Self::write) in `chunk_size` slices.
    pub async fn write_all_chunked(
        &mut self,
        bytes: &[u8],
        chunk_size: usize,
    ) -> Result<(), StorageError> {
        for chunk in bytes.chunks(chunk_size.max(1)) {
            self.write(chunk).await?;
        }
        Ok(())
    }

    /// Sends the buffered bytes as one segment. No-op when the buffer is empty.
    pub async fn flush(&mut self) -> Result<(), StorageError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let data = std::mem::take(&mut self.buffer);
        let len = data.len();
        tracing::debug!(path = %self.path, bytes = len, "Uploading chunk");

        let cursor = self.store.upload_step(data, self.cursor.as_ref()).await?;

        tracing::debug!(
            path = %self.path,
            session = %cursor.session_id,
            offset = cursor.offset,
            "Uploaded chunk"
        );
        self.cursor = Some(cursor);
        self.summary.bytes = self.summary.bytes.saturating_add(len as u64);
        self.summary.segments += 1;
        Ok(())
    }

    /// Flushes the remainder and commits the upload to the target path.
    pub async fn finish(mut self) -> Result<UploadSummary, StorageError> {
        self.flush().await?;
        self.store
            .finish_upload(&self.path, self.cursor.as_ref())
            .await?;

        tracing::debug!(
            path = %self.path,
            bytes = self.summary.bytes,
            segments = self.summary.segments,
            "Upload committed"
        );
        Ok(self.summary)
    }
}
