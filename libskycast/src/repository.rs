//! Repository and directory abstractions
//!
//! The composer never talks HTTP directly. It goes through these traits so
//! that the XRPC client, the in-memory mocks, or any other store can sit
//! behind it.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AtUri, BlobRef, CreatedRecord, FetchedRecord, RecordPage};

/// Content-addressed record store owned by the authenticated account.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Fetch a record and its current content identifier.
    ///
    /// # Errors
    ///
    /// Returns `SkycastError::Transport` when the store cannot be reached and
    /// `SkycastError::Decode` when the response is malformed.
    async fn get_record(&self, uri: &AtUri) -> Result<FetchedRecord>;

    /// Create a record in `collection` of the authenticated repo.
    ///
    /// # Returns
    ///
    /// The new record's location and content identifier.
    async fn create_record(
        &self,
        collection: &str,
        record: &serde_json::Value,
    ) -> Result<CreatedRecord>;

    /// Upload raw bytes and return the blob handle the store assigned.
    async fn upload_blob(&self, bytes: Vec<u8>, mime_type: &str) -> Result<BlobRef>;

    /// Delete the record `rkey` from `collection` of the authenticated repo.
    async fn delete_record(&self, collection: &str, rkey: &str) -> Result<()>;

    /// One page of `collection` in `repo`. Paging is left to the caller.
    async fn list_records(
        &self,
        repo: &str,
        collection: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<RecordPage>;
}

/// Handle-to-DID directory.
#[async_trait]
pub trait HandleResolver: Send + Sync {
    /// Resolve a handle (without the leading `@`) to a DID.
    ///
    /// # Errors
    ///
    /// Any error means the handle could not be resolved; callers decide
    /// whether that is fatal.
    async fn resolve_handle(&self, handle: &str) -> Result<String>;
}
