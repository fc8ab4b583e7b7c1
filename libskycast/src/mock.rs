//! In-memory collaborators for testing
//!
//! Mock implementations of the repository, handle directory and fetchers.
//! They record every call so tests can assert on what the pipeline did
//! (and did not do) without credentials or network access. Clones share
//! state, so a test can hand one clone to the composer and inspect another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use url::Url;

use crate::error::{Result, SkycastError};
use crate::fetch::{ByteSource, PageMetadataFetcher};
use crate::repository::{HandleResolver, Repository};
use crate::types::{AtUri, BlobRef, CidLink, CreatedRecord, FetchedRecord, RecordPage};

/// Smallest byte prefix recognized as a PNG.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

pub const MOCK_DID: &str = "did:plc:mock";

#[derive(Debug, Clone)]
struct StoredRecord {
    collection: String,
    record: FetchedRecord,
}

#[derive(Debug, Default)]
struct RepositoryState {
    records: Vec<StoredRecord>,
    created: Vec<(String, serde_json::Value)>,
    create_calls: usize,
    upload_count: usize,
    get_record_calls: Vec<String>,
    deleted: Vec<(String, String)>,
}

/// Mock repository for testing
#[derive(Clone)]
pub struct MockRepository {
    did: String,
    state: Arc<Mutex<RepositoryState>>,
    fail_upload_on: Option<usize>,
    fail_create: bool,
    delay: Duration,
}

impl Default for MockRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRepository {
    pub fn new() -> Self {
        Self {
            did: MOCK_DID.to_string(),
            state: Arc::new(Mutex::new(RepositoryState::default())),
            fail_upload_on: None,
            fail_create: false,
            delay: Duration::from_millis(0),
        }
    }

    /// Seed an existing record.
    pub fn with_record(self, uri: &str, cid: &str, value: serde_json::Value) -> Self {
        let collection = uri
            .parse::<AtUri>()
            .map(|u| u.collection)
            .unwrap_or_default();
        self.state.lock().unwrap().records.push(StoredRecord {
            collection,
            record: FetchedRecord {
                uri: uri.to_string(),
                cid: cid.to_string(),
                value,
            },
        });
        self
    }

    /// Fail the `n`th blob upload (1-based).
    pub fn failing_upload_on(mut self, n: usize) -> Self {
        self.fail_upload_on = Some(n);
        self
    }

    /// Fail every record creation.
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Delay every call (simulates network latency)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    /// Records successfully created, as (collection, record) pairs.
    pub fn created_records(&self) -> Vec<(String, serde_json::Value)> {
        self.state.lock().unwrap().created.clone()
    }

    /// Number of times create_record was called, successful or not.
    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub fn upload_count(&self) -> usize {
        self.state.lock().unwrap().upload_count
    }

    pub fn get_record_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().get_record_calls.clone()
    }

    /// Deleted records, as (collection, rkey) pairs.
    pub fn deleted(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().deleted.clone()
    }

    async fn simulate_latency(&self) {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl Repository for MockRepository {
    async fn get_record(&self, uri: &AtUri) -> Result<FetchedRecord> {
        let key = uri.to_string();
        self.state.lock().unwrap().get_record_calls.push(key.clone());
        self.simulate_latency().await;

        let state = self.state.lock().unwrap();
        state
            .records
            .iter()
            .find(|stored| stored.record.uri == key)
            .map(|stored| stored.record.clone())
            .ok_or_else(|| SkycastError::Transport(format!("record not found: {}", key)))
    }

    async fn create_record(
        &self,
        collection: &str,
        record: &serde_json::Value,
    ) -> Result<CreatedRecord> {
        self.state.lock().unwrap().create_calls += 1;
        self.simulate_latency().await;

        if self.fail_create {
            return Err(SkycastError::Transport("mock record creation failed".to_string()));
        }

        let mut state = self.state.lock().unwrap();
        let n = state.created.len() + 1;
        let created = CreatedRecord {
            uri: format!("at://{}/{}/mock{}", self.did, collection, n),
            cid: format!("bafymock{}", n),
        };
        state.created.push((collection.to_string(), record.clone()));
        state.records.push(StoredRecord {
            collection: collection.to_string(),
            record: FetchedRecord {
                uri: created.uri.clone(),
                cid: created.cid.clone(),
                value: record.clone(),
            },
        });
        Ok(created)
    }

    async fn upload_blob(&self, bytes: Vec<u8>, mime_type: &str) -> Result<BlobRef> {
        let n = {
            let mut state = self.state.lock().unwrap();
            state.upload_count += 1;
            state.upload_count
        };
        self.simulate_latency().await;

        if self.fail_upload_on == Some(n) {
            return Err(SkycastError::Transport(format!("mock upload {} failed", n)));
        }

        Ok(BlobRef {
            blob_type: "blob".to_string(),
            reference: CidLink {
                link: format!("bafkreimock{}", n),
            },
            mime_type: mime_type.to_string(),
            size: bytes.len() as u64,
        })
    }

    async fn delete_record(&self, collection: &str, rkey: &str) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock().unwrap();
        let uri = AtUri::new(self.did.clone(), collection, rkey).to_string();
        state.records.retain(|stored| stored.record.uri != uri);
        state.deleted.push((collection.to_string(), rkey.to_string()));
        Ok(())
    }

    async fn list_records(
        &self,
        _repo: &str,
        collection: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<RecordPage> {
        self.simulate_latency().await;
        let start = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| SkycastError::Validation(format!("bad cursor: {}", c)))?,
            None => 0,
        };

        let state = self.state.lock().unwrap();
        // Newest first, like the real listing.
        let matching: Vec<FetchedRecord> = state
            .records
            .iter()
            .rev()
            .filter(|stored| stored.collection == collection)
            .map(|stored| stored.record.clone())
            .collect();

        let end = (start + limit).min(matching.len());
        let records = matching.get(start..end).map(<[_]>::to_vec).unwrap_or_default();
        let cursor = (end < matching.len()).then(|| end.to_string());
        Ok(RecordPage { records, cursor })
    }
}

/// Mock handle directory for testing
#[derive(Clone, Default)]
pub struct MockDirectory {
    handles: HashMap<String, String>,
    transport_failure: bool,
    lookups: Arc<Mutex<Vec<String>>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handle(mut self, handle: &str, did: &str) -> Self {
        self.handles.insert(handle.to_string(), did.to_string());
        self
    }

    /// Every lookup fails as if the directory were unreachable.
    pub fn failing_with_transport_error(mut self) -> Self {
        self.transport_failure = true;
        self
    }

    /// Handles looked up so far, in call order.
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl HandleResolver for MockDirectory {
    async fn resolve_handle(&self, handle: &str) -> Result<String> {
        self.lookups.lock().unwrap().push(handle.to_string());

        if self.transport_failure {
            return Err(SkycastError::Transport("directory unreachable".to_string()));
        }

        self.handles
            .get(handle)
            .cloned()
            .ok_or_else(|| SkycastError::Transport(format!("Unable to resolve handle: {}", handle)))
    }
}

/// Mock page and byte fetcher for testing
#[derive(Clone, Default)]
pub struct MockFetcher {
    pages: HashMap<String, String>,
    bytes: HashMap<String, Vec<u8>>,
    fetches: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_bytes(mut self, location: &str, bytes: &[u8]) -> Self {
        self.bytes.insert(location.to_string(), bytes.to_vec());
        self
    }

    /// Pages and byte locations requested so far, in call order.
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageMetadataFetcher for MockFetcher {
    async fn fetch_page(&self, url: &Url) -> Result<String> {
        self.fetches.lock().unwrap().push(url.to_string());
        self.pages
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| SkycastError::Transport(format!("HTTP 404 Not Found for {}", url)))
    }
}

#[async_trait]
impl ByteSource for MockFetcher {
    async fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>> {
        self.fetches.lock().unwrap().push(location.to_string());
        self.bytes
            .get(location)
            .cloned()
            .ok_or_else(|| SkycastError::Transport(format!("HTTP 404 Not Found for {}", location)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_created_records_are_listed_newest_first() {
        let repo = MockRepository::new();
        for i in 0..3 {
            repo.create_record("app.bsky.feed.post", &json!({ "text": i }))
                .await
                .unwrap();
        }

        let first = repo.list_records(MOCK_DID, "app.bsky.feed.post", None, 2).await.unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.records[0].value["text"], 2);
        assert_eq!(first.cursor.as_deref(), Some("2"));

        let second = repo
            .list_records(MOCK_DID, "app.bsky.feed.post", first.cursor.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(second.records.len(), 1);
        assert!(second.cursor.is_none());
    }

    #[tokio::test]
    async fn test_upload_failure_on_nth_call() {
        let repo = MockRepository::new().failing_upload_on(2);
        assert!(repo.upload_blob(vec![1], "image/png").await.is_ok());
        assert!(repo.upload_blob(vec![2], "image/png").await.is_err());
        assert!(repo.upload_blob(vec![3], "image/png").await.is_ok());
        assert_eq!(repo.upload_count(), 3);
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let repo = MockRepository::new();
        let created = repo
            .create_record("app.bsky.feed.post", &json!({ "text": "bye" }))
            .await
            .unwrap();
        let uri: AtUri = created.uri.parse().unwrap();

        repo.delete_record(&uri.collection, &uri.rkey).await.unwrap();
        assert!(repo.get_record(&uri).await.is_err());
        assert_eq!(repo.deleted(), vec![("app.bsky.feed.post".to_string(), uri.rkey)]);
    }
}
