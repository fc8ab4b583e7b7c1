//! Post composition pipeline
//!
//! [`PostComposer`] drives one draft through validation, embed and thread
//! resolution, mention resolution and assembly, and optionally submits the
//! result to the repository.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::assembler::{assemble, ResolvedParts};
use crate::cancel::cancellable;
use crate::draft::PostDraft;
use crate::embed::EmbedResolver;
use crate::error::{Result, Stage};
use crate::fetch::{ByteSource, PageMetadataFetcher};
use crate::mentions::resolve_mentions;
use crate::repository::{HandleResolver, Repository};
use crate::scanner::scan;
use crate::thread::resolve_thread;
use crate::types::{ComposedRecord, CreatedRecord, POST_COLLECTION};

/// Composes drafts into post records.
///
/// Each call is independent; the composer holds nothing but its collaborators
/// and can be shared between tasks.
#[derive(Clone)]
pub struct PostComposer {
    repository: Arc<dyn Repository>,
    directory: Arc<dyn HandleResolver>,
    pages: Arc<dyn PageMetadataFetcher>,
    bytes: Arc<dyn ByteSource>,
}

impl PostComposer {
    /// Create a new PostComposer
    ///
    /// # Arguments
    ///
    /// * `repository` - Record store used for blobs, quoted and parent records, and submission
    /// * `directory` - Handle directory used to resolve mentions
    /// * `pages` - Fetches HTML for link previews
    /// * `bytes` - Fetches image bytes from URLs or local paths
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use libskycast::config::Config;
    /// use libskycast::composer::PostComposer;
    /// use libskycast::draft::PostDraft;
    /// use libskycast::fetch::HttpFetcher;
    /// use libskycast::xrpc::XrpcClient;
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # async fn example() -> libskycast::error::Result<()> {
    /// let config = Config::load()?;
    /// let client = Arc::new(XrpcClient::login(&config.credentials()?, &config.http).await?);
    /// let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
    /// let composer = PostComposer::new(client.clone(), client, fetcher.clone(), fetcher);
    ///
    /// let draft = PostDraft::builder("hello #world").build()?;
    /// let created = composer.submit(&draft, &CancellationToken::new()).await?;
    /// println!("{}", created.uri);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        repository: Arc<dyn Repository>,
        directory: Arc<dyn HandleResolver>,
        pages: Arc<dyn PageMetadataFetcher>,
        bytes: Arc<dyn ByteSource>,
    ) -> Self {
        Self {
            repository,
            directory,
            pages,
            bytes,
        }
    }

    /// Resolve everything `draft` refers to and assemble the record, without
    /// submitting it.
    ///
    /// Draft validation runs before any network call. Embed and thread
    /// resolution run concurrently; the first fatal failure aborts the other.
    /// Blobs uploaded before a failure are left in place.
    ///
    /// # Errors
    ///
    /// * `SkycastError::Validation` - the draft is malformed
    /// * `SkycastError::Resolution` - an embed or the reply parent could not be resolved
    /// * `SkycastError::Cancelled` - `token` fired before composition finished
    pub async fn compose(
        &self,
        draft: &PostDraft,
        token: &CancellationToken,
    ) -> Result<ComposedRecord> {
        draft.validate()?;
        let directive = draft.embed_directive()?;

        let embeds = EmbedResolver::new(&*self.repository, &*self.pages, &*self.bytes);
        let (embed, reply) = tokio::try_join!(
            embeds.resolve(directive, token),
            resolve_thread(&*self.repository, draft.reply_to.as_deref(), token),
        )?;

        let candidates = scan(&draft.text);
        debug!("Found {} annotation candidates", candidates.len());
        let mentions = resolve_mentions(&*self.directory, &candidates, token).await?;

        assemble(
            draft,
            ResolvedParts {
                mentions,
                embed,
                reply,
            },
            Utc::now(),
        )
    }

    /// Compose `draft` and create it as a post record.
    pub async fn submit(
        &self,
        draft: &PostDraft,
        token: &CancellationToken,
    ) -> Result<CreatedRecord> {
        let record = self.compose(draft, token).await?;
        self.publish(&record, token).await
    }

    /// Create an already composed record.
    pub async fn publish(
        &self,
        record: &ComposedRecord,
        token: &CancellationToken,
    ) -> Result<CreatedRecord> {
        let value = record.to_value()?;
        let created = cancellable(token, self.repository.create_record(POST_COLLECTION, &value))
            .await
            .map_err(|e| e.at_stage(Stage::Submit, POST_COLLECTION))?;
        info!("Created post {}", created.uri);
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SkycastError;
    use crate::mock::{MockDirectory, MockFetcher, MockRepository, PNG_BYTES};
    use std::time::Duration;

    fn composer(repo: &MockRepository, directory: MockDirectory, fetcher: MockFetcher) -> PostComposer {
        let fetcher = Arc::new(fetcher);
        PostComposer::new(Arc::new(repo.clone()), Arc::new(directory), fetcher.clone(), fetcher)
    }

    #[tokio::test]
    async fn test_submit_plain_post() {
        let repo = MockRepository::new();
        let composer = composer(&repo, MockDirectory::new(), MockFetcher::new());

        let created = composer
            .submit(&PostDraft::new("hello"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(created.uri, "at://did:plc:mock/app.bsky.feed.post/mock1");

        let records = repo.created_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, POST_COLLECTION);
        assert_eq!(records[0].1["text"], "hello");
    }

    #[tokio::test]
    async fn test_validation_happens_before_network() {
        let repo = MockRepository::new();
        let fetcher = MockFetcher::new();
        let composer = composer(&repo, MockDirectory::new(), fetcher.clone());
        let draft = PostDraft {
            text: "two embeds".into(),
            embed_link: Some("https://example.com".into()),
            images: Some(vec![crate::draft::ImageSource {
                alt: String::new(),
                location: "cat.png".into(),
            }]),
            ..Default::default()
        };

        let err = composer.submit(&draft, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SkycastError::Validation(_)));
        assert!(fetcher.fetches().is_empty());
        assert_eq!(repo.upload_count(), 0);
        assert_eq!(repo.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_image_failure_prevents_submission() {
        let repo = MockRepository::new().failing_upload_on(2);
        let fetcher = MockFetcher::new()
            .with_bytes("a.png", PNG_BYTES)
            .with_bytes("b.png", PNG_BYTES)
            .with_bytes("c.png", PNG_BYTES);
        let composer = composer(&repo, MockDirectory::new(), fetcher);
        let draft = PostDraft::builder("three pictures")
            .image("a", "a.png")
            .image("b", "b.png")
            .image("c", "c.png")
            .build()
            .unwrap();

        let err = composer.submit(&draft, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SkycastError::Resolution { stage: Stage::Images, .. }));
        assert_eq!(repo.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_submit_failure_is_reported_against_submit_stage() {
        let repo = MockRepository::new().failing_create();
        let composer = composer(&repo, MockDirectory::new(), MockFetcher::new());

        let err = composer
            .submit(&PostDraft::new("hello"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SkycastError::Resolution { stage: Stage::Submit, .. }));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_cancellation_abandons_slow_resolution() {
        let repo = MockRepository::new()
            .with_record("at://did:plc:bob/app.bsky.feed.post/1", "bafy", serde_json::json!({}))
            .with_delay(Duration::from_secs(5));
        let composer = composer(&repo, MockDirectory::new(), MockFetcher::new());
        let draft = PostDraft::builder("reply")
            .reply_to("at://did:plc:bob/app.bsky.feed.post/1")
            .build()
            .unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = composer.submit(&draft, &token).await.unwrap_err();
        assert!(matches!(err, SkycastError::Cancelled));
        assert_eq!(repo.create_calls(), 0);
    }
}
