//! Reply thread resolution

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cancel::cancellable;
use crate::error::{Result, Stage};
use crate::repository::Repository;
use crate::types::{AtUri, FetchedRecord, ReplyRef, StrongRef};

/// Compute the reply reference for a post replying to `reply_to`.
///
/// The parent is fetched once. If it is itself a reply, its stored root is
/// reused; otherwise the parent starts the thread. Replies always store their
/// resolved root, so a single hop is enough.
///
/// # Errors
///
/// A malformed URI is a validation error. A failed fetch is fatal and
/// reported against [`Stage::Thread`].
pub async fn resolve_thread(
    repository: &dyn Repository,
    reply_to: Option<&str>,
    token: &CancellationToken,
) -> Result<Option<ReplyRef>> {
    let Some(target) = reply_to else {
        return Ok(None);
    };

    let uri: AtUri = target.parse()?;
    let parent_record = cancellable(token, repository.get_record(&uri))
        .await
        .map_err(|e| e.at_stage(Stage::Thread, target))?;

    let parent = StrongRef::new(target, parent_record.cid.clone());
    let root = inherited_root(&parent_record).unwrap_or_else(|| parent.clone());
    debug!("Replying to {} in thread rooted at {}", parent.uri, root.uri);

    Ok(Some(ReplyRef { root, parent }))
}

/// The root stored on `record`, if it is a reply with a usable root.
fn inherited_root(record: &FetchedRecord) -> Option<StrongRef> {
    let root = record.value.get("reply")?.get("root")?;
    serde_json::from_value::<StrongRef>(root.clone())
        .ok()
        .filter(|root| !root.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SkycastError;
    use crate::mock::MockRepository;
    use serde_json::json;

    const TOP: &str = "at://did:plc:alice/app.bsky.feed.post/top";
    const MIDDLE: &str = "at://did:plc:bob/app.bsky.feed.post/middle";

    fn thread_repo() -> MockRepository {
        MockRepository::new()
            .with_record(TOP, "bafytop", json!({ "text": "first" }))
            .with_record(
                MIDDLE,
                "bafymiddle",
                json!({
                    "text": "second",
                    "reply": {
                        "root": { "uri": TOP, "cid": "bafytop" },
                        "parent": { "uri": TOP, "cid": "bafytop" }
                    }
                }),
            )
    }

    #[tokio::test]
    async fn test_no_reply_target() {
        let repo = thread_repo();
        let reply = resolve_thread(&repo, None, &CancellationToken::new()).await.unwrap();
        assert!(reply.is_none());
        assert!(repo.get_record_calls().is_empty());
    }

    #[tokio::test]
    async fn test_reply_to_top_level_post_roots_at_parent() {
        let repo = thread_repo();
        let reply = resolve_thread(&repo, Some(TOP), &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.parent, StrongRef::new(TOP, "bafytop"));
        assert_eq!(reply.root, reply.parent);
    }

    #[tokio::test]
    async fn test_reply_to_reply_inherits_root() {
        let repo = thread_repo();
        let reply = resolve_thread(&repo, Some(MIDDLE), &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.parent, StrongRef::new(MIDDLE, "bafymiddle"));
        assert_eq!(reply.root, StrongRef::new(TOP, "bafytop"));
        assert_eq!(repo.get_record_calls(), vec![MIDDLE.to_string()]);
    }

    #[tokio::test]
    async fn test_empty_stored_root_falls_back_to_parent() {
        let repo = MockRepository::new().with_record(
            MIDDLE,
            "bafymiddle",
            json!({ "reply": { "root": { "uri": "", "cid": "" } } }),
        );
        let reply = resolve_thread(&repo, Some(MIDDLE), &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.root, StrongRef::new(MIDDLE, "bafymiddle"));
    }

    #[tokio::test]
    async fn test_missing_parent_is_fatal() {
        let repo = MockRepository::new();
        let err = resolve_thread(&repo, Some(TOP), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SkycastError::Resolution { stage: Stage::Thread, .. }));
    }

    #[tokio::test]
    async fn test_malformed_target() {
        let repo = MockRepository::new();
        let err = resolve_thread(&repo, Some("https://bsky.app/post/1"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SkycastError::Validation(_)));
        assert!(repo.get_record_calls().is_empty());
    }
}
