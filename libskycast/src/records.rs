//! Record operations outside composition: reposting, deleting and listing.

use chrono::{SecondsFormat, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cancel::cancellable;
use crate::error::{Result, SkycastError, Stage};
use crate::repository::Repository;
use crate::types::{AtUri, CreatedRecord, FetchedRecord, POST_COLLECTION, REPOST_COLLECTION};

/// Largest page the listRecords endpoint accepts.
pub const MAX_PAGE_SIZE: usize = 100;

/// Repost the post at `uri`, pinned to its current CID.
pub async fn repost(
    repository: &dyn Repository,
    uri: &str,
    token: &CancellationToken,
) -> Result<CreatedRecord> {
    let at_uri: AtUri = uri.parse()?;
    let target = cancellable(token, repository.get_record(&at_uri))
        .await
        .map_err(|e| e.at_stage(Stage::Repost, uri))?;

    let record = json!({
        "$type": REPOST_COLLECTION,
        "subject": { "uri": uri, "cid": target.cid },
        "createdAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    });
    let created = cancellable(token, repository.create_record(REPOST_COLLECTION, &record))
        .await
        .map_err(|e| e.at_stage(Stage::Submit, REPOST_COLLECTION))?;

    info!("Reposted {} as {}", uri, created.uri);
    Ok(created)
}

/// Delete a post or repost by its at:// URI.
pub async fn delete_post(
    repository: &dyn Repository,
    uri: &str,
    token: &CancellationToken,
) -> Result<()> {
    let at_uri: AtUri = uri.parse()?;
    if at_uri.collection != POST_COLLECTION && at_uri.collection != REPOST_COLLECTION {
        return Err(SkycastError::Validation(format!(
            "{} is not a post or repost",
            uri
        )));
    }

    cancellable(token, repository.delete_record(&at_uri.collection, &at_uri.rkey)).await?;
    info!("Deleted {}", uri);
    Ok(())
}

/// Walk `collection` of `repo` page by page.
///
/// Stops when the listing runs out, when the service hands back the cursor it
/// was given, or once `max` records have been gathered.
/// `page_size` is clamped to `1..=MAX_PAGE_SIZE`.
pub async fn collect_records(
    repository: &dyn Repository,
    repo: &str,
    collection: &str,
    page_size: usize,
    max: Option<usize>,
    token: &CancellationToken,
) -> Result<Vec<FetchedRecord>> {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let mut records = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let wanted = match max {
            Some(max) if records.len() >= max => break,
            Some(max) => page_size.min(max - records.len()),
            None => page_size,
        };

        let page = cancellable(
            token,
            repository.list_records(repo, collection, cursor.as_deref(), wanted),
        )
        .await?;
        debug!(
            "Listed {} records from {} (cursor: {:?})",
            page.records.len(),
            collection,
            page.cursor
        );

        let exhausted = page.records.is_empty();
        let stalled = page.cursor.is_some() && page.cursor == cursor;
        records.extend(page.records);
        cursor = page.cursor;
        if cursor.is_none() || exhausted || stalled {
            break;
        }
    }

    if let Some(max) = max {
        records.truncate(max);
    }
    Ok(records)
}
