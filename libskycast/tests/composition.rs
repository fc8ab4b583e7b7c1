//! End-to-end composition tests
//!
//! These tests drive the full pipeline against in-memory collaborators:
//! - Facet detection and byte offsets in the submitted record
//! - Mention tolerance for unresolvable handles
//! - Thread root inheritance across a reply chain
//! - Fatal embed failures that must prevent submission

use std::sync::Arc;

use anyhow::Result;
use libskycast::composer::PostComposer;
use libskycast::draft::PostDraft;
use libskycast::error::{SkycastError, Stage};
use libskycast::mock::{MockDirectory, MockFetcher, MockRepository, PNG_BYTES};
use libskycast::records::collect_records;
use libskycast::types::POST_COLLECTION;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

struct Harness {
    repo: MockRepository,
    fetcher: MockFetcher,
    composer: PostComposer,
}

fn harness(repo: MockRepository, directory: MockDirectory, fetcher: MockFetcher) -> Harness {
    let shared = Arc::new(fetcher.clone());
    let composer = PostComposer::new(
        Arc::new(repo.clone()),
        Arc::new(directory),
        shared.clone(),
        shared,
    );
    Harness {
        repo,
        fetcher,
        composer,
    }
}

fn submitted(repo: &MockRepository) -> Vec<Value> {
    repo.created_records()
        .into_iter()
        .filter(|(collection, _)| collection == POST_COLLECTION)
        .map(|(_, record)| record)
        .collect()
}

#[tokio::test]
async fn test_plain_text_post_shape() -> Result<()> {
    let h = harness(MockRepository::new(), MockDirectory::new(), MockFetcher::new());

    h.composer
        .submit(&PostDraft::new("nothing special"), &CancellationToken::new())
        .await?;

    let records = submitted(&h.repo);
    assert_eq!(records.len(), 1);
    let record = records[0].as_object().unwrap();
    assert_eq!(record["$type"], "app.bsky.feed.post");
    assert_eq!(record["text"], "nothing special");
    assert_eq!(record["langs"], json!(["en"]));
    assert_eq!(record["tags"], json!([]));
    assert_eq!(record["facets"], json!([]));
    assert!(!record.contains_key("embed"));
    assert!(!record.contains_key("reply"));
    assert!(record["createdAt"].as_str().unwrap().ends_with('Z'));
    Ok(())
}

#[tokio::test]
async fn test_hashtag_and_link_facets_in_submitted_record() -> Result<()> {
    let h = harness(MockRepository::new(), MockDirectory::new(), MockFetcher::new());

    h.composer
        .submit(
            &PostDraft::new("hello #world and http://example.com"),
            &CancellationToken::new(),
        )
        .await?;

    let facets = submitted(&h.repo)[0]["facets"].clone();
    assert_eq!(
        facets,
        json!([
            {
                "index": { "byteStart": 17, "byteEnd": 35 },
                "features": [{ "$type": "app.bsky.richtext.facet#link", "uri": "http://example.com" }]
            },
            {
                "index": { "byteStart": 6, "byteEnd": 12 },
                "features": [{ "$type": "app.bsky.richtext.facet#tag", "tag": "world" }]
            }
        ])
    );
    Ok(())
}

#[tokio::test]
async fn test_unresolvable_mention_is_dropped() -> Result<()> {
    let directory = MockDirectory::new().with_handle("alice.bsky.social", "did:plc:alice");
    let h = harness(MockRepository::new(), directory.clone(), MockFetcher::new());

    h.composer
        .submit(
            &PostDraft::new("hi @alice.bsky.social and @not-a-real-handle.example"),
            &CancellationToken::new(),
        )
        .await?;

    let facets = submitted(&h.repo)[0]["facets"].clone();
    let facets = facets.as_array().unwrap();
    assert_eq!(facets.len(), 1);
    assert_eq!(facets[0]["features"][0]["did"], "did:plc:alice");
    assert_eq!(facets[0]["index"]["byteStart"], 3);
    assert_eq!(facets[0]["index"]["byteEnd"], 21);
    assert_eq!(directory.lookups().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_reply_to_reply_inherits_grandparent_root() -> Result<()> {
    let h = harness(MockRepository::new(), MockDirectory::new(), MockFetcher::new());
    let token = CancellationToken::new();

    let first = h.composer.submit(&PostDraft::new("first"), &token).await?;
    let second = h
        .composer
        .submit(&PostDraft::builder("second").reply_to(&first.uri).build()?, &token)
        .await?;
    h.composer
        .submit(&PostDraft::builder("third").reply_to(&second.uri).build()?, &token)
        .await?;

    let records = submitted(&h.repo);
    let second_reply = &records[1]["reply"];
    assert_eq!(second_reply["root"]["uri"], first.uri.as_str());
    assert_eq!(second_reply["parent"]["uri"], first.uri.as_str());

    let third_reply = &records[2]["reply"];
    assert_eq!(third_reply["root"]["uri"], first.uri.as_str());
    assert_eq!(third_reply["root"]["cid"], first.cid.as_str());
    assert_eq!(third_reply["parent"]["uri"], second.uri.as_str());
    assert_eq!(third_reply["parent"]["cid"], second.cid.as_str());
    Ok(())
}

#[tokio::test]
async fn test_conflicting_embeds_fail_before_network() -> Result<()> {
    let h = harness(MockRepository::new(), MockDirectory::new(), MockFetcher::new());
    let draft = PostDraft {
        text: "too much".into(),
        embed_link: Some("https://example.com".into()),
        images: Some(vec![libskycast::ImageSource {
            alt: "cat".into(),
            location: "cat.png".into(),
        }]),
        reply_to: Some("at://did:plc:x/app.bsky.feed.post/1".into()),
        ..Default::default()
    };

    let err = h.composer.submit(&draft, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, SkycastError::Validation(_)));
    assert_eq!(err.exit_code(), 3);
    assert!(h.fetcher.fetches().is_empty());
    assert!(h.repo.get_record_calls().is_empty());
    assert_eq!(h.repo.upload_count(), 0);
    assert_eq!(h.repo.create_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_second_of_three_uploads_failing_aborts_everything() -> Result<()> {
    let fetcher = MockFetcher::new()
        .with_bytes("one.png", PNG_BYTES)
        .with_bytes("two.png", PNG_BYTES)
        .with_bytes("three.png", PNG_BYTES);
    let h = harness(MockRepository::new().failing_upload_on(2), MockDirectory::new(), fetcher);
    let draft = PostDraft::builder("album")
        .image("one", "one.png")
        .image("two", "two.png")
        .image("three", "three.png")
        .build()?;

    let err = h.composer.compose(&draft, &CancellationToken::new()).await.unwrap_err();
    match &err {
        SkycastError::Resolution { stage, input, .. } => {
            assert_eq!(*stage, Stage::Images);
            assert_eq!(input, "two.png");
        }
        other => panic!("expected resolution error, got {:?}", other),
    }
    assert_eq!(h.repo.create_calls(), 0);
    assert!(submitted(&h.repo).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_link_preview_and_quote_round_trip_through_repository() -> Result<()> {
    let page = r#"<meta property="og:title" content="Example">
        <meta property="og:description" content="An example">
        <meta property="og:image" content="https://example.com/card.png">"#;
    let fetcher = MockFetcher::new()
        .with_page("https://example.com/article", page)
        .with_bytes("https://example.com/card.png", PNG_BYTES);
    let h = harness(MockRepository::new(), MockDirectory::new(), fetcher);
    let token = CancellationToken::new();

    let linked = h
        .composer
        .submit(
            &PostDraft::builder("worth reading")
                .embed_link("https://example.com/article")
                .build()?,
            &token,
        )
        .await?;
    h.composer
        .submit(&PostDraft::builder("this ^").quote(&linked.uri).build()?, &token)
        .await?;

    let records = submitted(&h.repo);
    let external = &records[0]["embed"];
    assert_eq!(external["$type"], "app.bsky.embed.external");
    assert_eq!(external["external"]["title"], "Example");
    assert_eq!(external["external"]["description"], "An example");
    assert_eq!(external["external"]["thumb"]["mimeType"], "image/png");

    let quote = &records[1]["embed"];
    assert_eq!(quote["$type"], "app.bsky.embed.record");
    assert_eq!(quote["record"]["uri"], linked.uri.as_str());
    assert_eq!(quote["record"]["cid"], linked.cid.as_str());
    Ok(())
}

#[tokio::test]
async fn test_history_lists_submitted_posts() -> Result<()> {
    let h = harness(MockRepository::new(), MockDirectory::new(), MockFetcher::new());
    let token = CancellationToken::new();
    for text in ["one", "two", "three"] {
        h.composer.submit(&PostDraft::new(text), &token).await?;
    }

    let history = collect_records(&h.repo, h.repo.did(), POST_COLLECTION, 2, None, &token).await?;
    let texts: Vec<&str> = history
        .iter()
        .filter_map(|r| r.value["text"].as_str())
        .collect();
    assert_eq!(texts, vec!["three", "two", "one"]);
    Ok(())
}
