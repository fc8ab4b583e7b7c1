//! Core types for Skycast
//!
//! Everything that ends up in a post record lives here, together with the
//! AT Protocol wire names it serializes to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SkycastError};

pub const POST_COLLECTION: &str = "app.bsky.feed.post";
pub const REPOST_COLLECTION: &str = "app.bsky.feed.repost";

// ============================================================================
// Text spans and annotation candidates
// ============================================================================

/// Half-open byte range `[start, end)` into UTF-8 post text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextSpan {
    #[serde(rename = "byteStart")]
    pub start: usize,
    #[serde(rename = "byteEnd")]
    pub end: usize,
}

impl TextSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// The text this span covers, or `None` when it does not fit `text`.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.start..self.end)
    }

    /// Check that the span is non-empty, inside `text`, and cut on character
    /// boundaries.
    pub fn validate_in(&self, text: &str) -> Result<()> {
        if self.is_empty() {
            return Err(SkycastError::Validation(format!(
                "facet span {}..{} is empty",
                self.start, self.end
            )));
        }
        if self.end > text.len() {
            return Err(SkycastError::Validation(format!(
                "facet span {}..{} exceeds text length {}",
                self.start,
                self.end,
                text.len()
            )));
        }
        if !text.is_char_boundary(self.start) || !text.is_char_boundary(self.end) {
            return Err(SkycastError::Validation(format!(
                "facet span {}..{} splits a UTF-8 character",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateKind {
    Mention,
    Link,
    Hashtag,
}

/// A span the scanner believes may carry an annotation.
///
/// `value` is what downstream stages consume: the handle without its `@`,
/// the URL, or the hashtag name without `#` and trailing punctuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationCandidate {
    pub span: TextSpan,
    pub kind: CandidateKind,
    pub value: String,
}

/// A mention candidate whose handle resolved to a DID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMention {
    pub span: TextSpan,
    pub handle: String,
    pub did: String,
}

// ============================================================================
// Facets
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention { did: String },
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
}

/// A byte-range annotation over post text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    #[serde(rename = "index")]
    pub span: TextSpan,
    pub features: Vec<FacetFeature>,
}

impl Facet {
    pub fn new(span: TextSpan, feature: FacetFeature) -> Self {
        Self {
            span,
            features: vec![feature],
        }
    }

    pub fn mention(span: TextSpan, did: impl Into<String>) -> Self {
        Self::new(span, FacetFeature::Mention { did: did.into() })
    }

    pub fn link(span: TextSpan, uri: impl Into<String>) -> Self {
        Self::new(span, FacetFeature::Link { uri: uri.into() })
    }

    pub fn tag(span: TextSpan, tag: impl Into<String>) -> Self {
        Self::new(span, FacetFeature::Tag { tag: tag.into() })
    }

    pub fn feature(&self) -> Option<&FacetFeature> {
        self.features.first()
    }
}

// ============================================================================
// Blobs, references and embeds
// ============================================================================

fn blob_type() -> String {
    "blob".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidLink {
    #[serde(rename = "$link")]
    pub link: String,
}

/// Handle to an uploaded blob. Only ever obtained from an upload response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRef {
    #[serde(rename = "$type", default = "blob_type")]
    pub blob_type: String,
    #[serde(rename = "ref")]
    pub reference: CidLink,
    pub mime_type: String,
    pub size: u64,
}

/// Pointer to an exact record version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

impl StrongRef {
    pub fn new(uri: impl Into<String>, cid: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            cid: cid.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.uri.is_empty() || self.cid.is_empty()
    }
}

/// Thread position of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub root: StrongRef,
    pub parent: StrongRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
    pub uri: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<BlobRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedImage {
    pub alt: String,
    pub image: BlobRef,
}

/// Wire form of a post embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum Embed {
    #[serde(rename = "app.bsky.embed.external")]
    External { external: ExternalLink },
    #[serde(rename = "app.bsky.embed.images")]
    Images { images: Vec<EmbeddedImage> },
    #[serde(rename = "app.bsky.embed.record")]
    Record { record: StrongRef },
}

/// Result of embed resolution. `None` is a real variant so that "no embed"
/// never has to be encoded as an empty embed value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResolvedEmbed {
    #[default]
    None,
    External(ExternalLink),
    Images(Vec<EmbeddedImage>),
    Record(StrongRef),
}

impl ResolvedEmbed {
    pub fn is_none(&self) -> bool {
        matches!(self, ResolvedEmbed::None)
    }

    pub fn into_embed(self) -> Option<Embed> {
        match self {
            ResolvedEmbed::None => None,
            ResolvedEmbed::External(external) => Some(Embed::External { external }),
            ResolvedEmbed::Images(images) => Some(Embed::Images { images }),
            ResolvedEmbed::Record(record) => Some(Embed::Record { record }),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

fn post_type() -> String {
    POST_COLLECTION.to_string()
}

/// A fully assembled post, ready for submission.
///
/// Built once by the assembler; fields are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedRecord {
    #[serde(rename = "$type", default = "post_type")]
    record_type: String,
    text: String,
    created_at: String,
    langs: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    facets: Vec<Facet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    embed: Option<Embed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply: Option<ReplyRef>,
}

impl ComposedRecord {
    pub(crate) fn new(
        text: String,
        created_at: String,
        langs: Vec<String>,
        tags: Vec<String>,
        facets: Vec<Facet>,
        embed: Option<Embed>,
        reply: Option<ReplyRef>,
    ) -> Self {
        Self {
            record_type: post_type(),
            text,
            created_at,
            langs,
            tags,
            facets,
            embed,
            reply,
        }
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn langs(&self) -> &[String] {
        &self.langs
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn facets(&self) -> &[Facet] {
        &self.facets
    }

    pub fn embed(&self) -> Option<&Embed> {
        self.embed.as_ref()
    }

    pub fn reply(&self) -> Option<&ReplyRef> {
        self.reply.as_ref()
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Response of a record creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRecord {
    pub uri: String,
    pub cid: String,
}

/// A record read back from the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedRecord {
    pub uri: String,
    pub cid: String,
    pub value: serde_json::Value,
}

/// One page of a collection listing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordPage {
    pub records: Vec<FetchedRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

// ============================================================================
// AT-URIs
// ============================================================================

/// Location of a record: `at://<authority>/<collection>/<rkey>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtUri {
    pub authority: String,
    pub collection: String,
    pub rkey: String,
}

impl AtUri {
    pub fn new(
        authority: impl Into<String>,
        collection: impl Into<String>,
        rkey: impl Into<String>,
    ) -> Self {
        Self {
            authority: authority.into(),
            collection: collection.into(),
            rkey: rkey.into(),
        }
    }
}

impl FromStr for AtUri {
    type Err = SkycastError;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s.strip_prefix("at://").ok_or_else(|| {
            SkycastError::Validation(format!("'{}' is not an at:// URI", s))
        })?;
        let parts: Vec<&str> = rest.trim_end_matches('/').split('/').collect();
        match parts.as_slice() {
            [authority, collection, rkey]
                if !authority.is_empty() && !collection.is_empty() && !rkey.is_empty() =>
            {
                Ok(Self::new(*authority, *collection, *rkey))
            }
            _ => Err(SkycastError::Validation(format!(
                "'{}' must have the form at://<repo>/<collection>/<rkey>",
                s
            ))),
        }
    }
}

impl fmt::Display for AtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at://{}/{}/{}", self.authority, self.collection, self.rkey)
    }
}

// ============================================================================
// Image MIME types
// ============================================================================

/// Image formats accepted for blob upload
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMimeType {
    /// Detect MIME type from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detect MIME type from the leading bytes of the image
    pub fn from_magic_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(Self::WebP)
        } else {
            None
        }
    }

    /// Sniff the content first, then fall back to the location's extension.
    pub fn detect(bytes: &[u8], location: &str) -> Option<Self> {
        Self::from_magic_bytes(bytes).or_else(|| {
            let path = location.split(['?', '#']).next().unwrap_or(location);
            path.rsplit_once('.')
                .and_then(|(_, ext)| Self::from_extension(ext))
        })
    }

    /// Get the MIME type string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }
}

impl fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
