//! Text annotation scanning
//!
//! Finds mention, link and hashtag candidates in post text. All offsets are
//! UTF-8 byte offsets, which is what the record's facet indexes use; `regex`
//! match positions over `&str` are already byte offsets.
//!
//! Candidates of different kinds may overlap. Nothing here deduplicates or
//! merges spans.

use lazy_static::lazy_static;
use regex::Regex;

use crate::draft::InlineLink;
use crate::error::{Result, SkycastError};
use crate::types::{AnnotationCandidate, CandidateKind, TextSpan};

/// DNS-name-like token: dot-separated labels ending in an alphabetic TLD.
const DOMAIN_PATTERN: &str = r"[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*\.[a-zA-Z]{2,10}";

lazy_static! {
    // `@handle` preceded by start of text or a non-alphanumeric character
    static ref MENTION_REGEX: Regex =
        Regex::new(&format!(r"(?:^|[^a-zA-Z0-9])(@{})", DOMAIN_PATTERN)).unwrap();

    // http(s) URL whose path segments are themselves domain-like
    static ref LINK_REGEX: Regex = Regex::new(&format!(
        r"https?://{d}(?:/(?:{d})+)*/?",
        d = DOMAIN_PATTERN
    ))
    .unwrap();

    // `#tag` at start of text or after whitespace, not starting with an ASCII digit
    static ref HASHTAG_REGEX: Regex = Regex::new(r"(?:^|\s)(#[^0-9\s]\S*)").unwrap();

    // Run of Unicode punctuation (general category P) at the end of a tag
    static ref TRAILING_PUNCTUATION_REGEX: Regex = Regex::new(r"\p{P}+$").unwrap();
}

/// Scan `text` for every annotation candidate.
///
/// Results are grouped by kind (mentions, links, hashtags), each group in
/// text order.
pub fn scan(text: &str) -> Vec<AnnotationCandidate> {
    let mut candidates = scan_mentions(text);
    candidates.extend(scan_links(text));
    candidates.extend(scan_hashtags(text));
    candidates
}

/// Mention candidates. The span includes the `@`; the value does not.
pub fn scan_mentions(text: &str) -> Vec<AnnotationCandidate> {
    MENTION_REGEX
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| AnnotationCandidate {
            span: TextSpan::new(m.start(), m.end()),
            kind: CandidateKind::Mention,
            value: m.as_str()[1..].to_string(),
        })
        .collect()
}

pub fn scan_links(text: &str) -> Vec<AnnotationCandidate> {
    LINK_REGEX
        .find_iter(text)
        .map(|m| AnnotationCandidate {
            span: TextSpan::new(m.start(), m.end()),
            kind: CandidateKind::Link,
            value: m.as_str().to_string(),
        })
        .collect()
}

/// Hashtag candidates. The span starts at `#` and stops before any trailing
/// punctuation; tags that are nothing but punctuation are skipped.
pub fn scan_hashtags(text: &str) -> Vec<AnnotationCandidate> {
    HASHTAG_REGEX
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| {
            let tag = strip_hashtag(m.as_str());
            if tag.is_empty() {
                return None;
            }
            let start = m.start();
            Some(AnnotationCandidate {
                span: TextSpan::new(start, start + 1 + tag.len()),
                kind: CandidateKind::Hashtag,
                value: tag.to_string(),
            })
        })
        .collect()
}

/// `#tag!?` -> `tag`. Symbols such as `+` are part of the tag; only
/// punctuation is trimmed.
pub fn strip_hashtag(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_hash = trimmed.strip_prefix('#').unwrap_or(trimmed);
    match TRAILING_PUNCTUATION_REGEX.find(without_hash) {
        Some(m) => &without_hash[..m.start()],
        None => without_hash,
    }
}

/// Byte span of the first occurrence of `needle` in `text`.
pub fn find_first_substring(text: &str, needle: &str) -> Option<TextSpan> {
    if needle.is_empty() {
        return None;
    }
    text.find(needle)
        .map(|start| TextSpan::new(start, start + needle.len()))
}

/// Locate a caller-supplied inline link. Only the first occurrence of the
/// display text is linked.
///
/// # Errors
///
/// Returns `SkycastError::Validation` when the display text is empty or does
/// not appear in `text`.
pub fn locate_inline_link(text: &str, link: &InlineLink) -> Result<TextSpan> {
    if link.text.is_empty() {
        return Err(SkycastError::Validation(format!(
            "inline link to {} has empty display text",
            link.url
        )));
    }
    find_first_substring(text, &link.text).ok_or_else(|| {
        SkycastError::Validation(format!(
            "inline link text '{}' not found in post text",
            link.text
        ))
    })
}
