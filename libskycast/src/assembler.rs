//! Post assembly
//!
//! [`assemble`] is the last, pure step of composition: it merges the draft
//! with everything resolved over the network into one [`ComposedRecord`],
//! checking the record's invariants on the way. It performs no I/O.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::draft::{EmbedDirective, PostDraft};
use crate::error::{Result, SkycastError};
use crate::scanner::{locate_inline_link, scan_hashtags, scan_links};
use crate::types::{ComposedRecord, Facet, ReplyRef, ResolvedEmbed, ResolvedMention};

/// Everything composition fetched on behalf of a draft.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedParts {
    /// Mentions whose handles resolved; unresolved candidates are simply absent.
    pub mentions: Vec<ResolvedMention>,
    pub embed: ResolvedEmbed,
    pub reply: Option<ReplyRef>,
}

/// Build the final record for `draft`.
///
/// # Errors
///
/// Returns `SkycastError::Validation` when the draft selects more than one
/// embed, when an inline link's text is missing from the body, when a facet
/// span does not fit the body, or when the resolved parts do not correspond to
/// what the draft asked for.
pub fn assemble(
    draft: &PostDraft,
    parts: ResolvedParts,
    created_at: DateTime<Utc>,
) -> Result<ComposedRecord> {
    let directive = draft.embed_directive()?;
    check_embed_matches(directive, &parts.embed)?;
    check_reply_matches(draft.reply_to.as_deref(), parts.reply.as_ref())?;

    let text = draft.text.as_str();
    let mut facets = Vec::new();

    for mention in &parts.mentions {
        let expected = format!("@{}", mention.handle);
        if mention.span.slice(text) != Some(expected.as_str()) {
            return Err(SkycastError::Validation(format!(
                "mention of {} does not match the post text at {}..{}",
                mention.handle, mention.span.start, mention.span.end
            )));
        }
        facets.push(Facet::mention(mention.span, mention.did.clone()));
    }

    for link in scan_links(text) {
        facets.push(Facet::link(link.span, link.value));
    }

    for inline in &draft.inline_links {
        let span = locate_inline_link(text, inline)?;
        facets.push(Facet::link(span, inline.url.clone()));
    }

    for hashtag in scan_hashtags(text) {
        facets.push(Facet::tag(hashtag.span, hashtag.value));
    }

    for facet in &facets {
        facet.span.validate_in(text)?;
    }

    Ok(ComposedRecord::new(
        draft.text.clone(),
        created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        draft.effective_langs(),
        draft.tags.clone(),
        facets,
        parts.embed.into_embed(),
        parts.reply,
    ))
}

fn check_embed_matches(directive: Option<EmbedDirective<'_>>, embed: &ResolvedEmbed) -> Result<()> {
    let matches = match (directive, embed) {
        (None, ResolvedEmbed::None) => true,
        (Some(EmbedDirective::Link(_)), ResolvedEmbed::External(_)) => true,
        (Some(EmbedDirective::Quote(_)), ResolvedEmbed::Record(_)) => true,
        (Some(EmbedDirective::Images(requested)), ResolvedEmbed::Images(uploaded)) => {
            if requested.len() != uploaded.len() {
                return Err(SkycastError::Validation(format!(
                    "{} images requested but {} uploaded",
                    requested.len(),
                    uploaded.len()
                )));
            }
            true
        }
        _ => false,
    };

    if matches {
        Ok(())
    } else {
        Err(SkycastError::Validation(
            "resolved embed does not match the requested embed".to_string(),
        ))
    }
}

fn check_reply_matches(reply_to: Option<&str>, reply: Option<&ReplyRef>) -> Result<()> {
    match (reply_to, reply) {
        (None, None) => Ok(()),
        (Some(target), Some(reply)) if reply.parent.uri == target && !reply.root.is_empty() => {
            Ok(())
        }
        (Some(target), Some(_)) => Err(SkycastError::Validation(format!(
            "reply reference does not point at {}",
            target
        ))),
        (Some(target), None) => Err(SkycastError::Validation(format!(
            "reply to {} was not resolved",
            target
        ))),
        (None, Some(_)) => Err(SkycastError::Validation(
            "reply reference given for a post that is not a reply".to_string(),
        )),
    }
}
