//! Post drafts
//!
//! A [`PostDraft`] is the caller's complete description of a post before any
//! resolution happens. It is a plain value: build it with a struct literal or
//! with [`DraftBuilder`], then hand it to the composer.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SkycastError};

pub const DEFAULT_LANG: &str = "en";

/// Most images a single post can carry.
pub const MAX_IMAGES: usize = 4;

/// Caller-supplied link over a piece of the post text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineLink {
    /// Text in the post body that becomes clickable
    pub text: String,
    pub url: String,
}

/// An image to attach; `location` is either an http(s) URL or a local path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    pub alt: String,
    pub location: String,
}

/// The embed a draft asks for, borrowed from the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedDirective<'a> {
    Link(&'a str),
    Images(&'a [ImageSource]),
    Quote(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostDraft {
    pub text: String,
    pub tags: Vec<String>,
    pub inline_links: Vec<InlineLink>,
    pub langs: Vec<String>,
    pub reply_to: Option<String>,
    pub embed_link: Option<String>,
    pub images: Option<Vec<ImageSource>>,
    pub quote: Option<String>,
}

impl PostDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn builder(text: impl Into<String>) -> DraftBuilder {
        DraftBuilder {
            draft: Self::new(text),
        }
    }

    /// The single embed this draft selects, if any.
    ///
    /// # Errors
    ///
    /// Returns `SkycastError::Validation` when more than one embed kind is
    /// set, or when an image list is empty or longer than [`MAX_IMAGES`].
    pub fn embed_directive(&self) -> Result<Option<EmbedDirective<'_>>> {
        let mut selected = Vec::with_capacity(3);
        if let Some(url) = &self.embed_link {
            selected.push(EmbedDirective::Link(url));
        }
        if let Some(images) = &self.images {
            if images.is_empty() {
                return Err(SkycastError::Validation(
                    "image embed requested with no images".to_string(),
                ));
            }
            if images.len() > MAX_IMAGES {
                return Err(SkycastError::Validation(format!(
                    "a post can include at most {} images, got {}",
                    MAX_IMAGES,
                    images.len()
                )));
            }
            selected.push(EmbedDirective::Images(images));
        }
        if let Some(uri) = &self.quote {
            selected.push(EmbedDirective::Quote(uri));
        }

        if selected.len() > 1 {
            return Err(SkycastError::Validation(
                "a post can only include one type of embed (images, external link, or quoted post)"
                    .to_string(),
            ));
        }
        Ok(selected.pop())
    }

    /// Languages to record, defaulting to English when none were given.
    pub fn effective_langs(&self) -> Vec<String> {
        if self.langs.is_empty() {
            vec![DEFAULT_LANG.to_string()]
        } else {
            self.langs.clone()
        }
    }

    /// Checks that can run before any network call.
    pub fn validate(&self) -> Result<()> {
        self.embed_directive()?;
        for link in &self.inline_links {
            crate::scanner::locate_inline_link(&self.text, link)?;
        }
        Ok(())
    }
}

/// Consuming builder for [`PostDraft`].
#[derive(Debug, Clone)]
pub struct DraftBuilder {
    draft: PostDraft,
}

impl DraftBuilder {
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.draft.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.draft.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn inline_link(mut self, text: impl Into<String>, url: impl Into<String>) -> Self {
        self.draft.inline_links.push(InlineLink {
            text: text.into(),
            url: url.into(),
        });
        self
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.draft.langs.push(lang.into());
        self
    }

    pub fn langs<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.draft.langs.extend(langs.into_iter().map(Into::into));
        self
    }

    pub fn reply_to(mut self, uri: impl Into<String>) -> Self {
        self.draft.reply_to = Some(uri.into());
        self
    }

    pub fn embed_link(mut self, url: impl Into<String>) -> Self {
        self.draft.embed_link = Some(url.into());
        self
    }

    pub fn image(mut self, alt: impl Into<String>, location: impl Into<String>) -> Self {
        self.draft
            .images
            .get_or_insert_with(Vec::new)
            .push(ImageSource {
                alt: alt.into(),
                location: location.into(),
            });
        self
    }

    pub fn quote(mut self, uri: impl Into<String>) -> Self {
        self.draft.quote = Some(uri.into());
        self
    }

    /// Finish the draft, rejecting conflicting embeds.
    pub fn build(self) -> Result<PostDraft> {
        self.draft.embed_directive()?;
        Ok(self.draft)
    }
}
