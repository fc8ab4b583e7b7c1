//! Embed resolution
//!
//! Turns the draft's single embed directive into a [`ResolvedEmbed`]:
//! uploading images, building a link preview from the target page's
//! Open Graph / Twitter card tags, or pinning a quoted record to its current
//! CID. Every failure here is fatal; a post never goes out with half an embed.

use std::collections::HashMap;

use futures::future::try_join_all;
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::cancel::cancellable;
use crate::draft::{EmbedDirective, ImageSource};
use crate::error::{Result, SkycastError, Stage};
use crate::fetch::{ByteSource, PageMetadataFetcher};
use crate::repository::Repository;
use crate::types::{AtUri, BlobRef, EmbeddedImage, ExternalLink, ImageMimeType, ResolvedEmbed, StrongRef};

lazy_static! {
    static ref META_SELECTOR: Selector = Selector::parse("meta").unwrap();
}

/// Collect `og:*` (from `property`) and `twitter:*` (from `name`) meta tags,
/// keyed without their prefix. Later tags overwrite earlier ones with the
/// same key; tags with empty content are ignored.
pub fn extract_meta_tags(html: &str) -> HashMap<String, String> {
    let document = Html::parse_document(html);
    let mut tags = HashMap::new();

    for element in document.select(&META_SELECTOR) {
        let meta = element.value();
        let key = meta
            .attr("property")
            .and_then(|p| p.strip_prefix("og:"))
            .or_else(|| meta.attr("name").and_then(|n| n.strip_prefix("twitter:")));
        let content = meta.attr("content").unwrap_or_default();

        if let Some(key) = key {
            if !key.is_empty() && !content.is_empty() {
                tags.insert(key.to_string(), content.to_string());
            }
        }
    }

    tags
}

/// Resolves embed directives against the repository and the web.
pub struct EmbedResolver<'a> {
    repository: &'a dyn Repository,
    pages: &'a dyn PageMetadataFetcher,
    bytes: &'a dyn ByteSource,
}

impl<'a> EmbedResolver<'a> {
    pub fn new(
        repository: &'a dyn Repository,
        pages: &'a dyn PageMetadataFetcher,
        bytes: &'a dyn ByteSource,
    ) -> Self {
        Self {
            repository,
            pages,
            bytes,
        }
    }

    pub async fn resolve(
        &self,
        directive: Option<EmbedDirective<'_>>,
        token: &CancellationToken,
    ) -> Result<ResolvedEmbed> {
        match directive {
            None => Ok(ResolvedEmbed::None),
            Some(EmbedDirective::Link(url)) => self.resolve_external(url, token).await,
            Some(EmbedDirective::Images(images)) => self.resolve_images(images, token).await,
            Some(EmbedDirective::Quote(uri)) => self.resolve_quote(uri, token).await,
        }
    }

    async fn resolve_external(&self, link: &str, token: &CancellationToken) -> Result<ResolvedEmbed> {
        let url = Url::parse(link)
            .map_err(|e| SkycastError::Validation(format!("invalid embed link '{}': {}", link, e)))?;

        let html = cancellable(token, self.pages.fetch_page(&url))
            .await
            .map_err(|e| e.at_stage(Stage::ExternalLink, link))?;
        let mut tags = extract_meta_tags(&html);
        debug!("Found {} metadata tags on {}", tags.len(), link);

        let thumb = match tags.remove("image") {
            Some(image) => {
                let image_url = url.join(&image).map_err(|e| {
                    SkycastError::Validation(format!("invalid preview image '{}': {}", image, e))
                        .at_stage(Stage::ExternalLink, link)
                })?;
                let blob = self
                    .upload_image(image_url.as_str(), token)
                    .await
                    .map_err(|e| e.at_stage(Stage::ExternalLink, image_url.as_str()))?;
                Some(blob)
            }
            None => None,
        };

        info!("Resolved link preview for {}", link);
        Ok(ResolvedEmbed::External(ExternalLink {
            uri: link.to_string(),
            title: tags.remove("title").unwrap_or_default(),
            description: tags.remove("description").unwrap_or_default(),
            thumb,
        }))
    }

    async fn resolve_images(
        &self,
        images: &[ImageSource],
        token: &CancellationToken,
    ) -> Result<ResolvedEmbed> {
        let uploads = images.iter().map(|source| async move {
            let blob = self
                .upload_image(&source.location, token)
                .await
                .map_err(|e| e.at_stage(Stage::Images, source.location.as_str()))?;
            Ok::<_, SkycastError>(EmbeddedImage {
                alt: source.alt.clone(),
                image: blob,
            })
        });
        let embedded = try_join_all(uploads).await?;

        info!("Uploaded {} images", embedded.len());
        Ok(ResolvedEmbed::Images(embedded))
    }

    async fn resolve_quote(&self, uri: &str, token: &CancellationToken) -> Result<ResolvedEmbed> {
        let at_uri: AtUri = uri.parse()?;
        let record = cancellable(token, self.repository.get_record(&at_uri))
            .await
            .map_err(|e| e.at_stage(Stage::Quote, uri))?;

        debug!("Quoting {} at {}", uri, record.cid);
        Ok(ResolvedEmbed::Record(StrongRef::new(uri, record.cid)))
    }

    async fn upload_image(&self, location: &str, token: &CancellationToken) -> Result<BlobRef> {
        let bytes = cancellable(token, self.bytes.fetch_bytes(location)).await?;
        let mime = ImageMimeType::detect(&bytes, location).ok_or_else(|| {
            SkycastError::Validation(format!("unsupported image format: {}", location))
        })?;
        debug!("Uploading {} ({}, {} bytes)", location, mime, bytes.len());
        cancellable(token, self.repository.upload_blob(bytes, mime.as_str())).await
    }
}
