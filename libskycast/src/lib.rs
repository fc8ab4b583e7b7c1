//! Skycast - compose and publish Bluesky posts from the command line
//!
//! This library turns a [`PostDraft`] into a complete `app.bsky.feed.post`
//! record: it detects mentions, links and hashtags in the text, resolves
//! handles, uploads images, builds link previews, pins quoted posts and
//! reply threads, and submits the result to the account's repository.

pub mod assembler;
pub mod cancel;
pub mod composer;
pub mod config;
pub mod draft;
pub mod embed;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod mentions;
pub mod mock;
pub mod records;
pub mod repository;
pub mod scanner;
pub mod thread;
pub mod types;
pub mod xrpc;

// Re-export commonly used types
pub use composer::PostComposer;
pub use config::Config;
pub use draft::{DraftBuilder, ImageSource, InlineLink, PostDraft};
pub use error::{Result, SkycastError, Stage};
pub use repository::{HandleResolver, Repository};
pub use types::{ComposedRecord, CreatedRecord, Facet, FacetFeature, ResolvedEmbed, TextSpan};
pub use xrpc::XrpcClient;
