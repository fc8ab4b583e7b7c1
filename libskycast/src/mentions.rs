//! Mention resolution
//!
//! Every `@handle` candidate gets one directory lookup, in scan order. A
//! failed lookup means "this was not a mention": ordinary `@word` text is
//! common and must not block posting, so the candidate is dropped and the
//! error goes no further than a debug log. Only cancellation aborts.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cancel::cancellable;
use crate::error::{Result, SkycastError};
use crate::repository::HandleResolver;
use crate::types::{AnnotationCandidate, CandidateKind, ResolvedMention};

/// Resolve the mention candidates among `candidates`; other kinds are ignored.
///
/// # Errors
///
/// Returns `SkycastError::Cancelled` if `token` fires. Lookup failures are
/// never returned.
pub async fn resolve_mentions(
    resolver: &dyn HandleResolver,
    candidates: &[AnnotationCandidate],
    token: &CancellationToken,
) -> Result<Vec<ResolvedMention>> {
    let mut resolved = Vec::new();

    for candidate in candidates
        .iter()
        .filter(|c| c.kind == CandidateKind::Mention)
    {
        match cancellable(token, resolver.resolve_handle(&candidate.value)).await {
            Ok(did) => {
                debug!("Resolved @{} to {}", candidate.value, did);
                resolved.push(ResolvedMention {
                    span: candidate.span,
                    handle: candidate.value.clone(),
                    did,
                });
            }
            Err(SkycastError::Cancelled) => return Err(SkycastError::Cancelled),
            Err(e) => {
                debug!("Dropping mention @{}: {}", candidate.value, e);
            }
        }
    }

    Ok(resolved)
}
