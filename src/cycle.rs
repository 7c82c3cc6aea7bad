//! One poll cycle for one target.
//!
//! ```text
//! resolve handle ─► resolve user ─► create session ─► fetch page
//!                                                        │
//!                         store ◄── emit fresh ◄── diff ◄┘ (vs. stored page)
//! ```
//!
//! Any error aborts the cycle before the store is written, so a retried
//! cycle derives the same fresh items again.

use thiserror::Error;

use crate::bsky::{BskyError, FeedFetcher, SessionProvider};
use crate::config::Target;
use crate::diff::{diff, Diff};
use crate::emit::{EmitError, EventEmitter};
use crate::store::{SnapshotStore, StoreError};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Upstream(#[from] BskyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Emit(#[from] EmitError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    /// Number of items handed to the emitter.
    pub emitted: usize,
    /// Whether the stored snapshot was replaced.
    pub replaced: bool,
}

pub async fn run_cycle<C, E>(
    target: &Target,
    client: &C,
    store: &dyn SnapshotStore,
    emitter: &mut E,
) -> Result<CycleReport, CycleError>
where
    C: SessionProvider + FeedFetcher,
    E: EventEmitter + ?Sized,
{
    let operator = client.resolve_identity(&target.handle).await?;
    let author = client.resolve_identity(&target.user).await?;
    let snapshot = {
        let credential = client.create_session(&operator, &target.app_password).await?;
        client
            .fetch_author_feed(&author, &credential, target.limit)
            .await?
    };

    let previous = store.load(target.key())?;

    let fresh = match diff(&snapshot, previous.as_ref()) {
        Diff::Unchanged => {
            if target.debug {
                tracing::info!(user = %target.user, "no diff");
            }
            return Ok(CycleReport::default());
        }
        Diff::Changed { fresh, matched } => {
            // Nothing was compared on a cold start, so there is nothing to report.
            if let (true, Some(matched)) = (target.debug, matched) {
                for (item, found) in snapshot.feed.iter().zip(matched) {
                    tracing::info!(
                        user = %target.user,
                        key = item.key().unwrap_or("-"),
                        found,
                        "feed item"
                    );
                }
            }
            fresh
        }
    };

    for item in &fresh {
        emitter.emit(item)?;
    }
    store.store(target.key(), &snapshot)?;

    tracing::debug!(
        user = %target.user,
        emitted = fresh.len(),
        items = snapshot.feed.len(),
        "stored new snapshot"
    );
    Ok(CycleReport {
        emitted: fresh.len(),
        replaced: true,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
