//! Background feed polling.
//!
//! Each configured target gets its own tokio task that runs a cycle on
//! every tick of its interval and reports back to the main task over an
//! [`mpsc`] channel.  A task awaits its cycle before waiting for the next
//! tick, so cycles for one target never overlap; different targets run
//! independently.
//!
//! ## For contributors
//!
//! There is no explicit shutdown signal: a task stops the first time it
//! finds the receiver gone.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use crate::bsky::{FeedItem, XrpcClient};
use crate::config::Target;
use crate::cycle::{run_cycle, CycleReport};
use crate::emit::{EmitError, EventEmitter};
use crate::store::SnapshotStore;

/// Messages sent from the polling tasks to the main task.
#[derive(Debug)]
pub enum PollMsg {
    /// A new item for `user`'s feed, in emission order.
    Event { user: String, item: FeedItem },
    /// A cycle finished; every `Event` it produced was sent before this.
    CycleDone { user: String, report: CycleReport },
    /// A cycle failed with this error description.
    Error { user: String, error: String },
}

/// Emits by forwarding items to the main task.
pub struct ChannelEmitter {
    user: String,
    tx: mpsc::UnboundedSender<PollMsg>,
}

impl ChannelEmitter {
    pub fn new(user: impl Into<String>, tx: mpsc::UnboundedSender<PollMsg>) -> Self {
        Self {
            user: user.into(),
            tx,
        }
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit(&mut self, item: &FeedItem) -> Result<(), EmitError> {
        self.tx
            .send(PollMsg::Event {
                user: self.user.clone(),
                item: item.clone(),
            })
            .map_err(|_| EmitError::Closed)
    }
}

/// Spawn one polling task per target.
///
/// Returns a receiver that the main loop should drain.  Must be called
/// from within a tokio runtime.  Every request is bounded by
/// `request_timeout`, so a stalled upstream ends the cycle with an
/// `Error` and the next tick starts afresh.
pub fn spawn(
    targets: Vec<Target>,
    service_url: &str,
    request_timeout: Duration,
    store: Arc<dyn SnapshotStore>,
) -> anyhow::Result<mpsc::UnboundedReceiver<PollMsg>> {
    let (tx, rx) = mpsc::unbounded_channel();

    for target in targets {
        let client = XrpcClient::new(service_url, target.debug, request_timeout)?;
        let store = Arc::clone(&store);
        let tx = tx.clone();
        tokio::spawn(poll_target(target, client, store, tx));
    }

    Ok(rx)
}

async fn poll_target(
    target: Target,
    client: XrpcClient,
    store: Arc<dyn SnapshotStore>,
    tx: mpsc::UnboundedSender<PollMsg>,
) {
    let mut ticker = time::interval(target.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut emitter = ChannelEmitter::new(target.user.clone(), tx.clone());

    loop {
        ticker.tick().await;
        tracing::debug!(user = %target.user, "starting cycle");

        let msg = match run_cycle(&target, &client, store.as_ref(), &mut emitter).await {
            Ok(report) => PollMsg::CycleDone {
                user: target.user.clone(),
                report,
            },
            Err(e) => PollMsg::Error {
                user: target.user.clone(),
                error: e.to_string(),
            },
        };
        // If the receiver is gone the main task has exited; stop polling.
        if tx.send(msg).is_err() {
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
