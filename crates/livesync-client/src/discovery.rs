//! Bounded discovery sessions.
//!
//! A stateless caller has no subscription to lean on and the store never says
//! "that was everything". [`discover`] opens a one-shot enumeration, collects
//! matching records until the deadline (or an early exit), and closes it.
//!
//! The result is complete only up to what arrived in time. An empty result
//! means "not found yet".

use std::collections::HashMap;
use std::time::Duration;

use livesync_store::StoreResult;
use livesync_types::{FileId, FileRecord, Record};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::room_store::RoomStore;
use crate::view::pick_newest;

/// When a session may resolve before its deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopWhen {
    /// Collect for the whole window.
    Deadline,
    /// Resolve on the first matching record.
    FirstMatch,
}

/// Session policy.
#[derive(Clone, Debug)]
pub struct DiscoveryOptions {
    pub deadline: Duration,
    pub stop_when: StopWhen,
    /// Optional external cancellation.
    pub cancel: Option<CancellationToken>,
}

impl DiscoveryOptions {
    /// Collect for the full `deadline`.
    pub fn until(deadline: Duration) -> Self {
        Self {
            deadline,
            stop_when: StopWhen::Deadline,
            cancel: None,
        }
    }

    /// Resolve on the first match, or at `deadline`.
    pub fn first_match(deadline: Duration) -> Self {
        Self {
            deadline,
            stop_when: StopWhen::FirstMatch,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// How a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ended {
    Deadline,
    EarlyExit,
    Cancelled,
    StoreClosed,
}

/// What a session collected.
#[derive(Clone, Debug)]
pub struct Discovery {
    pub matches: HashMap<FileId, FileRecord>,
    pub ended: Ended,
    pub elapsed: Duration,
}

impl Discovery {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// The newest match, ties broken by the greater id.
    pub fn newest(&self) -> Option<&FileRecord> {
        pick_newest(self.matches.values())
    }

    /// Matches sorted by name, then id.
    pub fn into_sorted(self) -> Vec<FileRecord> {
        let mut files: Vec<_> = self.matches.into_values().collect();
        files.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.as_str().cmp(b.id.as_str())));
        files
    }
}

/// Collect records satisfying `predicate` within the session policy.
///
/// Never blocks past the deadline. The one-shot enumeration is dropped when
/// the session ends, so nothing outlives the call.
pub async fn discover<P>(
    store: &RoomStore,
    predicate: P,
    options: DiscoveryOptions,
) -> StoreResult<Discovery>
where
    P: Fn(&FileRecord) -> bool,
{
    let mut events = store.snapshot_events()?;
    let start = Instant::now();
    let deadline = tokio::time::sleep(options.deadline);
    tokio::pin!(deadline);
    let cancel = options.cancel.unwrap_or_default();

    let mut matches = HashMap::new();
    let ended = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ended::Cancelled,
            _ = &mut deadline => break Ended::Deadline,
            event = events.recv() => {
                let Some(event) = event else {
                    break Ended::StoreClosed;
                };
                match event.record {
                    Record::Present(file) if predicate(&file) => {
                        trace!(id = %event.id, name = %file.name, "Discovered match");
                        matches.insert(event.id, file);
                        if options.stop_when == StopWhen::FirstMatch {
                            break Ended::EarlyExit;
                        }
                    }
                    Record::Present(_) => {}
                    // Latest delivery per id wins.
                    Record::Tombstone => {
                        matches.remove(&event.id);
                    }
                }
            }
        }
    };

    let elapsed = start.elapsed();
    debug!(
        room = %store.room(),
        matches = matches.len(),
        ?ended,
        elapsed_ms = elapsed.as_millis() as u64,
        "Discovery session finished"
    );
    Ok(Discovery { matches, ended, elapsed })
}

/// Every present record seen within `deadline`.
pub async fn discover_all(store: &RoomStore, deadline: Duration) -> StoreResult<Discovery> {
    discover(store, |_| true, DiscoveryOptions::until(deadline)).await
}

/// Records named exactly `name`.
pub async fn discover_by_name(
    store: &RoomStore,
    name: &str,
    options: DiscoveryOptions,
) -> StoreResult<Discovery> {
    discover(store, |file| file.name == name, options).await
}
