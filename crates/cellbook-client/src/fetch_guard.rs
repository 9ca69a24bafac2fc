//! Request-deduplication guard for per-cell output fetches.
//!
//! An output notification can arrive many times for the same cell in quick
//! succession (streaming execution appends output repeatedly). Without a
//! guard, each notification would issue its own fetch. This converts the
//! pile-up into at most one in-flight request plus a tail of waiters.
//!
//! Per `(notebook_id, cell_id)` key the guard is a small state machine:
//!
//! ```text
//! idle ──claim──▶ in-flight ──claim──▶ in-flight-with-waiters
//!   ▲                │ permit dropped: clear slot, wake waiters
//!   └────────────────┘ (waiters resume on the next tick, not synchronously)
//! ```
//!
//! The first claimant becomes the leader and holds a [`FetchPermit`];
//! dropping the permit clears the slot and wakes every waiter. Woken waiters
//! are rescheduled via `yield_now` before resuming, so a wake never re-enters
//! caller state synchronously; the caller is expected to re-check whether the
//! output already arrived before claiming again.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use cellbook_types::{CellId, NotebookId};

type Key = (NotebookId, CellId);
type Slots = Arc<Mutex<HashMap<Key, watch::Receiver<bool>>>>;

/// Deduplicates concurrent output fetches per `(notebook, cell)`.
#[derive(Default)]
pub(crate) struct FetchGuard {
    slots: Slots,
}

/// Outcome of a claim attempt.
pub(crate) enum Claim {
    /// This caller should issue the fetch; the permit releases the slot.
    Leader(FetchPermit),
    /// Another fetch was in flight and has now completed. The caller should
    /// re-check for the output and only claim again if it's still missing.
    Waited,
}

impl FetchGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the fetch slot for a key, or wait out the in-flight holder.
    pub async fn claim(&self, key: Key) -> Claim {
        let waiter = {
            let mut slots = self.slots.lock();
            match slots.get(&key) {
                Some(rx) => rx.clone(),
                None => {
                    let (tx, rx) = watch::channel(false);
                    slots.insert(key.clone(), rx);
                    return Claim::Leader(FetchPermit {
                        key,
                        slots: Arc::clone(&self.slots),
                        done: tx,
                    });
                }
            }
        };

        // In flight: wait for the leader to finish. A closed channel means
        // the leader is gone either way, which also counts as finished.
        let mut waiter = waiter;
        let _ = waiter.wait_for(|done| *done).await;

        // Scheduled wake, not a synchronous resume.
        tokio::task::yield_now().await;
        Claim::Waited
    }

    /// Number of in-flight fetch slots (diagnostics and tests).
    pub fn in_flight(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Held by the leader while its fetch is outstanding.
pub(crate) struct FetchPermit {
    key: Key,
    slots: Slots,
    done: watch::Sender<bool>,
}

impl Drop for FetchPermit {
    fn drop(&mut self) {
        self.slots.lock().remove(&self.key);
        let _ = self.done.send(true);
    }
}

// ============================================================================
// Tests
// ============================================================================
