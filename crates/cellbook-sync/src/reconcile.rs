//! The dedup reconciler: trim the confirmed prefix off the pending queue.
//!
//! After the authority confirms a batch (save acknowledgment or pushed
//! broadcast), the pending queue may contain records that are now durable and
//! must not be resent. [`reconcile`] walks both lists index by index and
//! returns the unconfirmed suffix. Trimming is conservative: the walk stops
//! at the first position whose pending record is not provably satisfied, so
//! edits made while a save was in flight always survive.

use cellbook_types::CellChange;

/// Compute the still-unconfirmed suffix of the pending queue.
///
/// A pending record at position `i` is satisfied when every identity field it
/// carries is present and structurally equal in `confirmed[i]` — see
/// [`CellChange::satisfied_by`]. `outputs` never participates. On the first
/// unsatisfied position the entire remainder of the queue is kept.
pub fn reconcile(prior: &[CellChange], confirmed: &[CellChange]) -> Vec<CellChange> {
    let walk = prior.len().min(confirmed.len());
    for i in 0..walk {
        if !prior[i].satisfied_by(&confirmed[i]) {
            return prior[i..].to_vec();
        }
    }
    if prior.len() <= confirmed.len() {
        Vec::new()
    } else {
        prior[confirmed.len()..].to_vec()
    }
}

// ============================================================================
// Tests
// ============================================================================
