//! The pending-queue coalescer.
//!
//! Local edits enter the queue through [`coalesce`]. Consecutive edits to the
//! same cell collapse into one record (field-level last-write-wins), so a
//! burst of keystrokes produces a single change request instead of one per
//! keystroke. Only the queue tail is ever merged into: queue order encodes
//! causal edit order across distinct cells, and merging past a non-matching
//! entry could reorder effects.

use cellbook_types::CellChange;

/// Append or merge a local change into the pending queue.
///
/// Transient fields (`modified`; non-empty `outputs`) are stripped before the
/// change is stored — the queue is the canonical record of what was
/// requested, and those fields are not part of any request.
pub fn coalesce(mut queue: Vec<CellChange>, change: CellChange) -> Vec<CellChange> {
    let change = change.strip_transients();
    match queue.last_mut() {
        Some(last) if last.cell_id == change.cell_id => last.merge_from(&change),
        _ => queue.push(change),
    }
    queue
}

// ============================================================================
// Tests
// ============================================================================
