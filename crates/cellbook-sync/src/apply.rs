//! The update applier: snapshot + ordered change batch → new snapshot.
//!
//! [`apply`] is pure and total — it never fails on well-formed input, never
//! mutates its argument, and resolves each change record (including sibling
//! reindexing) completely before starting the next. After every record the
//! notebook's index set is again exactly `0..len()`.
//!
//! Out-of-range target indices are clamped: a move past the end lands at the
//! last position, an insert past the end appends. Letting them through would
//! leave a gap in the ordering, which the rest of the system is entitled to
//! assume never exists.

use tracing::warn;

use cellbook_types::{Cell, CellChange, Notebook};

/// Apply an ordered batch of change records to a notebook snapshot.
///
/// `mark_modified` tags every touched cell (update and insert paths, not
/// delete) with the transient `modified` flag for the surrounding UI. The
/// flag carries no reconciliation semantics.
pub fn apply(notebook: &Notebook, changes: &[CellChange], mark_modified: bool) -> Notebook {
    if changes.is_empty() {
        return notebook.clone();
    }
    let mut nb = notebook.clone();
    for change in changes {
        if change.delete {
            apply_delete(&mut nb, change);
        } else if nb.contains(&change.cell_id) {
            apply_update(&mut nb, change, mark_modified);
        } else {
            apply_insert(&mut nb, change, mark_modified);
        }
        debug_assert!(nb.is_dense(), "index density broken by {change:?}");
    }
    nb
}

/// Remove a cell and close the gap it leaves.
///
/// Deleting an already-deleted cell is a warned no-op: delete events can
/// legitimately arrive after a local delete has been applied.
fn apply_delete(nb: &mut Notebook, change: &CellChange) {
    match nb.remove(&change.cell_id) {
        Some(removed) => {
            for cell in nb.iter_mut() {
                if cell.cell_index >= removed.cell_index {
                    cell.cell_index -= 1;
                }
            }
        }
        None => warn!(cell_id = %change.cell_id, "delete of nonexistent cell id"),
    }
}

/// Merge fields into an existing cell and, if the change carries a target
/// index, move it there — equivalent to removing the cell and reinserting,
/// preserving the relative order of all other cells.
fn apply_update(nb: &mut Notebook, change: &CellChange, mark_modified: bool) {
    let Some(old_index) = nb.index_of(&change.cell_id) else {
        return;
    };
    let last = nb.len().saturating_sub(1);
    let new_index = change.cell_index.map_or(old_index, |i| i.min(last));

    if old_index > new_index {
        // Moving toward the front: everything in [new, old) shifts right.
        for cell in nb.iter_mut() {
            if cell.cell_id != change.cell_id
                && cell.cell_index >= new_index
                && cell.cell_index < old_index
            {
                cell.cell_index += 1;
            }
        }
    } else if old_index < new_index {
        // Moving toward the back: everything in (old, new] shifts left.
        for cell in nb.iter_mut() {
            if cell.cell_id != change.cell_id
                && cell.cell_index > old_index
                && cell.cell_index <= new_index
            {
                cell.cell_index -= 1;
            }
        }
    }

    if let Some(cell) = nb.get_mut(&change.cell_id) {
        change.overlay(cell);
        cell.cell_index = new_index;
        if mark_modified {
            cell.modified = true;
        }
    }
}

/// Materialize a new cell with defaults overlaid by the change's fields.
fn apply_insert(nb: &mut Notebook, change: &CellChange, mark_modified: bool) {
    let count = nb.len();
    let target = change.cell_index.map_or(count, |i| i.min(count));
    if target < count {
        for cell in nb.iter_mut() {
            if cell.cell_index >= target {
                cell.cell_index += 1;
            }
        }
    }

    let mut cell = Cell::new(change.cell_id.clone(), target);
    change.overlay(&mut cell);
    if mark_modified {
        cell.modified = true;
    }
    nb.insert(cell);
}

// ============================================================================
// Tests
// ============================================================================
