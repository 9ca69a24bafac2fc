//! Push events and user-visible alerts.
//!
//! [`NotebookEvent`] is the typed form of what the authority broadcasts over
//! its publish/subscribe channel, keyed by notebook. The transport glue
//! deserializes whatever it receives into these and feeds them to
//! [`NotebookStore::handle_event`](crate::NotebookStore::handle_event).
//!
//! [`Alert`] records are fanned out on a broadcast channel for the UI to
//! display; they are emitted once at the point of failure and never retried.

use serde_json::Value;

use cellbook_types::{CellChange, CellId, KernelState, NotebookId};

/// Events pushed from the authority, by notebook.
#[derive(Clone, Debug)]
pub enum NotebookEvent {
    /// A cell was created or updated. The payload is the authority's echo of
    /// the full cell as a change record.
    CellUpdated {
        notebook_id: NotebookId,
        change: CellChange,
    },
    /// A cell was deleted. The change carries `delete: true` and the removed
    /// cell's index, so it flows through the applier unchanged.
    CellDeleted {
        notebook_id: NotebookId,
        change: CellChange,
    },
    /// A cell produced execution output. Some authorities embed the outputs
    /// in the event; others send only the notification and expect a fetch.
    CellOutput {
        notebook_id: NotebookId,
        cell_id: CellId,
        outputs: Option<Vec<Value>>,
    },
    /// The kernel's execution state changed. Not routed through the applier —
    /// it updates the session entry's state field only.
    KernelStateChanged {
        notebook_id: NotebookId,
        state: KernelState,
    },
}

impl NotebookEvent {
    /// The notebook this event belongs to.
    pub fn notebook_id(&self) -> &NotebookId {
        match self {
            NotebookEvent::CellUpdated { notebook_id, .. }
            | NotebookEvent::CellDeleted { notebook_id, .. }
            | NotebookEvent::CellOutput { notebook_id, .. }
            | NotebookEvent::KernelStateChanged { notebook_id, .. } => notebook_id,
        }
    }
}

/// A user-visible failure notice.
#[derive(Clone, Debug)]
pub struct Alert {
    pub notebook_id: NotebookId,
    /// The authority's error description, or a transport error summary.
    pub message: String,
}
