//! Shared notebook types for cellbook.
//!
//! This crate is the data foundation: identifiers, cells, notebook snapshots,
//! change records, and kernel state. It has **no internal cellbook
//! dependencies** — a pure leaf crate the sync core and client build on.
//!
//! # Entity Overview
//!
//! ```text
//! Notebook (NotebookId) ← the document, held as an immutable snapshot
//!     └── maps CellId → Cell (dense cell_index ordering)
//!
//! CellChange ← one requested mutation (partial cell + cell_id)
//!     └── queued per notebook while unconfirmed (the pending queue)
//!     └── echoed back by the authority once durably applied
//!
//! KernelState ← execution state reported by the authority's kernel
//! ```
//!
//! The reconciliation functions over these types live in `cellbook-sync`;
//! this crate only defines the values and the auditable field-identity
//! comparison ([`CellChange::satisfied_by`]) that the reconciler relies on.

pub mod cell;
pub mod change;
pub mod ids;
pub mod kernel;

pub use cell::{Cell, CellType, Notebook};
pub use change::{CellChange, ChangeField};
pub use ids::{CellId, NotebookId};
pub use kernel::KernelState;
