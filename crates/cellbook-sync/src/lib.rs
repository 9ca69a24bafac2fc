//! Pure reconciliation core for cellbook notebooks.
//!
//! Three functions, all pure and synchronous — callers invoke them fully
//! inside one event-handling turn, so the multi-step reindexing they perform
//! is atomic relative to other handlers:
//!
//! - [`apply`] — snapshot + ordered change batch → new snapshot, maintaining
//!   the dense `cell_index` ordering.
//! - [`coalesce`] — fold a local edit into the pending queue, merging
//!   consecutive same-cell edits into one record.
//! - [`reconcile`] — trim the prefix of the pending queue the authority has
//!   just confirmed, so edits are neither resent nor lost.
//!
//! # Convergence
//!
//! For any notebook `nb` and pending queue `q`, `apply(nb, q)` followed by
//! `reconcile(q, q)` leaves an empty queue: once the authority confirms
//! exactly what was requested, nothing remains in flight.

pub mod apply;
pub mod queue;
pub mod reconcile;

pub use apply::apply;
pub use queue::coalesce;
pub use reconcile::reconcile;
