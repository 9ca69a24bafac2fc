//! Cellbook session client.
//!
//! Sits between a UI/store layer and the remote authority (server + kernel),
//! coordinating per-notebook sessions: reading snapshots, coalescing local
//! edits into pending queues, saving, running cells, and folding pushed
//! events back into the canonical state through the pure reconciliation core
//! in `cellbook-sync`.
//!
//! ```text
//!   UI layer                NotebookStore                 Authority
//!   ┌──────────┐  edit()   ┌──────────────────────┐  save  ┌─────────┐
//!   │ editor   │ ────────▶ │ snapshot + pending q │ ─────▶ │ server  │
//!   │ renderer │ ◀──────── │ apply / coalesce /   │ ◀───── │ kernel  │
//!   └──────────┘  view()   │ reconcile            │ events └─────────┘
//!                          └──────────────────────┘
//! ```
//!
//! The transport is the host's problem: implement [`Authority`] over it and
//! feed deserialized push events into [`NotebookStore::handle_event`].

pub mod authority;
pub mod events;
mod fetch_guard;
pub mod store;

pub use authority::{Authority, AuthorityError};
pub use events::{Alert, NotebookEvent};
pub use store::{NotebookStore, SessionError};
