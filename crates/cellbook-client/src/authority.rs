//! The transport seam: everything the remote authority can do for us.
//!
//! The session coordinator never speaks a wire protocol itself — it calls
//! through [`Authority`], and the host application supplies an implementation
//! backed by whatever transport it uses. Tests supply an in-memory one.
//!
//! Semantics the implementation must honor:
//! - `read_notebook` returns the cells in document order.
//! - `save_notebook` applies the batch durably, in order, atomically enough
//!   that a not-ok response means *nothing* was applied.
//! - `run_cell` is only valid for code cells and the authority may reject a
//!   run whose `source` doesn't match the stored cell — which is why the
//!   coordinator always saves before running.

use async_trait::async_trait;

use cellbook_types::{Cell, CellChange, CellId, KernelState, NotebookId};

/// A request to the authority failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthorityError {
    /// The authority answered not-ok; carries its error description.
    #[error("{0}")]
    Rejected(String),
    /// The request never got an answer (connection, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),
}

/// The remote system of record for notebook content and execution.
#[async_trait]
pub trait Authority: Send + Sync {
    /// Fetch the full notebook as an ordered list of cells.
    async fn read_notebook(&self, notebook: &NotebookId) -> Result<Vec<Cell>, AuthorityError>;

    /// Durably apply an ordered batch of change records.
    async fn save_notebook(
        &self,
        notebook: &NotebookId,
        changes: &[CellChange],
    ) -> Result<(), AuthorityError>;

    /// Fetch a single cell, including its current outputs.
    async fn read_cell(
        &self,
        notebook: &NotebookId,
        cell: &CellId,
    ) -> Result<Cell, AuthorityError>;

    /// Request remote execution of a code cell. The result arrives later as
    /// a pushed cell-output event, not in this response.
    async fn run_cell(
        &self,
        notebook: &NotebookId,
        cell: &CellId,
        source: &str,
    ) -> Result<(), AuthorityError>;

    /// Query the kernel's execution state.
    async fn kernel_state(&self, notebook: &NotebookId) -> Result<KernelState, AuthorityError>;

    /// Interrupt the currently running execution.
    async fn interrupt_kernel(&self, notebook: &NotebookId) -> Result<(), AuthorityError>;

    /// Stop the kernel entirely.
    async fn stop_kernel(&self, notebook: &NotebookId) -> Result<(), AuthorityError>;
}
