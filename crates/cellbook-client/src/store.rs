//! The session coordinator: per-notebook snapshots, pending queues, and the
//! only sanctioned mutation paths for notebook state.
//!
//! [`NotebookStore`] owns one entry per open notebook — the canonical
//! snapshot (as last confirmed by the authority), the pending queue of
//! unconfirmed local edits, and the kernel state. UI code never mutates a
//! notebook directly; it goes through the actions here, and the pure core
//! functions (`apply` / `coalesce` / `reconcile`) do all the work inside a
//! single event-handling turn.
//!
//! The entry map lock is never held across an await: every action clones
//! what it needs, suspends, and re-resolves the entry afterward — an entry
//! can disappear (notebook closed) while a request is in flight, in which
//! case the late result is dropped rather than resurrecting the session.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use cellbook_sync::{apply, coalesce, reconcile};
use cellbook_types::{CellChange, CellId, CellType, KernelState, Notebook, NotebookId};

use crate::authority::{Authority, AuthorityError};
use crate::events::{Alert, NotebookEvent};
use crate::fetch_guard::{Claim, FetchGuard};

/// Alert channel capacity — alerts are fire-and-forget; slow UIs lose old ones.
const ALERT_CHANNEL_CAPACITY: usize = 32;

/// Errors from session actions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("notebook {0} is not open")]
    NotOpen(NotebookId),
    #[error("no cell {cell} in notebook {notebook}")]
    UnknownCell { notebook: NotebookId, cell: CellId },
    #[error(transparent)]
    Authority(#[from] AuthorityError),
}

/// Per-notebook session state.
#[derive(Default)]
struct NotebookEntry {
    /// Canonical snapshot as last confirmed by the authority.
    /// `None` until the first successful read.
    snapshot: Option<Notebook>,
    /// Local edits not yet confirmed durable.
    pending: Vec<CellChange>,
    kernel: KernelState,
}

/// Repository of open notebook sessions over one authority.
pub struct NotebookStore<A: Authority> {
    authority: Arc<A>,
    entries: Mutex<HashMap<NotebookId, NotebookEntry>>,
    fetch_guard: FetchGuard,
    alerts: broadcast::Sender<Alert>,
}

impl<A: Authority> NotebookStore<A> {
    pub fn new(authority: A) -> Self {
        let (alerts, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Self {
            authority: Arc::new(authority),
            entries: Mutex::new(HashMap::new()),
            fetch_guard: FetchGuard::new(),
            alerts,
        }
    }

    /// Subscribe to user-visible failure alerts.
    pub fn alerts(&self) -> broadcast::Receiver<Alert> {
        self.alerts.subscribe()
    }

    /// The authority this store talks to.
    pub fn authority(&self) -> &A {
        &self.authority
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Open a session for a notebook (idempotent). The snapshot stays empty
    /// until [`read`](Self::read) succeeds.
    pub fn open(&self, notebook_id: &NotebookId) {
        self.entries
            .lock()
            .entry(notebook_id.clone())
            .or_default();
    }

    /// Discard a session. In-flight requests for it run to completion and
    /// their results are dropped.
    pub fn close(&self, notebook_id: &NotebookId) {
        if self.entries.lock().remove(notebook_id).is_some() {
            info!(notebook = %notebook_id, "closed notebook session");
        }
    }

    pub fn is_open(&self, notebook_id: &NotebookId) -> bool {
        self.entries.lock().contains_key(notebook_id)
    }

    /// Number of unconfirmed pending changes for a notebook.
    pub fn pending_len(&self, notebook_id: &NotebookId) -> usize {
        self.entries
            .lock()
            .get(notebook_id)
            .map_or(0, |e| e.pending.len())
    }

    /// Last known kernel state for a notebook.
    pub fn kernel(&self, notebook_id: &NotebookId) -> KernelState {
        self.entries
            .lock()
            .get(notebook_id)
            .map_or(KernelState::Unknown, |e| e.kernel)
    }

    /// The canonical snapshot (no pending edits applied).
    pub fn snapshot(&self, notebook_id: &NotebookId) -> Option<Notebook> {
        self.entries
            .lock()
            .get(notebook_id)
            .and_then(|e| e.snapshot.clone())
    }

    /// The UI-facing view: canonical snapshot with pending edits applied and
    /// unsaved cells tagged `modified`.
    pub fn view(&self, notebook_id: &NotebookId) -> Option<Notebook> {
        let entries = self.entries.lock();
        let entry = entries.get(notebook_id)?;
        let snapshot = entry.snapshot.as_ref()?;
        Some(apply(snapshot, &entry.pending, true))
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Read the notebook from the authority, replacing the canonical
    /// snapshot. Opens the session if it wasn't open.
    pub async fn read(&self, notebook_id: &NotebookId) -> Result<(), SessionError> {
        let cells = self.authority.read_notebook(notebook_id).await?;
        let notebook = Notebook::from_cells(cells);
        debug!(notebook = %notebook_id, cells = notebook.len(), "read notebook");

        let mut entries = self.entries.lock();
        entries.entry(notebook_id.clone()).or_default().snapshot = Some(notebook);
        Ok(())
    }

    /// Record a local edit: coalesce it into the pending queue.
    pub fn edit(&self, notebook_id: &NotebookId, change: CellChange) -> Result<(), SessionError> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(notebook_id)
            .ok_or_else(|| SessionError::NotOpen(notebook_id.clone()))?;
        entry.pending = coalesce(std::mem::take(&mut entry.pending), change);
        Ok(())
    }

    /// Send the pending queue to the authority.
    ///
    /// On success the confirmed batch is applied to the canonical snapshot
    /// and the reconciler trims the queue — edits made while the save was in
    /// flight survive. On failure the queue is left intact for retry.
    pub async fn save(&self, notebook_id: &NotebookId) -> Result<(), SessionError> {
        let sent = {
            let entries = self.entries.lock();
            let entry = entries
                .get(notebook_id)
                .ok_or_else(|| SessionError::NotOpen(notebook_id.clone()))?;
            entry.pending.clone()
        };
        if sent.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.authority.save_notebook(notebook_id, &sent).await {
            self.alert(notebook_id, &e);
            return Err(e.into());
        }

        self.confirm(notebook_id, &sent);
        Ok(())
    }

    /// Run one code cell. The pending queue is flushed first so the
    /// authority's stored source matches what we execute; a failed save
    /// aborts the run. Non-code cells are a logged no-op.
    pub async fn run_cell(
        &self,
        notebook_id: &NotebookId,
        cell_id: &CellId,
    ) -> Result<(), SessionError> {
        self.save(notebook_id).await?;

        let source = {
            let entries = self.entries.lock();
            let entry = entries
                .get(notebook_id)
                .ok_or_else(|| SessionError::NotOpen(notebook_id.clone()))?;
            let cell = entry
                .snapshot
                .as_ref()
                .and_then(|nb| nb.get(cell_id))
                .ok_or_else(|| SessionError::UnknownCell {
                    notebook: notebook_id.clone(),
                    cell: cell_id.clone(),
                })?;
            if cell.cell_type != CellType::Code {
                debug!(notebook = %notebook_id, cell = %cell_id, "skipping run of non-code cell");
                return Ok(());
            }
            cell.source.clone()
        };

        info!(notebook = %notebook_id, cell = %cell_id, "running cell");
        if let Err(e) = self.authority.run_cell(notebook_id, cell_id, &source).await {
            self.alert(notebook_id, &e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Run every code cell in document order.
    pub async fn run_all(&self, notebook_id: &NotebookId) -> Result<(), SessionError> {
        self.save(notebook_id).await?;

        let cells: Vec<CellId> = {
            let entries = self.entries.lock();
            let entry = entries
                .get(notebook_id)
                .ok_or_else(|| SessionError::NotOpen(notebook_id.clone()))?;
            let Some(snapshot) = entry.snapshot.as_ref() else {
                return Ok(());
            };
            snapshot
                .ordered()
                .into_iter()
                .filter(|c| c.cell_type == CellType::Code)
                .map(|c| c.cell_id.clone())
                .collect()
        };

        for cell_id in cells {
            let source = {
                let entries = self.entries.lock();
                entries
                    .get(notebook_id)
                    .and_then(|e| e.snapshot.as_ref())
                    .and_then(|nb| nb.get(&cell_id))
                    .map(|c| c.source.clone())
            };
            // Cell may have been deleted by a pushed event mid-run.
            let Some(source) = source else { continue };
            if let Err(e) = self.authority.run_cell(notebook_id, &cell_id, &source).await {
                self.alert(notebook_id, &e);
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Query the kernel's execution state and cache it on the entry.
    pub async fn kernel_state(
        &self,
        notebook_id: &NotebookId,
    ) -> Result<KernelState, SessionError> {
        let state = self.authority.kernel_state(notebook_id).await?;
        if let Some(entry) = self.entries.lock().get_mut(notebook_id) {
            entry.kernel = state;
        }
        Ok(state)
    }

    /// Interrupt the running execution.
    pub async fn interrupt(&self, notebook_id: &NotebookId) -> Result<(), SessionError> {
        if let Err(e) = self.authority.interrupt_kernel(notebook_id).await {
            self.alert(notebook_id, &e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Stop the kernel.
    pub async fn stop(&self, notebook_id: &NotebookId) -> Result<(), SessionError> {
        if let Err(e) = self.authority.stop_kernel(notebook_id).await {
            self.alert(notebook_id, &e);
            return Err(e.into());
        }
        if let Some(entry) = self.entries.lock().get_mut(notebook_id) {
            entry.kernel = KernelState::Off;
        }
        Ok(())
    }

    // =========================================================================
    // Push events
    // =========================================================================

    /// Apply one pushed event. Events for notebooks not held in memory, or
    /// whose snapshot hasn't been read yet, are silent no-ops — they can
    /// legitimately arrive late for a closed session.
    pub async fn handle_event(&self, event: NotebookEvent) {
        match event {
            NotebookEvent::CellUpdated { notebook_id, change }
            | NotebookEvent::CellDeleted { notebook_id, change } => {
                self.confirm(&notebook_id, std::slice::from_ref(&change));
            }

            NotebookEvent::CellOutput {
                notebook_id,
                cell_id,
                outputs: Some(outputs),
            } => {
                // Outputs embedded in the event: apply directly, skipping the
                // fetch entirely.
                let change = CellChange::for_cell(cell_id).with_outputs(outputs);
                self.apply_confirmed_only(&notebook_id, std::slice::from_ref(&change));
            }

            NotebookEvent::CellOutput {
                notebook_id,
                cell_id,
                outputs: None,
            } => {
                self.fetch_output(&notebook_id, &cell_id).await;
            }

            NotebookEvent::KernelStateChanged { notebook_id, state } => {
                let mut entries = self.entries.lock();
                match entries.get_mut(&notebook_id) {
                    Some(entry) => entry.kernel = state,
                    None => debug!(notebook = %notebook_id, "kernel state for unopened notebook"),
                }
            }
        }
    }

    /// Fetch a cell's outputs through the dedup guard and merge them into
    /// the snapshot.
    async fn fetch_output(&self, notebook_id: &NotebookId, cell_id: &CellId) {
        loop {
            // Re-checked after every wait: the leader's fetch usually leaves
            // the output in place, and a dropped session ends the loop.
            {
                let entries = self.entries.lock();
                let Some(entry) = entries.get(notebook_id) else {
                    return;
                };
                let Some(snapshot) = entry.snapshot.as_ref() else {
                    return;
                };
                match snapshot.get(cell_id) {
                    Some(cell) if !cell.outputs.is_empty() => return,
                    Some(_) => {}
                    None => {
                        debug!(notebook = %notebook_id, cell = %cell_id,
                               "output event for unknown cell");
                        return;
                    }
                }
            }

            match self
                .fetch_guard
                .claim((notebook_id.clone(), cell_id.clone()))
                .await
            {
                Claim::Leader(permit) => {
                    match self.authority.read_cell(notebook_id, cell_id).await {
                        Ok(cell) => {
                            let change =
                                CellChange::for_cell(cell_id.clone()).with_outputs(cell.outputs);
                            // Merge before releasing the permit so woken
                            // waiters see the output on their re-check.
                            self.apply_confirmed_only(
                                notebook_id,
                                std::slice::from_ref(&change),
                            );
                        }
                        Err(e) => {
                            warn!(notebook = %notebook_id, cell = %cell_id,
                                  error = %e, "output fetch failed");
                        }
                    }
                    drop(permit);
                    return;
                }
                Claim::Waited => continue,
            }
        }
    }

    // =========================================================================
    // Internal
    // =========================================================================

    /// Apply a confirmed batch to the canonical snapshot and trim the
    /// pending queue through the reconciler.
    fn confirm(&self, notebook_id: &NotebookId, confirmed: &[CellChange]) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(notebook_id) else {
            debug!(notebook = %notebook_id, "confirmed batch for unopened notebook, dropping");
            return;
        };
        let Some(snapshot) = entry.snapshot.as_ref() else {
            debug!(notebook = %notebook_id, "confirmed batch before first read, dropping");
            return;
        };
        entry.snapshot = Some(apply(snapshot, confirmed, false));
        entry.pending = reconcile(&entry.pending, confirmed);
    }

    /// Apply a confirmed batch to the snapshot without touching the pending
    /// queue — for output-only merges, which never correspond to a request.
    fn apply_confirmed_only(&self, notebook_id: &NotebookId, confirmed: &[CellChange]) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(notebook_id) else {
            return;
        };
        let Some(snapshot) = entry.snapshot.as_ref() else {
            return;
        };
        entry.snapshot = Some(apply(snapshot, confirmed, false));
    }

    fn alert(&self, notebook_id: &NotebookId, error: &AuthorityError) {
        warn!(notebook = %notebook_id, error = %error, "authority request failed");
        let _ = self.alerts.send(Alert {
            notebook_id: notebook_id.clone(),
            message: error.to_string(),
        });
    }
}
