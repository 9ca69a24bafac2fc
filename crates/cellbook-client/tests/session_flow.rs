//! End-to-end session flows against an in-memory authority.
//!
//! The mock mirrors the real authority's contract: it applies saved batches
//! to its own copy of the notebook, rejects saves carrying non-empty outputs,
//! and refuses to run a cell whose source doesn't match what it has stored.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use cellbook_client::{Authority, AuthorityError, NotebookEvent, NotebookStore};
use cellbook_sync::apply;
use cellbook_types::{Cell, CellChange, CellId, CellType, KernelState, Notebook, NotebookId};

#[derive(Default)]
struct MockAuthority {
    notebooks: Mutex<HashMap<NotebookId, Notebook>>,
    runs: Mutex<Vec<(CellId, String)>>,
    read_cell_calls: AtomicUsize,
    read_cell_delay_ms: u64,
    fail_save: AtomicBool,
}

impl MockAuthority {
    fn with_notebook(notebook_id: &NotebookId, cells: Vec<Cell>) -> Self {
        let mock = Self::default();
        mock.notebooks
            .lock()
            .insert(notebook_id.clone(), Notebook::from_cells(cells));
        mock
    }

    fn set_outputs(&self, notebook_id: &NotebookId, cell_id: &CellId, outputs: Vec<serde_json::Value>) {
        let mut notebooks = self.notebooks.lock();
        let nb = notebooks.get_mut(notebook_id).expect("notebook exists");
        nb.get_mut(cell_id).expect("cell exists").outputs = outputs;
    }

    fn stored_source(&self, notebook_id: &NotebookId, cell_id: &CellId) -> String {
        self.notebooks.lock()[notebook_id].get(cell_id).unwrap().source.clone()
    }
}

#[async_trait]
impl Authority for MockAuthority {
    async fn read_notebook(&self, notebook: &NotebookId) -> Result<Vec<Cell>, AuthorityError> {
        let notebooks = self.notebooks.lock();
        let nb = notebooks
            .get(notebook)
            .ok_or_else(|| AuthorityError::Rejected("no such notebook".into()))?;
        Ok(nb.ordered().into_iter().cloned().collect())
    }

    async fn save_notebook(
        &self,
        notebook: &NotebookId,
        changes: &[CellChange],
    ) -> Result<(), AuthorityError> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(AuthorityError::Rejected("save not permitted".into()));
        }
        if changes.iter().any(|c| c.outputs.as_ref().is_some_and(|o| !o.is_empty())) {
            return Err(AuthorityError::Rejected(
                "setting non-empty outputs not permitted".into(),
            ));
        }
        let mut notebooks = self.notebooks.lock();
        let nb = notebooks.entry(notebook.clone()).or_default();
        *nb = apply(nb, changes, false);
        Ok(())
    }

    async fn read_cell(&self, notebook: &NotebookId, cell: &CellId) -> Result<Cell, AuthorityError> {
        self.read_cell_calls.fetch_add(1, Ordering::SeqCst);
        if self.read_cell_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.read_cell_delay_ms)).await;
        }
        let notebooks = self.notebooks.lock();
        notebooks
            .get(notebook)
            .and_then(|nb| nb.get(cell))
            .cloned()
            .ok_or_else(|| AuthorityError::Rejected("no such cell".into()))
    }

    async fn run_cell(
        &self,
        notebook: &NotebookId,
        cell: &CellId,
        source: &str,
    ) -> Result<(), AuthorityError> {
        let stored = {
            let notebooks = self.notebooks.lock();
            notebooks
                .get(notebook)
                .and_then(|nb| nb.get(cell))
                .map(|c| c.source.clone())
        };
        match stored {
            Some(s) if s == source => {
                self.runs.lock().push((cell.clone(), source.to_string()));
                Ok(())
            }
            Some(_) => Err(AuthorityError::Rejected("source does not match".into())),
            None => Err(AuthorityError::Rejected("no such cell".into())),
        }
    }

    async fn kernel_state(&self, _notebook: &NotebookId) -> Result<KernelState, AuthorityError> {
        Ok(KernelState::Idle)
    }

    async fn interrupt_kernel(&self, _notebook: &NotebookId) -> Result<(), AuthorityError> {
        Ok(())
    }

    async fn stop_kernel(&self, _notebook: &NotebookId) -> Result<(), AuthorityError> {
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn nb_id() -> NotebookId {
    NotebookId::new("nb-1")
}

fn two_cell_notebook() -> Vec<Cell> {
    vec![
        Cell::new(CellId::new("a"), 0).with_source("print(1)"),
        Cell::new(CellId::new("b"), 1).with_type(CellType::Text).with_source("notes"),
    ]
}

#[tokio::test]
async fn edit_save_round_trip() {
    let id = nb_id();
    let store = NotebookStore::new(MockAuthority::with_notebook(&id, two_cell_notebook()));

    store.read(&id).await.expect("read");
    store
        .edit(&id, CellChange::for_cell("a").with_source("print(2)"))
        .expect("edit");
    assert_eq!(store.pending_len(&id), 1);

    // The view merges the pending edit and marks the cell modified; the
    // canonical snapshot is untouched until the save confirms.
    let view = store.view(&id).expect("view");
    let viewed = view.get(&CellId::new("a")).unwrap();
    assert_eq!(viewed.source, "print(2)");
    assert!(viewed.modified);
    let snap = store.snapshot(&id).expect("snapshot");
    assert_eq!(snap.get(&CellId::new("a")).unwrap().source, "print(1)");

    store.save(&id).await.expect("save");
    assert_eq!(store.pending_len(&id), 0);
    let snap = store.snapshot(&id).expect("snapshot");
    assert_eq!(snap.get(&CellId::new("a")).unwrap().source, "print(2)");
    assert!(!snap.get(&CellId::new("a")).unwrap().modified);
}

#[tokio::test]
async fn failed_save_keeps_queue_and_alerts() {
    init_tracing();
    let id = nb_id();
    let mock = MockAuthority::with_notebook(&id, two_cell_notebook());
    mock.fail_save.store(true, Ordering::SeqCst);
    let store = NotebookStore::new(mock);
    let mut alerts = store.alerts();

    store.read(&id).await.expect("read");
    store
        .edit(&id, CellChange::for_cell("a").with_source("print(2)"))
        .expect("edit");

    assert!(store.save(&id).await.is_err());
    // The edit is not lost and can be retried.
    assert_eq!(store.pending_len(&id), 1);
    let alert = alerts.try_recv().expect("alert emitted");
    assert_eq!(alert.message, "save not permitted");
}

#[tokio::test]
async fn run_cell_flushes_pending_first() {
    let id = nb_id();
    let store = NotebookStore::new(MockAuthority::with_notebook(&id, two_cell_notebook()));

    store.read(&id).await.expect("read");
    store
        .edit(&id, CellChange::for_cell("a").with_source("print(42)"))
        .expect("edit");

    // The mock rejects a run whose source differs from its stored copy, so
    // this only passes if the save happened first.
    store.run_cell(&id, &CellId::new("a")).await.expect("run");

    let runs = store.authority_runs();
    assert_eq!(runs, vec![(CellId::new("a"), "print(42)".to_string())]);
}

#[tokio::test]
async fn run_cell_skips_text_cells() {
    let id = nb_id();
    let store = NotebookStore::new(MockAuthority::with_notebook(&id, two_cell_notebook()));

    store.read(&id).await.expect("read");
    store.run_cell(&id, &CellId::new("b")).await.expect("no-op");
    assert!(store.authority_runs().is_empty());
}

#[tokio::test]
async fn run_all_runs_code_cells_in_order() {
    let id = nb_id();
    let cells = vec![
        Cell::new(CellId::new("c2"), 1).with_source("second"),
        Cell::new(CellId::new("c1"), 0).with_source("first"),
        Cell::new(CellId::new("t"), 2).with_type(CellType::Text),
    ];
    let store = NotebookStore::new(MockAuthority::with_notebook(&id, cells));

    store.read(&id).await.expect("read");
    store.run_all(&id).await.expect("run all");

    let ran: Vec<String> = store.authority_runs().into_iter().map(|(_, s)| s).collect();
    assert_eq!(ran, vec!["first".to_string(), "second".to_string()]);
}

#[tokio::test]
async fn pushed_echo_trims_pending_queue() {
    let id = nb_id();
    let store = NotebookStore::new(MockAuthority::with_notebook(&id, two_cell_notebook()));

    store.read(&id).await.expect("read");
    store
        .edit(&id, CellChange::for_cell("a").with_source("print(2)"))
        .expect("edit");

    // The authority broadcasts its echo of the change, filled out with the
    // whole cell. The pending record is satisfied and must not be resent.
    store
        .handle_event(NotebookEvent::CellUpdated {
            notebook_id: id.clone(),
            change: CellChange::for_cell("a")
                .with_source("print(2)")
                .with_index(0)
                .with_type(CellType::Code),
        })
        .await;

    assert_eq!(store.pending_len(&id), 0);
    let snap = store.snapshot(&id).expect("snapshot");
    assert_eq!(snap.get(&CellId::new("a")).unwrap().source, "print(2)");
}

#[tokio::test]
async fn foreign_echo_leaves_pending_queue_intact() {
    init_tracing();
    let id = nb_id();
    let store = NotebookStore::new(MockAuthority::with_notebook(&id, two_cell_notebook()));

    store.read(&id).await.expect("read");
    store
        .edit(&id, CellChange::for_cell("a").with_source("mine"))
        .expect("edit");

    // A broadcast that doesn't match the head of the queue: applied to the
    // snapshot, but trimming halts and the local edit survives.
    store
        .handle_event(NotebookEvent::CellUpdated {
            notebook_id: id.clone(),
            change: CellChange::for_cell("a").with_source("theirs"),
        })
        .await;

    assert_eq!(store.pending_len(&id), 1);
    let snap = store.snapshot(&id).expect("snapshot");
    assert_eq!(snap.get(&CellId::new("a")).unwrap().source, "theirs");
}

#[tokio::test]
async fn deleted_event_flows_through_applier() {
    let id = nb_id();
    let store = NotebookStore::new(MockAuthority::with_notebook(&id, two_cell_notebook()));

    store.read(&id).await.expect("read");
    store
        .handle_event(NotebookEvent::CellDeleted {
            notebook_id: id.clone(),
            change: CellChange::delete("a").with_index(0),
        })
        .await;

    let snap = store.snapshot(&id).expect("snapshot");
    assert_eq!(snap.len(), 1);
    assert!(snap.is_dense());
    assert_eq!(snap.index_of(&CellId::new("b")), Some(0));
}

#[tokio::test]
async fn late_event_for_closed_notebook_is_noop() {
    let id = nb_id();
    let store = NotebookStore::new(MockAuthority::with_notebook(&id, two_cell_notebook()));

    store.read(&id).await.expect("read");
    store.close(&id);

    store
        .handle_event(NotebookEvent::CellUpdated {
            notebook_id: id.clone(),
            change: CellChange::for_cell("a").with_source("late"),
        })
        .await;
    store
        .handle_event(NotebookEvent::CellOutput {
            notebook_id: id.clone(),
            cell_id: CellId::new("a"),
            outputs: None,
        })
        .await;

    assert!(!store.is_open(&id));
}

#[tokio::test]
async fn event_before_first_read_is_noop() {
    let id = nb_id();
    let store = NotebookStore::new(MockAuthority::with_notebook(&id, two_cell_notebook()));

    // Session opened but never read: the canonical snapshot is still absent.
    store.open(&id);
    store
        .handle_event(NotebookEvent::CellUpdated {
            notebook_id: id.clone(),
            change: CellChange::for_cell("a").with_source("early"),
        })
        .await;

    assert!(store.snapshot(&id).is_none());
}

#[tokio::test]
async fn embedded_outputs_skip_the_fetch() {
    let id = nb_id();
    let store = NotebookStore::new(MockAuthority::with_notebook(&id, two_cell_notebook()));

    store.read(&id).await.expect("read");
    store
        .handle_event(NotebookEvent::CellOutput {
            notebook_id: id.clone(),
            cell_id: CellId::new("a"),
            outputs: Some(vec![json!({"text": "42"})]),
        })
        .await;

    let snap = store.snapshot(&id).expect("snapshot");
    assert_eq!(snap.get(&CellId::new("a")).unwrap().outputs, vec![json!({"text": "42"})]);
    assert_eq!(store.authority_read_cell_calls(), 0);
}

#[tokio::test]
async fn concurrent_output_events_fetch_once() {
    init_tracing();
    let id = nb_id();
    let mock = MockAuthority {
        read_cell_delay_ms: 20,
        ..MockAuthority::default()
    };
    mock.notebooks
        .lock()
        .insert(id.clone(), Notebook::from_cells(two_cell_notebook()));

    let store = Arc::new(NotebookStore::new(mock));
    store.read(&id).await.expect("read");

    // Output appears on the authority after our read, then a burst of
    // notifications arrives for it.
    store
        .authority_ref()
        .set_outputs(&id, &CellId::new("a"), vec![json!({"text": "result"})]);

    let mut tasks = Vec::new();
    for _ in 0..3 {
        let store = Arc::clone(&store);
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            store
                .handle_event(NotebookEvent::CellOutput {
                    notebook_id: id,
                    cell_id: CellId::new("a"),
                    outputs: None,
                })
                .await;
        }));
    }
    for task in tasks {
        task.await.expect("task");
    }

    assert_eq!(store.authority_read_cell_calls(), 1);
    let snap = store.snapshot(&id).expect("snapshot");
    assert_eq!(snap.get(&CellId::new("a")).unwrap().outputs, vec![json!({"text": "result"})]);
}

#[tokio::test]
async fn kernel_state_event_and_query() {
    let id = nb_id();
    let store = NotebookStore::new(MockAuthority::with_notebook(&id, two_cell_notebook()));

    store.read(&id).await.expect("read");
    assert_eq!(store.kernel(&id), KernelState::Unknown);

    store
        .handle_event(NotebookEvent::KernelStateChanged {
            notebook_id: id.clone(),
            state: KernelState::Busy,
        })
        .await;
    assert_eq!(store.kernel(&id), KernelState::Busy);

    let state = store.kernel_state(&id).await.expect("query");
    assert_eq!(state, KernelState::Idle);
    assert_eq!(store.kernel(&id), KernelState::Idle);
}

#[tokio::test]
async fn coalesced_keystrokes_save_as_one_change() {
    let id = nb_id();
    let store = NotebookStore::new(MockAuthority::with_notebook(&id, two_cell_notebook()));

    store.read(&id).await.expect("read");
    for source in ["p", "pr", "pri", "print(9)"] {
        store
            .edit(&id, CellChange::for_cell("a").with_source(source))
            .expect("edit");
    }
    assert_eq!(store.pending_len(&id), 1);

    store.save(&id).await.expect("save");
    assert_eq!(store.authority_ref().stored_source(&id, &CellId::new("a")), "print(9)");
}

// ── Test-only accessors ─────────────────────────────────────────────────────
//
// NotebookStore doesn't expose its authority; these helpers live on a small
// extension trait so the assertions above stay readable.

trait MockStoreExt {
    fn authority_ref(&self) -> &MockAuthority;
    fn authority_runs(&self) -> Vec<(CellId, String)>;
    fn authority_read_cell_calls(&self) -> usize;
}

impl MockStoreExt for NotebookStore<MockAuthority> {
    fn authority_ref(&self) -> &MockAuthority {
        self.authority()
    }

    fn authority_runs(&self) -> Vec<(CellId, String)> {
        self.authority().runs.lock().clone()
    }

    fn authority_read_cell_calls(&self) -> usize {
        self.authority().read_cell_calls.load(Ordering::SeqCst)
    }
}
