//! Cell and notebook snapshot types.
//!
//! A [`Cell`] is one addressable unit of the document; a [`Notebook`] is the
//! id → cell mapping the authority's ordered cell list converts into. The
//! notebook's single structural invariant is index density: the set of
//! `cell_index` values is exactly `0..len()` with no duplicates. Every
//! mutation batch must restore that before handing the snapshot back.

use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::EnumString;

use crate::ids::CellId;

/// What kind of content a cell holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum CellType {
    /// Executable code. The default for newly materialized cells.
    #[default]
    Code,
    /// Prose / markdown. Never sent to the kernel.
    #[strum(serialize = "text", serialize = "markdown")]
    Text,
}

impl CellType {
    /// Parse from string (case-insensitive; "markdown" aliases to Text).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CellType::Code => "code",
            CellType::Text => "text",
        }
    }
}

impl std::fmt::Display for CellType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of the document.
///
/// `outputs` is transient execution data — it never participates in change
/// identity. `modified` is a local-only UI marker and never crosses the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub cell_id: CellId,
    /// Dense zero-based position within the notebook.
    pub cell_index: usize,
    #[serde(default)]
    pub cell_type: CellType,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub outputs: Vec<Value>,
    /// Unsaved-edit marker for the surrounding UI. Never persisted or compared.
    #[serde(skip)]
    pub modified: bool,
}

impl Cell {
    /// An empty code cell at the given position.
    pub fn new(cell_id: CellId, cell_index: usize) -> Self {
        Self {
            cell_id,
            cell_index,
            cell_type: CellType::Code,
            source: String::new(),
            metadata: Map::new(),
            outputs: Vec::new(),
            modified: false,
        }
    }

    /// Builder-style source content, mostly for tests and fixtures.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_type(mut self, cell_type: CellType) -> Self {
        self.cell_type = cell_type;
        self
    }
}

/// The full document: cells keyed by their stable ID.
///
/// Snapshots are values — the applier takes one by reference and returns a
/// new one rather than mutating in place, so the host store layer can detect
/// replacement by comparing references/versions however it likes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Notebook {
    cells: IndexMap<CellId, Cell>,
}

impl Notebook {
    /// An empty notebook.
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert the authority's ordered cell list into the mapping.
    ///
    /// Indices are renormalized densely in `cell_index` order, so a sparse or
    /// duplicated payload still yields a valid snapshot. Ties keep payload
    /// order (stable sort).
    pub fn from_cells(cells: impl IntoIterator<Item = Cell>) -> Self {
        let mut ordered: Vec<Cell> = cells.into_iter().collect();
        ordered.sort_by_key(|c| c.cell_index);
        let cells = ordered
            .into_iter()
            .enumerate()
            .map(|(i, mut c)| {
                c.cell_index = i;
                (c.cell_id.clone(), c)
            })
            .collect();
        Self { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, id: &CellId) -> bool {
        self.cells.contains_key(id)
    }

    pub fn get(&self, id: &CellId) -> Option<&Cell> {
        self.cells.get(id)
    }

    pub fn get_mut(&mut self, id: &CellId) -> Option<&mut Cell> {
        self.cells.get_mut(id)
    }

    /// The cell's current position, if present.
    pub fn index_of(&self, id: &CellId) -> Option<usize> {
        self.cells.get(id).map(|c| c.cell_index)
    }

    /// Insert or replace a cell under its own ID.
    pub fn insert(&mut self, cell: Cell) {
        self.cells.insert(cell.cell_id.clone(), cell);
    }

    /// Remove a cell, returning it if it was present.
    pub fn remove(&mut self, id: &CellId) -> Option<Cell> {
        // shift_remove: map iteration order is not semantic, but keeping it
        // deterministic makes debug output stable.
        self.cells.shift_remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.cells.values_mut()
    }

    /// Cells in document order (ascending `cell_index`).
    pub fn ordered(&self) -> Vec<&Cell> {
        let mut v: Vec<&Cell> = self.cells.values().collect();
        v.sort_by_key(|c| c.cell_index);
        v
    }

    /// Check index density: indices are exactly `0..len()` with no duplicates.
    pub fn is_dense(&self) -> bool {
        let mut seen = vec![false; self.cells.len()];
        for cell in self.cells.values() {
            match seen.get_mut(cell.cell_index) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        true
    }
}

impl FromIterator<Cell> for Notebook {
    fn from_iter<T: IntoIterator<Item = Cell>>(iter: T) -> Self {
        Self::from_cells(iter)
    }
}

// ============================================================================
// Tests
// ============================================================================
