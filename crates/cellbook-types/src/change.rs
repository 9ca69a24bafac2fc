//! Change records — the partial-cell mutation requests that flow between the
//! editor, the pending queue, and the authority.
//!
//! A [`CellChange`] is any subset of cell fields plus a mandatory `cell_id`,
//! optionally a `delete` flag and a target `cell_index`. Field presence is
//! meaningful: an absent field is "leave it alone", an explicitly empty one
//! (e.g. `outputs: []`) is a real request to clear.
//!
//! Change identity — "has the authority confirmed exactly this request?" —
//! is an explicit per-field comparison over [`ChangeField`] with an auditable
//! exclusion list, *not* a generic deep equality. `outputs` is excluded:
//! execution results arrive asynchronously and are never part of what the
//! user requested.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cell::{Cell, CellType};
use crate::ids::CellId;

/// One requested mutation: a partial cell keyed by `cell_id`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CellChange {
    pub cell_id: CellId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_type: Option<CellType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<Value>>,
    /// Request removal of the cell. Mutually exclusive with the field updates
    /// in practice, though the applier only looks at this flag.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub delete: bool,
    /// Transient UI marker, stripped before the change enters the pending
    /// queue. Never serialized, never compared.
    #[serde(skip)]
    pub modified: bool,
}

impl CellChange {
    /// An empty change for the given cell.
    pub fn for_cell(cell_id: impl Into<CellId>) -> Self {
        Self {
            cell_id: cell_id.into(),
            ..Self::default()
        }
    }

    /// A deletion request for the given cell.
    pub fn delete(cell_id: impl Into<CellId>) -> Self {
        Self {
            cell_id: cell_id.into(),
            delete: true,
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.cell_index = Some(index);
        self
    }

    pub fn with_type(mut self, cell_type: CellType) -> Self {
        self.cell_type = Some(cell_type);
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<Value>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Drop fields that must never enter the canonical record of "what was
    /// requested": the `modified` marker always, and `outputs` when non-empty
    /// (an explicitly empty `outputs` is a legitimate clear request).
    pub fn strip_transients(mut self) -> Self {
        self.modified = false;
        if self.outputs.as_ref().is_some_and(|o| !o.is_empty()) {
            self.outputs = None;
        }
        self
    }

    /// Overwrite this record's fields with the fields present in `incoming`.
    ///
    /// Absent fields in `incoming` are preserved; this is the coalescing
    /// merge, field-level last-write-wins.
    pub fn merge_from(&mut self, incoming: &CellChange) {
        debug_assert_eq!(self.cell_id, incoming.cell_id);
        if let Some(i) = incoming.cell_index {
            self.cell_index = Some(i);
        }
        if let Some(t) = incoming.cell_type {
            self.cell_type = Some(t);
        }
        if let Some(s) = &incoming.source {
            self.source = Some(s.clone());
        }
        if let Some(m) = &incoming.metadata {
            self.metadata = Some(m.clone());
        }
        if let Some(o) = &incoming.outputs {
            self.outputs = Some(o.clone());
        }
        if incoming.delete {
            self.delete = true;
        }
    }

    /// Overlay this change's content fields onto a cell.
    ///
    /// Positioning (`cell_index`) is deliberately not applied here — the
    /// applier owns index arithmetic and clamping.
    pub fn overlay(&self, cell: &mut Cell) {
        if let Some(t) = self.cell_type {
            cell.cell_type = t;
        }
        if let Some(s) = &self.source {
            cell.source = s.clone();
        }
        if let Some(m) = &self.metadata {
            cell.metadata = m.clone();
        }
        if let Some(o) = &self.outputs {
            cell.outputs = o.clone();
        }
    }

    /// Whether a field carries a value in this record.
    pub fn is_set(&self, field: ChangeField) -> bool {
        match field {
            ChangeField::CellIndex => self.cell_index.is_some(),
            ChangeField::CellType => self.cell_type.is_some(),
            ChangeField::Source => self.source.is_some(),
            ChangeField::Metadata => self.metadata.is_some(),
            ChangeField::Outputs => self.outputs.is_some(),
            ChangeField::Delete => self.delete,
        }
    }

    /// Structural equality of one field between two records.
    pub fn field_eq(&self, other: &CellChange, field: ChangeField) -> bool {
        match field {
            ChangeField::CellIndex => self.cell_index == other.cell_index,
            ChangeField::CellType => self.cell_type == other.cell_type,
            ChangeField::Source => self.source == other.source,
            ChangeField::Metadata => self.metadata == other.metadata,
            ChangeField::Outputs => self.outputs == other.outputs,
            ChangeField::Delete => self.delete == other.delete,
        }
    }

    /// Has the authority's `confirmed` record fully satisfied this request?
    ///
    /// Every identity field *present in this record* must be present and
    /// structurally equal in `confirmed`. The confirmed record routinely
    /// carries extra fields the authority echoes back (it fills in the whole
    /// cell); those never count against satisfaction.
    pub fn satisfied_by(&self, confirmed: &CellChange) -> bool {
        if self.cell_id != confirmed.cell_id {
            return false;
        }
        ChangeField::IDENTITY.iter().all(|&field| {
            !self.is_set(field) || (confirmed.is_set(field) && self.field_eq(confirmed, field))
        })
    }
}

impl From<&Cell> for CellChange {
    /// A change that would recreate the cell's full persistent state.
    fn from(cell: &Cell) -> Self {
        Self {
            cell_id: cell.cell_id.clone(),
            cell_index: Some(cell.cell_index),
            cell_type: Some(cell.cell_type),
            source: Some(cell.source.clone()),
            metadata: Some(cell.metadata.clone()),
            outputs: Some(cell.outputs.clone()),
            delete: false,
            modified: false,
        }
    }
}

/// The comparable fields of a change record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeField {
    CellIndex,
    CellType,
    Source,
    Metadata,
    Outputs,
    Delete,
}

impl ChangeField {
    /// Fields participating in change identity. `Outputs` is excluded — it is
    /// asynchronous execution data, not part of the request.
    pub const IDENTITY: [ChangeField; 5] = [
        ChangeField::CellIndex,
        ChangeField::CellType,
        ChangeField::Source,
        ChangeField::Metadata,
        ChangeField::Delete,
    ];
}

// ============================================================================
// Tests
// ============================================================================
