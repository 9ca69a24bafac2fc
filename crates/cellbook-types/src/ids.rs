//! Opaque identifiers for notebooks and cells.
//!
//! Both IDs are assigned by the authority and treated as opaque strings on
//! this side: imported documents may carry arbitrary cell IDs, so we don't
//! assume any particular shape beyond non-emptiness. `CellId::fresh()` mints
//! a new hex-simple UUIDv4 for locally created cells, matching what the
//! authority generates for cells inserted without an ID.
//!
//! A cell ID is stable for the lifetime of the cell and never reused after
//! deletion; position is carried separately by `cell_index`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one notebook (the authority's object ID).
#[derive(Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotebookId(String);

/// Stable identifier of one cell, unique within its notebook.
#[derive(Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(String);

macro_rules! impl_string_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Wrap an authority-assigned identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Mint a fresh identifier (hex-simple UUIDv4, no hyphens).
            pub fn fresh() -> Self {
                Self(uuid::Uuid::new_v4().as_simple().to_string())
            }

            /// The raw string form.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First 8 characters — for human display only, not lookup.
            pub fn short(&self) -> &str {
                match self.0.char_indices().nth(8) {
                    Some((end, _)) => &self.0[..end],
                    None => &self.0,
                }
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $T {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $T {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.0)
            }
        }
    };
}

impl_string_id!(NotebookId, "NotebookId");
impl_string_id!(CellId, "CellId");

// ============================================================================
// Tests
// ============================================================================
