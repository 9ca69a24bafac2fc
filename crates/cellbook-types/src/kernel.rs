//! Kernel execution state.
//!
//! The authority reports kernel state as free-form strings (Jupyter-style
//! execution states plus "off" when no kernel is running). Unrecognized
//! values degrade to [`KernelState::Unknown`] rather than failing — the set
//! is authority-defined and may grow.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

/// Execution state of a notebook's kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum KernelState {
    /// Not yet reported, or an unrecognized authority-defined value.
    #[default]
    Unknown,
    /// No kernel is running for this notebook.
    Off,
    /// Kernel is starting up.
    Starting,
    /// Ready for execution requests.
    Idle,
    /// Currently executing.
    Busy,
}

impl KernelState {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Parse, degrading unrecognized values to `Unknown`.
    pub fn parse_or_unknown(s: &str) -> Self {
        Self::from_str(s).unwrap_or(KernelState::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KernelState::Unknown => "unknown",
            KernelState::Off => "off",
            KernelState::Starting => "starting",
            KernelState::Idle => "idle",
            KernelState::Busy => "busy",
        }
    }

    /// Whether the kernel is up and can accept execution requests soon.
    pub fn is_running(&self) -> bool {
        matches!(self, KernelState::Starting | KernelState::Idle | KernelState::Busy)
    }
}

impl std::fmt::Display for KernelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
