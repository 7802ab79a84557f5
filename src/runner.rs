//! Types for run outcomes and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::gateway::{RunResponse, RunState, TrendStatus};

/// Result of a best-effort stage
///
/// Distinguishes "got what we asked for", "got something usable but not
/// everything" and "nothing usable was produced".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Ok(T),
    Degraded { value: T, reason: String },
    Fatal(String),
}

impl<T> Outcome<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Outcome::Degraded {
            value,
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Outcome::Fatal(reason.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Outcome::Fatal(_))
    }

    /// The produced value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Ok(value) | Outcome::Degraded { value, .. } => Some(value),
            Outcome::Fatal(_) => None,
        }
    }

    /// Why the stage fell short, if it did
    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Degraded { reason, .. } | Outcome::Fatal(reason) => Some(reason),
        }
    }
}

impl Outcome<RunResponse> {
    /// Run id, or `0` when no run was produced
    pub fn run_id(&self) -> u32 {
        self.value().map(|r| r.id).unwrap_or(0)
    }

    /// Last known run state, `Undefined` when nothing was fetched
    pub fn run_state(&self) -> RunState {
        self.value().map(|r| r.run_state).unwrap_or_default()
    }
}

/// Result of a complete lifecycle execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Whether the run reached its target state without failing
    pub success: bool,

    /// Run id (0 when no run was started)
    pub run_id: u32,

    /// Test instance the run targeted
    pub test_instance_id: u32,

    /// Name of the test, when the service reported it
    pub test_name: Option<String>,

    /// Last state observed while polling
    pub final_state: RunState,

    /// Why polling stopped short of the target, if it did
    pub degraded: Option<String>,

    /// Error message if the pipeline aborted
    pub error: Option<String>,

    /// Trend report the run was published to
    pub trend_report_id: Option<String>,

    /// Settled publication status
    pub trend_status: Option<TrendStatus>,

    /// Extracted HTML report
    pub report_path: Option<PathBuf>,

    /// Downloaded trend report PDF
    pub trend_pdf_path: Option<PathBuf>,

    /// When the run was accepted by the service
    pub started_at: Option<DateTime<Utc>>,

    /// When the lifecycle finished
    pub finished_at: Option<DateTime<Utc>>,
}
