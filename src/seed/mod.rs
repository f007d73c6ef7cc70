pub mod allocation;
pub mod attendance;
pub mod employee;
pub mod exit;
pub mod project;
pub mod reference;
pub mod timesheet;
pub mod utilization;

use serde::Serialize;

use crate::upsert::UpsertOutcome;

/// Per-stage accounting surfaced in the pipeline's stats map.
#[derive(Debug, Default, Clone, Serialize)]
pub struct StageStat {
    pub rows_in: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Rows dropped before they reached the database (unparseable values,
    /// unknown employee codes, replayed allocations).
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl StageStat {
    pub fn skipped_because(reason: String) -> Self {
        Self {
            skip_reason: Some(reason),
            ..Self::default()
        }
    }

    pub fn absorb(&mut self, outcome: &UpsertOutcome) {
        self.accepted += outcome.accepted;
        self.rejected += outcome.rejected;
    }
}
