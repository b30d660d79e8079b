//! Orchestrator - sequences schema, watermark, extraction and load per run
//!
//! Each pipeline reports a typed outcome per unit (entity, window or page).
//! Recoverable failures are logged and recorded as `Failed`; fatal ones
//! (connection, schema, configuration) abort the run with an error.

pub mod listings;
pub mod quotations;
pub mod replication;

pub use listings::ListingsPipeline;
pub use quotations::QuotationPipeline;
pub use replication::{OriginSeeder, ReplicationPipeline};

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result of one unit of work
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitOutcome {
    Succeeded(u64),
    SkippedEmpty,
    Failed(String),
}

impl UnitOutcome {
    pub fn loaded(&self) -> u64 {
        match self {
            UnitOutcome::Succeeded(count) => *count,
            _ => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, UnitOutcome::Failed(_))
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOutcome::Succeeded(count) => write!(f, "succeeded ({} rows)", count),
            UnitOutcome::SkippedEmpty => write!(f, "skipped (empty)"),
            UnitOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    /// Entity name, date window or page URL
    pub unit: String,
    pub outcome: UnitOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub pipeline: String,
    pub status: RunStatus,
    pub units: Vec<UnitReport>,
    pub records_loaded: u64,
}

impl RunResult {
    pub fn new(pipeline: &str) -> Self {
        let run_id = Uuid::new_v4().to_string();
        info!(pipeline, run_id = %run_id, "run started");
        Self {
            run_id,
            pipeline: pipeline.to_string(),
            status: RunStatus::Success,
            units: Vec::new(),
            records_loaded: 0,
        }
    }

    pub fn record(&mut self, unit: impl Into<String>, outcome: UnitOutcome) {
        let unit = unit.into();
        match &outcome {
            UnitOutcome::Failed(reason) => {
                error!(pipeline = %self.pipeline, unit = %unit, reason = %reason, "unit failed")
            }
            other => info!(pipeline = %self.pipeline, unit = %unit, outcome = %other, "unit finished"),
        }
        self.records_loaded += outcome.loaded();
        self.units.push(UnitReport { unit, outcome });
    }

    /// Record a unit error, or hand it back when it must abort the run.
    pub fn record_error(&mut self, unit: impl Into<String>, err: SyncError) -> Result<()> {
        if err.is_fatal() {
            let unit = unit.into();
            error!(pipeline = %self.pipeline, unit = %unit, error = %err, "fatal error, aborting run");
            return Err(err);
        }
        self.record(unit, UnitOutcome::Failed(err.to_string()));
        Ok(())
    }

    pub fn outcome(&self, unit: &str) -> Option<&UnitOutcome> {
        self.units.iter().find(|u| u.unit == unit).map(|u| &u.outcome)
    }

    pub fn failed(&self) -> usize {
        self.units.iter().filter(|u| u.outcome.is_failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.units
            .iter()
            .filter(|u| u.outcome == UnitOutcome::SkippedEmpty)
            .count()
    }

    /// Settle the status and log the summary.
    pub fn finish(mut self) -> Self {
        let failed = self.failed();
        self.status = if failed == 0 {
            RunStatus::Success
        } else if failed == self.units.len() {
            RunStatus::Failed
        } else {
            RunStatus::Partial
        };

        let summary = format!(
            "{} units, {} failed, {} skipped, {} records loaded",
            self.units.len(),
            failed,
            self.skipped(),
            self.records_loaded
        );
        match self.status {
            RunStatus::Success => info!(pipeline = %self.pipeline, run_id = %self.run_id, "run succeeded: {}", summary),
            RunStatus::Partial => warn!(pipeline = %self.pipeline, run_id = %self.run_id, "run partially succeeded: {}", summary),
            RunStatus::Failed => error!(pipeline = %self.pipeline, run_id = %self.run_id, "run failed: {}", summary),
        }
        self
    }
}
