//! Run report: the primary operator-facing surface of a batch run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::pipeline::classify::DocumentCategory;
use crate::pipeline::executor::StageTally;
use crate::pipeline::stage::StageId;
use crate::store::models::{RunLedgerRow, UpsertAction};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StageCounterEntry {
    pub ok: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub internal_id: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriageEntry {
    pub signal: String,
    pub count: u64,
}

/// End-of-run summary. `records_attempted` always equals
/// `new + updated + unchanged + errors`; in-run duplicates and cancelled
/// records are tracked separately.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records_attempted: u64,
    pub new: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub errors: u64,
    pub duplicates_skipped: u64,
    pub cancelled: u64,
    pub stage_counters: BTreeMap<String, StageCounterEntry>,
    pub avg_completeness_by_category: BTreeMap<String, f64>,
    /// Court signals that failed to resolve, by frequency.
    pub unresolved_courts: Vec<TriageEntry>,
    /// Judge initials that missed the registry, by frequency.
    pub unmatched_judge_initials: Vec<TriageEntry>,
    pub row_errors: Vec<RowError>,
}

impl RunReport {
    #[must_use]
    pub fn to_ledger_row(&self) -> RunLedgerRow {
        RunLedgerRow {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            records_attempted: self.records_attempted as i64,
            records_new: self.new as i64,
            records_updated: self.updated as i64,
            records_unchanged: self.unchanged as i64,
            records_errored: self.errors as i64,
            report_blob: serde_json::to_value(self).unwrap_or_default(),
        }
    }
}

/// Accumulates run facts as records finish, in any order.
#[derive(Debug, Default)]
pub struct RunReportBuilder {
    new: u64,
    updated: u64,
    unchanged: u64,
    errors: u64,
    duplicates_skipped: u64,
    cancelled: u64,
    completeness: FxHashMap<DocumentCategory, (f64, u64)>,
    unresolved_courts: FxHashMap<String, u64>,
    unmatched_initials: FxHashMap<String, u64>,
    row_errors: Vec<RowError>,
}

impl RunReportBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_action(&mut self, action: UpsertAction) {
        match action {
            UpsertAction::New => self.new += 1,
            UpsertAction::Updated => self.updated += 1,
            UpsertAction::Unchanged => self.unchanged += 1,
        }
    }

    pub fn record_error(
        &mut self,
        internal_id: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.errors += 1;
        self.row_errors.push(RowError {
            internal_id: internal_id.into(),
            kind: kind.into(),
            message: message.into(),
        });
    }

    pub fn record_duplicate(&mut self) {
        self.duplicates_skipped += 1;
    }

    pub fn record_cancelled(&mut self) {
        self.cancelled += 1;
    }

    pub fn record_completeness(&mut self, category: DocumentCategory, score: f64) {
        let entry = self.completeness.entry(category).or_insert((0.0, 0));
        entry.0 += score;
        entry.1 += 1;
    }

    pub fn record_unresolved_court(&mut self, signal: impl Into<String>) {
        *self.unresolved_courts.entry(signal.into()).or_insert(0) += 1;
    }

    pub fn record_unmatched_initials(&mut self, signal: impl Into<String>) {
        *self.unmatched_initials.entry(signal.into()).or_insert(0) += 1;
    }

    #[must_use]
    pub fn finish(
        self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        tally: &FxHashMap<StageId, StageTally>,
    ) -> RunReport {
        let stage_counters = tally
            .iter()
            .map(|(stage, counts)| {
                (
                    stage.as_str().to_string(),
                    StageCounterEntry {
                        ok: counts.ok,
                        skipped: counts.skipped,
                        failed: counts.failed,
                    },
                )
            })
            .collect();

        let avg_completeness_by_category = self
            .completeness
            .iter()
            .map(|(category, (sum, count))| {
                (category.as_str().to_string(), sum / *count as f64)
            })
            .collect();

        RunReport {
            run_id,
            started_at,
            finished_at,
            records_attempted: self.new + self.updated + self.unchanged + self.errors,
            new: self.new,
            updated: self.updated,
            unchanged: self.unchanged,
            errors: self.errors,
            duplicates_skipped: self.duplicates_skipped,
            cancelled: self.cancelled,
            stage_counters,
            avg_completeness_by_category,
            unresolved_courts: sorted_triage(self.unresolved_courts),
            unmatched_judge_initials: sorted_triage(self.unmatched_initials),
            row_errors: self.row_errors,
        }
    }
}

fn sorted_triage(counts: FxHashMap<String, u64>) -> Vec<TriageEntry> {
    let mut entries: Vec<TriageEntry> = counts
        .into_iter()
        .map(|(signal, count)| TriageEntry { signal, count })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.signal.cmp(&b.signal)));
    entries
}
