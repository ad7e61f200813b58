use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Persisted document row. Exactly one unique constraint: `internal_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub internal_id: String,
    pub kind: String,
    pub case_number: Option<String>,
    /// Populated only when court resolution succeeded. Never defaulted.
    pub jurisdiction_id: Option<String>,
    pub content: String,
    pub content_hash: String,
    pub metadata_blob: Value,
    pub updated_at: DateTime<Utc>,
}

/// What the idempotent upsert did for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    New,
    Updated,
    Unchanged,
}

impl UpsertAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UpsertAction::New => "new",
            UpsertAction::Updated => "updated",
            UpsertAction::Unchanged => "unchanged",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub action: UpsertAction,
    pub row_id: i64,
}

/// One row per completed run, holding the full run report as a blob.
#[derive(Debug, Clone)]
pub struct RunLedgerRow {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records_attempted: i64,
    pub records_new: i64,
    pub records_updated: i64,
    pub records_unchanged: i64,
    pub records_errored: i64,
    pub report_blob: Value,
}
