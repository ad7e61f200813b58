//! Stage contract: identifiers, outcomes, and the trait every enrichment
//! stage implements.
//!
//! No exception leaves a stage boundary. A stage either returns a payload
//! (`ok`), signals a domain miss via [`StageSkip`]/[`StageFailure`], or
//! errors — and the executor turns all of it into [`StageOutcome`] values.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::pipeline::classify::{DocumentCategory, JudgeMode};
use crate::registry::Registries;
use crate::source::RawRecord;

/// Identifier of one enrichment stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Court,
    Citation,
    Reporter,
    Judge,
    Structure,
    Keyword,
}

impl StageId {
    pub const ALL: [StageId; 6] = [
        StageId::Court,
        StageId::Citation,
        StageId::Reporter,
        StageId::Judge,
        StageId::Structure,
        StageId::Keyword,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StageId::Court => "court",
            StageId::Citation => "citation",
            StageId::Reporter => "reporter",
            StageId::Judge => "judge",
            StageId::Structure => "structure",
            StageId::Keyword => "keyword",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Ok,
    Skipped,
    Failed,
}

impl StageStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Ok => "ok",
            StageStatus::Skipped => "skipped",
            StageStatus::Failed => "failed",
        }
    }
}

/// Result of one stage on one record. Exactly one per planned stage.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub stage: StageId,
    pub status: StageStatus,
    pub payload: Option<Value>,
    pub reason: Option<String>,
    pub duration: Duration,
}

impl StageOutcome {
    #[must_use]
    pub fn ok(stage: StageId, payload: Value, duration: Duration) -> Self {
        Self {
            stage,
            status: StageStatus::Ok,
            payload: Some(payload),
            reason: None,
            duration,
        }
    }

    #[must_use]
    pub fn skipped(stage: StageId, reason: impl Into<String>, duration: Duration) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            payload: None,
            reason: Some(reason.into()),
            duration,
        }
    }

    #[must_use]
    pub fn failed(
        stage: StageId,
        reason: impl Into<String>,
        detail: Option<Value>,
        duration: Duration,
    ) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            payload: detail,
            reason: Some(reason.into()),
            duration,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == StageStatus::Ok
    }
}

/// A stage that ran but found nothing to produce. `ok` requires a
/// non-trivial payload; an empty result is a skip with a reason, so that
/// completeness scoring never credits empty work.
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct StageSkip {
    pub reason: String,
}

impl StageSkip {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A stage that ran and failed for a domain reason, optionally with
/// structured detail (e.g. which resolution steps were attempted).
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct StageFailure {
    pub reason: String,
    pub detail: Option<Value>,
}

impl StageFailure {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(reason: impl Into<String>, detail: Value) -> Self {
        Self {
            reason: reason.into(),
            detail: Some(detail),
        }
    }
}

/// Bounds for content scanning, configured once at executor construction.
#[derive(Debug, Clone, Copy)]
pub struct ScanCaps {
    /// Characters of content scanned for citations before truncating.
    pub citation_soft_cap: usize,
    /// Opening window searched for a court name.
    pub court_content_window: usize,
    /// Opening window searched for a judge line.
    pub judge_content_window: usize,
}

impl Default for ScanCaps {
    fn default() -> Self {
        Self {
            citation_soft_cap: 250_000,
            court_content_window: 2_000,
            judge_content_window: 1_500,
        }
    }
}

/// Everything a stage may consult: the record, the static registries, and
/// the outcomes of upstream stages. Downstream stages degrade rather than
/// abort when an upstream prerequisite is missing.
pub struct StageContext<'a> {
    pub record: &'a RawRecord,
    pub category: DocumentCategory,
    pub judge_mode: JudgeMode,
    pub registries: &'a Registries,
    pub outcomes: &'a [StageOutcome],
    pub caps: ScanCaps,
}

impl StageContext<'_> {
    #[must_use]
    pub fn outcome(&self, stage: StageId) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.stage == stage)
    }

    /// Jurisdiction id from a successful court outcome, if any.
    #[must_use]
    pub fn resolved_jurisdiction(&self) -> Option<&str> {
        self.outcome(StageId::Court)
            .filter(|o| o.is_ok())
            .and_then(|o| o.payload.as_ref())
            .and_then(|p| p.get("jurisdiction_id"))
            .and_then(Value::as_str)
    }

    /// Citation list from a successful citation outcome, if any.
    #[must_use]
    pub fn citations(&self) -> Option<&Vec<Value>> {
        self.outcome(StageId::Citation)
            .filter(|o| o.is_ok())
            .and_then(|o| o.payload.as_ref())
            .and_then(|p| p.get("citations"))
            .and_then(Value::as_array)
    }
}

/// One enrichment stage. Implementations are stateless beyond injected
/// read-only capabilities and must tolerate degraded upstream context.
#[async_trait]
pub trait EnrichmentStage: Send + Sync {
    fn id(&self) -> StageId;

    async fn run(&self, ctx: &StageContext<'_>) -> anyhow::Result<Value>;
}
