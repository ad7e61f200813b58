//! Stage-plan execution with per-stage isolation.
//!
//! A failure inside stage *k* never prevents stages *k+1..n* from
//! running: every error, panic, and timeout is caught at the stage
//! boundary and recorded as a failed outcome. Downstream stages receive
//! the accumulated outcomes and degrade when a prerequisite is missing.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use futures::FutureExt;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::observability::Metrics;
use crate::pipeline::citation::CitationExtractionStage;
use crate::pipeline::classify::{ClassifiedRecord, PlanDisposition};
use crate::pipeline::court::CourtResolutionStage;
use crate::pipeline::judge::JudgeResolutionStage;
use crate::pipeline::keyword::KeywordExtractionStage;
use crate::pipeline::reporter::ReporterNormalizationStage;
use crate::pipeline::stage::{
    EnrichmentStage, ScanCaps, StageContext, StageFailure, StageId, StageOutcome, StageSkip,
    StageStatus,
};
use crate::pipeline::structure::StructureAnalysisStage;
use crate::registry::Registries;
use crate::util::error::classify;

/// Container for the enrichment stage implementations.
pub struct EnrichmentStages {
    pub court: Arc<dyn EnrichmentStage>,
    pub citation: Arc<dyn EnrichmentStage>,
    pub reporter: Arc<dyn EnrichmentStage>,
    pub judge: Arc<dyn EnrichmentStage>,
    pub structure: Arc<dyn EnrichmentStage>,
    pub keyword: Arc<dyn EnrichmentStage>,
}

impl EnrichmentStages {
    /// Default implementations of all six stages.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            court: Arc::new(CourtResolutionStage),
            citation: Arc::new(CitationExtractionStage::new()),
            reporter: Arc::new(ReporterNormalizationStage),
            judge: Arc::new(JudgeResolutionStage::new()),
            structure: Arc::new(StructureAnalysisStage::new()),
            keyword: Arc::new(KeywordExtractionStage::new()),
        }
    }

    fn get(&self, stage: StageId) -> &Arc<dyn EnrichmentStage> {
        match stage {
            StageId::Court => &self.court,
            StageId::Citation => &self.citation,
            StageId::Reporter => &self.reporter,
            StageId::Judge => &self.judge,
            StageId::Structure => &self.structure,
            StageId::Keyword => &self.keyword,
        }
    }
}

/// Per-run stage outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTally {
    pub ok: u64,
    pub skipped: u64,
    pub failed: u64,
}

pub struct PipelineExecutor {
    stages: EnrichmentStages,
    registries: Arc<Registries>,
    caps: ScanCaps,
    stage_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
    tally: Mutex<FxHashMap<StageId, StageTally>>,
}

impl PipelineExecutor {
    #[must_use]
    pub fn new(
        stages: EnrichmentStages,
        registries: Arc<Registries>,
        caps: ScanCaps,
        stage_timeout: Duration,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            stages,
            registries,
            caps,
            stage_timeout,
            metrics,
            tally: Mutex::new(FxHashMap::default()),
        }
    }

    /// Run the record's stage plan in order. Every planned stage produces
    /// exactly one outcome.
    pub async fn execute(&self, classified: &ClassifiedRecord) -> Vec<StageOutcome> {
        let mut outcomes: Vec<StageOutcome> = Vec::with_capacity(classified.plan.entries.len());

        for entry in &classified.plan.entries {
            let outcome = match &entry.disposition {
                PlanDisposition::SkipByPlan { reason } => {
                    StageOutcome::skipped(entry.stage, reason.clone(), Duration::ZERO)
                }
                PlanDisposition::Run => {
                    self.run_stage(entry.stage, classified, &outcomes).await
                }
            };
            self.record_outcome(&outcome);
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn run_stage(
        &self,
        stage_id: StageId,
        classified: &ClassifiedRecord,
        outcomes: &[StageOutcome],
    ) -> StageOutcome {
        let stage = self.stages.get(stage_id);
        let ctx = StageContext {
            record: &classified.record,
            category: classified.category,
            judge_mode: classified.plan.judge_mode,
            registries: &self.registries,
            outcomes,
            caps: self.caps,
        };

        let started = Instant::now();
        let result = tokio::time::timeout(
            self.stage_timeout,
            std::panic::AssertUnwindSafe(stage.run(&ctx)).catch_unwind(),
        )
        .await;
        let duration = started.elapsed();

        match result {
            Err(_elapsed) => {
                warn!(
                    record_id = %classified.record.internal_id,
                    stage = %stage_id.as_str(),
                    "stage timed out"
                );
                StageOutcome::failed(stage_id, "timeout", None, duration)
            }
            Ok(Err(_panic)) => {
                warn!(
                    record_id = %classified.record.internal_id,
                    stage = %stage_id.as_str(),
                    "stage panicked"
                );
                StageOutcome::failed(stage_id, "stage panicked", None, duration)
            }
            Ok(Ok(Ok(payload))) => StageOutcome::ok(stage_id, payload, duration),
            Ok(Ok(Err(error))) => {
                if let Some(skip) = error.downcast_ref::<StageSkip>() {
                    debug!(
                        record_id = %classified.record.internal_id,
                        stage = %stage_id.as_str(),
                        reason = %skip.reason,
                        "stage skipped"
                    );
                    return StageOutcome::skipped(stage_id, skip.reason.clone(), duration);
                }
                if let Some(failure) = error.downcast_ref::<StageFailure>() {
                    debug!(
                        record_id = %classified.record.internal_id,
                        stage = %stage_id.as_str(),
                        reason = %failure.reason,
                        "stage failed"
                    );
                    return StageOutcome::failed(
                        stage_id,
                        failure.reason.clone(),
                        failure.detail.clone(),
                        duration,
                    );
                }
                let kind = classify(&error);
                warn!(
                    record_id = %classified.record.internal_id,
                    stage = %stage_id.as_str(),
                    error = ?error,
                    "stage errored"
                );
                StageOutcome::failed(stage_id, kind.as_str(), None, duration)
            }
        }
    }

    fn record_outcome(&self, outcome: &StageOutcome) {
        {
            let mut tally = self.tally.lock().expect("executor tally lock");
            let entry = tally.entry(outcome.stage).or_default();
            match outcome.status {
                StageStatus::Ok => entry.ok += 1,
                StageStatus::Skipped => entry.skipped += 1,
                StageStatus::Failed => entry.failed += 1,
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics
                .stage_outcomes
                .with_label_values(&[outcome.stage.as_str(), outcome.status.as_str()])
                .inc();
            metrics
                .stage_duration
                .with_label_values(&[outcome.stage.as_str()])
                .observe(outcome.duration.as_secs_f64());
        }
    }

    /// Snapshot of the per-stage counters for this run.
    #[must_use]
    pub fn tally(&self) -> FxHashMap<StageId, StageTally> {
        self.tally.lock().expect("executor tally lock").clone()
    }
}
