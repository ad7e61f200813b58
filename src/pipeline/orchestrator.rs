//! Pipeline orchestrator and builder.
//!
//! Drives each record through dedup, classification, stage execution,
//! assembly, persistence, and index handoff, with a bounded fan-out
//! across records. Per-record order is strict: the index handoff happens
//! only after the upsert reported success. Across records nothing is
//! ordered.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::index::{IndexDocument, IndexSink, TracingIndexSink};
use crate::observability::Metrics;
use crate::pipeline::assemble::{EnrichedRecord, MetadataAssembler, merge_metadata_blobs};
use crate::pipeline::classify::DocumentClassifier;
use crate::pipeline::dedup::{DedupAction, DedupAssessment, DeduplicationManager};
use crate::pipeline::executor::{EnrichmentStages, PipelineExecutor};
use crate::pipeline::report::{RunReport, RunReportBuilder};
use crate::pipeline::score::completeness;
use crate::pipeline::stage::{ScanCaps, StageId, StageStatus};
use crate::registry::Registries;
use crate::source::{
    BodyFetch, DocumentSource, FulfillmentService, PdfExtractor, RawRecord, SourceFilter,
    SourceRecord,
};
use crate::store::dao::DocumentDao;
use crate::store::models::{StoredRecord, UpsertAction};
use crate::util::cancel::CancelToken;
use crate::util::error::{ErrorKind, is_retryable};
use crate::util::retry::RetryConfig;

/// Runtime knobs for one orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Records processed concurrently.
    pub max_concurrency: usize,
    pub stage_timeout: Duration,
    pub fetch_timeout: Duration,
    pub upsert_timeout: Duration,
    pub scan_caps: ScanCaps,
    /// Source `rate_remaining` below which the run pauses between pages.
    pub rate_floor: u32,
    pub rate_pause: Duration,
    /// Per-run purchase allowance; 0 disables paid-source purchases.
    pub purchase_budget_cents: u64,
    pub retry: RetryConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            stage_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(30),
            upsert_timeout: Duration::from_secs(10),
            scan_caps: ScanCaps::default(),
            rate_floor: 10,
            rate_pause: Duration::from_millis(2_000),
            purchase_budget_cents: 0,
            retry: RetryConfig::default(),
        }
    }
}

pub struct PipelineOrchestrator {
    classifier: DocumentClassifier,
    executor: PipelineExecutor,
    dedup: DeduplicationManager,
    dao: Arc<dyn DocumentDao>,
    index_sink: Arc<dyn IndexSink>,
    fulfillment: Option<Arc<dyn FulfillmentService>>,
    pdf_extractor: Option<Arc<dyn PdfExtractor>>,
    settings: PipelineSettings,
    metrics: Option<Arc<Metrics>>,
    purchase_spent_cents: AtomicU64,
}

/// Builder for [`PipelineOrchestrator`].
pub struct PipelineBuilder {
    dao: Arc<dyn DocumentDao>,
    stages: Option<EnrichmentStages>,
    registries: Option<Arc<Registries>>,
    index_sink: Option<Arc<dyn IndexSink>>,
    fulfillment: Option<Arc<dyn FulfillmentService>>,
    pdf_extractor: Option<Arc<dyn PdfExtractor>>,
    settings: PipelineSettings,
    metrics: Option<Arc<Metrics>>,
}

impl PipelineBuilder {
    #[must_use]
    pub fn new(dao: Arc<dyn DocumentDao>) -> Self {
        Self {
            dao,
            stages: None,
            registries: None,
            index_sink: None,
            fulfillment: None,
            pdf_extractor: None,
            settings: PipelineSettings::default(),
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_stages(mut self, stages: EnrichmentStages) -> Self {
        self.stages = Some(stages);
        self
    }

    #[must_use]
    pub fn with_registries(mut self, registries: Arc<Registries>) -> Self {
        self.registries = Some(registries);
        self
    }

    #[must_use]
    pub fn with_index_sink(mut self, sink: Arc<dyn IndexSink>) -> Self {
        self.index_sink = Some(sink);
        self
    }

    #[must_use]
    pub fn with_fulfillment(mut self, fulfillment: Arc<dyn FulfillmentService>) -> Self {
        self.fulfillment = Some(fulfillment);
        self
    }

    #[must_use]
    pub fn with_pdf_extractor(mut self, extractor: Arc<dyn PdfExtractor>) -> Self {
        self.pdf_extractor = Some(extractor);
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn build(self) -> PipelineOrchestrator {
        let registries = self
            .registries
            .unwrap_or_else(|| Arc::new(Registries::builtin()));
        let stages = self.stages.unwrap_or_else(EnrichmentStages::builtin);
        let executor = PipelineExecutor::new(
            stages,
            registries,
            self.settings.scan_caps,
            self.settings.stage_timeout,
            self.metrics.clone(),
        );

        PipelineOrchestrator {
            classifier: DocumentClassifier::new(),
            executor,
            dedup: DeduplicationManager::new(Arc::clone(&self.dao)),
            dao: self.dao,
            index_sink: self.index_sink.unwrap_or_else(|| Arc::new(TracingIndexSink)),
            fulfillment: self.fulfillment,
            pdf_extractor: self.pdf_extractor,
            settings: self.settings,
            metrics: self.metrics,
            purchase_spent_cents: AtomicU64::new(0),
        }
    }
}

impl PipelineOrchestrator {
    #[must_use]
    pub fn builder(dao: Arc<dyn DocumentDao>) -> PipelineBuilder {
        PipelineBuilder::new(dao)
    }

    /// Run one batch from the source and return the run report. The
    /// ledger row is written best-effort; its failure never fails the run.
    pub async fn run(
        &self,
        source: &dyn DocumentSource,
        filter: &SourceFilter,
        cancel: &CancelToken,
    ) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let report = Mutex::new(RunReportBuilder::new());
        let mut cursor: Option<String> = None;
        let mut fetched = 0usize;
        let max_records = filter.max_records.map(std::num::NonZeroUsize::get);

        // The duplicate window and the purchase budget are both scoped to
        // one run; the orchestrator itself is built once and reused.
        self.dedup.reset();
        self.purchase_spent_cents.store(0, Ordering::Relaxed);

        info!(run_id = %run_id, "enrichment run started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let page = match self.fetch_page(source, filter, cursor.as_deref(), cancel).await {
                Ok(page) => page,
                Err(error) => {
                    warn!(run_id = %run_id, error = ?error, "source fetch failed, ending run early");
                    break;
                }
            };

            let remaining = max_records.map_or(usize::MAX, |max| max.saturating_sub(fetched));
            let records: Vec<SourceRecord> = page.records.into_iter().take(remaining).collect();
            fetched += records.len();

            futures::stream::iter(records)
                .map(|record| self.process_source_record(record, source, &report, cancel))
                .buffer_unordered(self.settings.max_concurrency.max(1))
                .collect::<Vec<()>>()
                .await;

            if max_records.is_some_and(|max| fetched >= max) {
                break;
            }
            let Some(next) = page.next_cursor else { break };
            cursor = Some(next);

            // Backpressure: a low remaining budget slows the run down, it
            // never fails it.
            if let Some(rate) = page.rate_remaining {
                if rate < self.settings.rate_floor {
                    debug!(run_id = %run_id, rate_remaining = rate, "source budget low, pausing");
                    tokio::time::sleep(self.settings.rate_pause).await;
                }
            }
        }

        let finished_at = Utc::now();
        let run_report = report
            .into_inner()
            .expect("run report lock")
            .finish(run_id, started_at, finished_at, &self.executor.tally());

        if let Err(error) = self.dao.insert_run_ledger(&run_report.to_ledger_row()).await {
            warn!(run_id = %run_id, error = ?error, "failed to write run ledger row");
        }

        info!(
            run_id = %run_id,
            attempted = run_report.records_attempted,
            new = run_report.new,
            updated = run_report.updated,
            unchanged = run_report.unchanged,
            errors = run_report.errors,
            duplicates = run_report.duplicates_skipped,
            cancelled = run_report.cancelled,
            "enrichment run finished"
        );
        Ok(run_report)
    }

    /// Re-enter a purchased document as a fresh record.
    pub async fn process_purchased(
        &self,
        record: SourceRecord,
        cancel: &CancelToken,
    ) -> Result<()> {
        let raw = RawRecord::from_fulfillment(record, Utc::now())
            .context("purchased record failed input normalization")?;
        let report = Mutex::new(RunReportBuilder::new());
        self.process_record(raw, &report, cancel).await;
        Ok(())
    }

    async fn fetch_page(
        &self,
        source: &dyn DocumentSource,
        filter: &SourceFilter,
        cursor: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<crate::source::SourcePage> {
        let mut attempt = 0usize;
        loop {
            if cancel.is_cancelled() {
                anyhow::bail!("cancelled");
            }
            match source.fetch(filter, cursor).await {
                Ok(page) => return Ok(page),
                Err(error) => {
                    attempt += 1;
                    if !self.settings.retry.can_retry(attempt) || !is_retryable(&error) {
                        return Err(error).context("source fetch exhausted retries");
                    }
                    let delay = self.settings.retry.delay_for_attempt(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying source fetch");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn process_source_record(
        &self,
        record: SourceRecord,
        source: &dyn DocumentSource,
        report: &Mutex<RunReportBuilder>,
        cancel: &CancelToken,
    ) {
        if cancel.is_cancelled() {
            report.lock().expect("run report lock").record_cancelled();
            if let Some(metrics) = &self.metrics {
                metrics.records_cancelled.inc();
            }
            return;
        }

        let fallback_id = record
            .internal_id
            .clone()
            .or_else(|| record.source_id.clone())
            .unwrap_or_else(|| "<unknown>".to_string());
        let mut raw = match RawRecord::from_source(record, Utc::now()) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(record_id = %fallback_id, error = %error, "record rejected at input");
                report.lock().expect("run report lock").record_error(
                    fallback_id,
                    ErrorKind::Input.as_str(),
                    error.to_string(),
                );
                if let Some(metrics) = &self.metrics {
                    metrics.records_errored.inc();
                }
                return;
            }
        };

        if raw.content.trim().is_empty() && raw.pdf_reference.is_some() {
            self.acquire_body(&mut raw, source, cancel).await;
        }

        self.process_record(raw, report, cancel).await;
    }

    /// Fill in the body text when the source did not inline it. All
    /// failure modes degrade to an empty body; enrichment proceeds on
    /// whatever is available.
    async fn acquire_body(
        &self,
        raw: &mut RawRecord,
        source: &dyn DocumentSource,
        cancel: &CancelToken,
    ) {
        if cancel.is_cancelled() {
            return;
        }
        let fetched = tokio::time::timeout(self.settings.fetch_timeout, source.fetch_body(raw)).await;
        match fetched {
            Ok(Ok(BodyFetch::Inline(text))) => raw.content = text,
            Ok(Ok(BodyFetch::Pdf(bytes))) => self.extract_pdf_text(raw, &bytes).await,
            Ok(Ok(BodyFetch::MustPurchase)) => self.try_purchase(raw).await,
            Ok(Ok(BodyFetch::Unavailable)) => {
                debug!(record_id = %raw.internal_id, "body unavailable, continuing without content");
            }
            Ok(Err(error)) => {
                warn!(record_id = %raw.internal_id, error = ?error, "body fetch failed");
            }
            Err(_elapsed) => {
                warn!(record_id = %raw.internal_id, "body fetch timed out");
            }
        }
    }

    /// Extract text from fetched PDF bytes. Extraction failures are
    /// isolated to the record; it proceeds without content.
    async fn extract_pdf_text(&self, raw: &mut RawRecord, bytes: &[u8]) {
        let Some(extractor) = &self.pdf_extractor else {
            warn!(record_id = %raw.internal_id, "pdf body received but no extractor configured");
            return;
        };
        let extracted =
            tokio::time::timeout(self.settings.fetch_timeout, extractor.extract_text(bytes)).await;
        match extracted {
            Ok(Ok(text)) => {
                debug!(
                    record_id = %raw.internal_id,
                    page_count = text.page_count,
                    method = ?text.method,
                    "pdf text extracted"
                );
                raw.content = text.text;
            }
            Ok(Err(error)) => {
                warn!(record_id = %raw.internal_id, error = ?error, "pdf extraction failed");
            }
            Err(_elapsed) => {
                warn!(record_id = %raw.internal_id, "pdf extraction timed out");
            }
        }
    }

    async fn try_purchase(&self, raw: &RawRecord) {
        let Some(fulfillment) = &self.fulfillment else {
            debug!(record_id = %raw.internal_id, "purchase needed but no fulfillment configured");
            return;
        };
        if self.settings.purchase_budget_cents == 0 {
            debug!(record_id = %raw.internal_id, "purchase needed but purchases are disabled");
            return;
        }
        if self.purchase_spent_cents.load(Ordering::Relaxed) >= self.settings.purchase_budget_cents
        {
            warn!(
                record_id = %raw.internal_id,
                reason = ErrorKind::Budget.as_str(),
                "skipping purchase, budget exhausted"
            );
            if let Some(metrics) = &self.metrics {
                metrics.purchases_skipped_budget.inc();
            }
            return;
        }

        match fulfillment.submit_purchase(raw).await {
            Ok(receipt) => {
                self.purchase_spent_cents
                    .fetch_add(receipt.estimated_cost_cents, Ordering::Relaxed);
                info!(
                    record_id = %raw.internal_id,
                    ticket_id = %receipt.ticket_id,
                    "purchase submitted, record persists partial until fulfillment"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.purchases_submitted.inc();
                }
            }
            Err(error) => {
                warn!(record_id = %raw.internal_id, error = ?error, "purchase submission failed");
            }
        }
    }

    async fn process_record(
        &self,
        raw: RawRecord,
        report: &Mutex<RunReportBuilder>,
        cancel: &CancelToken,
    ) {
        if let Some(metrics) = &self.metrics {
            metrics.records_in_flight.inc();
        }
        self.process_record_inner(raw, report, cancel).await;
        if let Some(metrics) = &self.metrics {
            metrics.records_in_flight.dec();
        }
    }

    async fn process_record_inner(
        &self,
        raw: RawRecord,
        report: &Mutex<RunReportBuilder>,
        cancel: &CancelToken,
    ) {
        let assessment = match self.dedup.assess(&raw).await {
            Ok(assessment) => assessment,
            Err(error) => {
                report.lock().expect("run report lock").record_error(
                    raw.internal_id.clone(),
                    ErrorKind::Persistence.as_str(),
                    error.to_string(),
                );
                if let Some(metrics) = &self.metrics {
                    metrics.records_errored.inc();
                }
                return;
            }
        };

        match assessment.action {
            DedupAction::SkipDuplicate => {
                debug!(record_id = %raw.internal_id, action = %assessment.action.as_str(), "duplicate within run");
                report.lock().expect("run report lock").record_duplicate();
                if let Some(metrics) = &self.metrics {
                    metrics.duplicates_skipped.inc();
                }
            }
            DedupAction::SkipUnchanged => {
                debug!(record_id = %raw.internal_id, action = %assessment.action.as_str(), "content unchanged since last run");
                report
                    .lock()
                    .expect("run report lock")
                    .record_action(UpsertAction::Unchanged);
                if let Some(metrics) = &self.metrics {
                    metrics.records_attempted.inc();
                    metrics.records_unchanged.inc();
                }
            }
            DedupAction::UpdateExisting | DedupAction::InsertNew => {
                self.enrich_and_persist(raw, assessment, report, cancel).await;
            }
        }
    }

    async fn enrich_and_persist(
        &self,
        raw: RawRecord,
        assessment: DedupAssessment,
        report: &Mutex<RunReportBuilder>,
        cancel: &CancelToken,
    ) {
        if let Some(metrics) = &self.metrics {
            metrics.records_attempted.inc();
        }

        let classified = self.classifier.classify(raw);
        let outcomes = self.executor.execute(&classified).await;
        self.collect_triage_signals(&classified, &outcomes, report);

        let score = completeness(&classified, &outcomes);
        report
            .lock()
            .expect("run report lock")
            .record_completeness(classified.category, score);
        if let Some(metrics) = &self.metrics {
            metrics.completeness.observe(score);
        }

        let enriched = MetadataAssembler::assemble(
            classified,
            outcomes,
            score,
            assessment.content_hash.clone(),
            assessment.fingerprint.clone(),
        );

        // Suspension point: a cancelled record is preserved in the run log
        // but never persisted.
        if cancel.is_cancelled() {
            debug!(
                record_id = %enriched.classified.record.internal_id,
                outcomes = enriched.outcomes.len(),
                "record cancelled before persistence"
            );
            report.lock().expect("run report lock").record_cancelled();
            if let Some(metrics) = &self.metrics {
                metrics.records_cancelled.inc();
            }
            return;
        }

        let stored = self.to_stored_record(&enriched, &assessment);
        let internal_id = stored.internal_id.clone();

        let upsert = tokio::time::timeout(
            self.settings.upsert_timeout,
            self.dao.upsert_record(&stored),
        )
        .await;
        let outcome = match upsert {
            Err(_elapsed) => {
                report.lock().expect("run report lock").record_error(
                    internal_id.clone(),
                    ErrorKind::Persistence.as_str(),
                    "timeout",
                );
                if let Some(metrics) = &self.metrics {
                    metrics.records_errored.inc();
                }
                return;
            }
            Ok(Err(error)) => {
                warn!(record_id = %internal_id, error = %error, "upsert failed");
                report.lock().expect("run report lock").record_error(
                    internal_id.clone(),
                    ErrorKind::Persistence.as_str(),
                    error.to_string(),
                );
                if let Some(metrics) = &self.metrics {
                    metrics.records_errored.inc();
                }
                return;
            }
            Ok(Ok(outcome)) => outcome,
        };

        report
            .lock()
            .expect("run report lock")
            .record_action(outcome.action);
        if let Some(metrics) = &self.metrics {
            match outcome.action {
                UpsertAction::New => metrics.records_new.inc(),
                UpsertAction::Updated => metrics.records_updated.inc(),
                UpsertAction::Unchanged => metrics.records_unchanged.inc(),
            }
        }

        // Index handoff strictly after a successful upsert.
        let document = IndexDocument::from_enriched(&enriched);
        if let Err(error) = self.index_sink.submit(&[document]).await {
            warn!(record_id = %internal_id, error = ?error, "index handoff failed");
        }
    }

    fn to_stored_record(
        &self,
        enriched: &EnrichedRecord,
        assessment: &DedupAssessment,
    ) -> StoredRecord {
        let record = &enriched.classified.record;
        let metadata_blob = match (&assessment.action, &assessment.existing) {
            (DedupAction::UpdateExisting, Some(existing)) => {
                merge_metadata_blobs(&existing.metadata_blob, enriched.metadata_blob.clone())
            }
            _ => enriched.metadata_blob.clone(),
        };

        StoredRecord {
            internal_id: record.internal_id.clone(),
            kind: record
                .kind_hint
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            case_number: record.case_number.clone(),
            jurisdiction_id: enriched.jurisdiction_id.clone(),
            content: record.content.clone(),
            content_hash: enriched.content_hash.clone(),
            metadata_blob,
            updated_at: Utc::now(),
        }
    }

    fn collect_triage_signals(
        &self,
        classified: &crate::pipeline::classify::ClassifiedRecord,
        outcomes: &[crate::pipeline::stage::StageOutcome],
        report: &Mutex<RunReportBuilder>,
    ) {
        let record = &classified.record;

        let court_failed = outcomes
            .iter()
            .any(|o| o.stage == StageId::Court && o.status == StageStatus::Failed);
        if court_failed {
            let signal = record
                .metadata_str("court")
                .or_else(|| record.metadata_str("court_id"))
                .or(record.case_number.as_deref())
                .unwrap_or("<no signal>")
                .to_string();
            report
                .lock()
                .expect("run report lock")
                .record_unresolved_court(signal);
        }

        let judge_failed = outcomes
            .iter()
            .any(|o| o.stage == StageId::Judge && o.status == StageStatus::Failed);
        if judge_failed {
            let initials = record
                .metadata_str("federal_dn_judge_initials_assigned")
                .or_else(|| record.metadata_str("judge_initials"));
            if let Some(initials) = initials {
                let jurisdiction = outcomes
                    .iter()
                    .find(|o| o.stage == StageId::Court && o.is_ok())
                    .and_then(|o| o.payload.as_ref())
                    .and_then(|p| p.get("jurisdiction_id"))
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("<unresolved>");
                report
                    .lock()
                    .expect("run report lock")
                    .record_unmatched_initials(format!("{jurisdiction}:{initials}"));
            }
        }
    }
}
