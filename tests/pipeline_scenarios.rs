//! End-to-end pipeline scenarios driven through the orchestrator with an
//! in-memory store and recording collaborators.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use caselaw_worker::index::{IndexDocument, IndexSink};
use caselaw_worker::pipeline::executor::EnrichmentStages;
use caselaw_worker::pipeline::stage::{EnrichmentStage, StageContext, StageId};
use caselaw_worker::pipeline::{PipelineOrchestrator, PipelineSettings};
use caselaw_worker::source::{
    BodyFetch, DocumentSource, ExtractedText, ExtractionMethod, FulfillmentService, PdfExtractor,
    PurchaseReceipt, RawRecord, SourceFilter, SourcePage, SourceRecord,
};
use caselaw_worker::store::dao::DocumentDao;
use caselaw_worker::store::dao::mock::MockDocumentDao;
use caselaw_worker::util::cancel::{CancelToken, cancel_pair};

/// Source that serves a fixed sequence of pages.
struct PagedSource {
    pages: Mutex<Vec<SourcePage>>,
    /// Optional hook fired on each fetch call, for cancellation tests.
    on_fetch: Option<Box<dyn Fn(usize) + Send + Sync>>,
    fetch_count: Mutex<usize>,
}

impl PagedSource {
    fn single(records: Vec<SourceRecord>) -> Self {
        Self {
            pages: Mutex::new(vec![SourcePage {
                records,
                next_cursor: None,
                rate_remaining: None,
            }]),
            on_fetch: None,
            fetch_count: Mutex::new(0),
        }
    }

    fn paged(pages: Vec<SourcePage>, on_fetch: Option<Box<dyn Fn(usize) + Send + Sync>>) -> Self {
        Self {
            pages: Mutex::new(pages),
            on_fetch,
            fetch_count: Mutex::new(0),
        }
    }
}

#[async_trait]
impl DocumentSource for PagedSource {
    async fn fetch(
        &self,
        _filter: &SourceFilter,
        _cursor: Option<&str>,
    ) -> anyhow::Result<SourcePage> {
        let call = {
            let mut count = self.fetch_count.lock().expect("fetch count");
            *count += 1;
            *count
        };
        if let Some(hook) = &self.on_fetch {
            hook(call);
        }
        let mut pages = self.pages.lock().expect("pages");
        if pages.is_empty() {
            Ok(SourcePage::default())
        } else {
            Ok(pages.remove(0))
        }
    }

    async fn fetch_body(&self, _record: &RawRecord) -> anyhow::Result<BodyFetch> {
        Ok(BodyFetch::Unavailable)
    }
}

#[derive(Default)]
struct RecordingIndexSink {
    submissions: Mutex<Vec<Vec<String>>>,
}

impl RecordingIndexSink {
    fn submitted_ids(&self) -> Vec<String> {
        self.submissions
            .lock()
            .expect("submissions")
            .iter()
            .flatten()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl IndexSink for RecordingIndexSink {
    async fn submit(&self, documents: &[IndexDocument]) -> anyhow::Result<()> {
        self.submissions
            .lock()
            .expect("submissions")
            .push(documents.iter().map(|d| d.internal_id.clone()).collect());
        Ok(())
    }
}

/// Citation stage spy: delegates nothing, only counts invocations.
struct SpyCitationStage {
    calls: Arc<Mutex<usize>>,
}

#[async_trait]
impl EnrichmentStage for SpyCitationStage {
    fn id(&self) -> StageId {
        StageId::Citation
    }

    async fn run(&self, _ctx: &StageContext<'_>) -> anyhow::Result<Value> {
        *self.calls.lock().expect("spy calls") += 1;
        Ok(json!({"citations": [{"raw_text": "1 F.3d 2"}]}))
    }
}

fn opinion_content() -> String {
    let mut content = String::new();
    content.push_str("IN THE UNITED STATES DISTRICT COURT FOR THE EASTERN DISTRICT OF TEXAS\n");
    content.push_str("MARSHALL DIVISION\n\n");
    content.push_str("Before GILSTRAP, J.\n\n");
    content.push_str("MEMORANDUM OPINION\n\n");
    content.push_str("I. BACKGROUND\n\n");
    content.push_str(
        "Plaintiff moved for summary judgment on all claims. \
         The governing standard appears in 123 F.3d 456 (5th Cir. 1997). \
         The parties completed claim construction briefing last year.\n\n",
    );
    content.push_str("II. DISCUSSION\n\n");
    while content.chars().count() <= 8000 {
        content.push_str(
            "The court has considered the parties' arguments and the record evidence. ",
        );
    }
    content.push_str("\n\nCONCLUSION\n\nIT IS SO ORDERED.\n");
    content
}

fn scenario_a_record() -> SourceRecord {
    SourceRecord {
        source_id: Some("A-1".to_string()),
        internal_id: Some("A-1".to_string()),
        kind_hint: Some("opinion".to_string()),
        content: Some(opinion_content()),
        metadata: json!({
            "court": "Eastern District of Texas",
            "assigned_to": "Rodney Gilstrap",
        }),
        case_number: Some("2:22-cv-00001".to_string()),
        pdf_reference: None,
    }
}

fn scenario_b_record() -> SourceRecord {
    SourceRecord {
        source_id: Some("B-2".to_string()),
        internal_id: Some("B-2".to_string()),
        kind_hint: Some("docket".to_string()),
        content: Some(String::new()),
        metadata: json!({
            "court_id": "txed",
            "assigned_to_str": "Rodney Gilstrap",
            "federal_dn_judge_initials_assigned": "RG",
        }),
        case_number: Some("2:22-cv-00002".to_string()),
        pdf_reference: None,
    }
}

fn serial_settings() -> PipelineSettings {
    PipelineSettings {
        max_concurrency: 1,
        ..PipelineSettings::default()
    }
}

#[tokio::test]
async fn scenario_a_full_opinion_all_stages_succeed() {
    let dao = Arc::new(MockDocumentDao::new());
    let sink = Arc::new(RecordingIndexSink::default());
    let orchestrator = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_index_sink(Arc::clone(&sink) as Arc<dyn IndexSink>)
        .with_settings(serial_settings())
        .build();

    let source = PagedSource::single(vec![scenario_a_record()]);
    let report = orchestrator
        .run(&source, &SourceFilter::default(), &CancelToken::never())
        .await
        .expect("run succeeds");

    assert_eq!(report.records_attempted, 1);
    assert_eq!(report.new, 1);
    assert_eq!(report.errors, 0);

    let stored = dao.stored("A-1").expect("record persisted");
    assert_eq!(stored.jurisdiction_id.as_deref(), Some("txed"));

    let enrichments = &stored.metadata_blob["enrichments"];
    for stage in ["court", "citation", "reporter", "judge", "structure", "keyword"] {
        assert_eq!(
            enrichments[stage]["status"], "ok",
            "stage {stage} should be ok: {enrichments:#}"
        );
    }

    assert_eq!(enrichments["judge"]["payload"]["source"], "metadata");
    assert_eq!(enrichments["judge"]["payload"]["name"], "Rodney Gilstrap");
    assert_eq!(
        enrichments["citation"]["payload"]["citations"][0]["raw_text"],
        "123 F.3d 456"
    );
    assert_eq!(
        enrichments["reporter"]["payload"]["citations"][0]["normalized_reporter"],
        "F.3d"
    );

    let completeness = stored.metadata_blob["summary"]["completeness"]
        .as_f64()
        .expect("completeness");
    assert!(completeness >= 90.0, "completeness was {completeness}");

    assert_eq!(sink.submitted_ids(), vec!["A-1".to_string()]);
}

#[tokio::test]
async fn scenario_b_docket_with_metadata_judge() {
    let dao = Arc::new(MockDocumentDao::new());
    let orchestrator = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_settings(serial_settings())
        .build();

    let source = PagedSource::single(vec![scenario_b_record()]);
    let report = orchestrator
        .run(&source, &SourceFilter::default(), &CancelToken::never())
        .await
        .expect("run succeeds");

    assert_eq!(report.new, 1);
    let stored = dao.stored("B-2").expect("record persisted");
    assert_eq!(stored.jurisdiction_id.as_deref(), Some("txed"));
    assert_eq!(stored.metadata_blob["summary"]["category"], "metadata_document");

    let enrichments = &stored.metadata_blob["enrichments"];
    for stage in ["citation", "reporter", "structure"] {
        assert_eq!(enrichments[stage]["status"], "skipped");
        assert_eq!(
            enrichments[stage]["reason"],
            "not applicable for category metadata_document"
        );
    }
    assert_eq!(enrichments["court"]["payload"]["source"], "court_id");
    assert_eq!(enrichments["judge"]["status"], "ok");
    assert_eq!(enrichments["judge"]["payload"]["source"], "metadata");

    let completeness = stored.metadata_blob["summary"]["completeness"]
        .as_f64()
        .expect("completeness");
    assert!(completeness >= 80.0, "completeness was {completeness}");
}

#[tokio::test]
async fn scenario_c_idempotent_rerun_reports_unchanged() {
    let dao = Arc::new(MockDocumentDao::new());

    let first = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_settings(serial_settings())
        .build();
    first
        .run(
            &PagedSource::single(vec![scenario_a_record()]),
            &SourceFilter::default(),
            &CancelToken::never(),
        )
        .await
        .expect("first run succeeds");

    let blob_after_first = dao.stored("A-1").expect("stored").metadata_blob;
    let upserts_after_first = dao.upsert_calls();

    let second = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_settings(serial_settings())
        .build();
    let report = second
        .run(
            &PagedSource::single(vec![scenario_a_record()]),
            &SourceFilter::default(),
            &CancelToken::never(),
        )
        .await
        .expect("second run succeeds");

    assert_eq!(report.records_attempted, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.new, 0);

    // Nothing overwrote the prior enrichment.
    assert_eq!(dao.upsert_calls(), upserts_after_first);
    assert_eq!(dao.stored("A-1").expect("stored").metadata_blob, blob_after_first);
}

#[tokio::test]
async fn scenario_d_unresolvable_court_stores_null_jurisdiction() {
    let dao = Arc::new(MockDocumentDao::new());
    let orchestrator = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_settings(serial_settings())
        .build();

    let mut body = String::from("The motion is denied. ");
    while body.chars().count() <= 1200 {
        body.push_str("Further briefing is not required at this time. ");
    }
    let record = SourceRecord {
        source_id: Some("D-4".to_string()),
        internal_id: Some("D-4".to_string()),
        kind_hint: Some("order".to_string()),
        content: Some(body),
        metadata: json!({"nature_of_suit": "830 Patent"}),
        case_number: Some("0000000".to_string()),
        pdf_reference: None,
    };

    let report = orchestrator
        .run(
            &PagedSource::single(vec![record]),
            &SourceFilter::default(),
            &CancelToken::never(),
        )
        .await
        .expect("run succeeds");

    let stored = dao.stored("D-4").expect("record persisted");
    assert_eq!(stored.jurisdiction_id, None);
    let court = &stored.metadata_blob["enrichments"]["court"];
    assert_eq!(court["status"], "failed");
    assert_eq!(court["reason"], "no court signal found");
    assert!(stored.metadata_blob["summary"].get("jurisdiction_id").is_none());

    let completeness = stored.metadata_blob["summary"]["completeness"]
        .as_f64()
        .expect("completeness");
    assert!(completeness < 100.0);

    assert_eq!(report.unresolved_courts.len(), 1);
    assert_eq!(report.unresolved_courts[0].signal, "0000000");
}

#[tokio::test]
async fn scenario_e_cancellation_preserves_finished_records_only() {
    let dao = Arc::new(MockDocumentDao::new());
    let (handle, token) = cancel_pair();
    let handle = Arc::new(handle);

    let orchestrator = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_settings(serial_settings())
        .build();

    let page_one = SourcePage {
        records: vec![scenario_a_record(), scenario_b_record()],
        next_cursor: Some("1".to_string()),
        rate_remaining: None,
    };
    let page_two = SourcePage {
        records: vec![SourceRecord {
            source_id: Some("E-5".to_string()),
            internal_id: Some("E-5".to_string()),
            kind_hint: Some("docket".to_string()),
            metadata: json!({"court_id": "cand"}),
            ..SourceRecord::default()
        }],
        next_cursor: None,
        rate_remaining: None,
    };

    // The cancellation lands during the second page fetch, so the first
    // page completes and the second page's records are abandoned.
    let hook_handle = Arc::clone(&handle);
    let source = PagedSource::paged(
        vec![page_one, page_two],
        Some(Box::new(move |call| {
            if call == 2 {
                hook_handle.cancel();
            }
        })),
    );

    let report = orchestrator
        .run(&source, &SourceFilter::default(), &token)
        .await
        .expect("run succeeds");

    assert_eq!(report.records_attempted, 2);
    assert_eq!(report.new, 2);
    assert_eq!(report.cancelled, 1);
    assert!(dao.stored("A-1").is_some());
    assert!(dao.stored("B-2").is_some());
    assert!(dao.stored("E-5").is_none(), "cancelled record must not persist");
    assert_eq!(
        report.records_attempted,
        report.new + report.updated + report.unchanged + report.errors
    );
}

#[tokio::test]
async fn scenario_f_duplicate_submission_in_one_run() {
    let dao = Arc::new(MockDocumentDao::new());
    let orchestrator = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_settings(serial_settings())
        .build();

    let source = PagedSource::single(vec![scenario_a_record(), scenario_a_record()]);
    let report = orchestrator
        .run(&source, &SourceFilter::default(), &CancelToken::never())
        .await
        .expect("run succeeds");

    assert_eq!(report.records_attempted, 1);
    assert_eq!(report.new, 1);
    assert_eq!(report.duplicates_skipped, 1);
    assert_eq!(dao.upsert_calls(), 1, "only one persistence call for the pair");
}

#[tokio::test]
async fn citation_extractor_is_never_invoked_for_dockets() {
    let dao = Arc::new(MockDocumentDao::new());
    let calls = Arc::new(Mutex::new(0usize));
    let mut stages = EnrichmentStages::builtin();
    stages.citation = Arc::new(SpyCitationStage {
        calls: Arc::clone(&calls),
    });

    let orchestrator = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_stages(stages)
        .with_settings(serial_settings())
        .build();

    let source = PagedSource::single(vec![scenario_b_record()]);
    orchestrator
        .run(&source, &SourceFilter::default(), &CancelToken::never())
        .await
        .expect("run succeeds");

    assert_eq!(*calls.lock().expect("spy calls"), 0);
    let stored = dao.stored("B-2").expect("stored");
    assert_eq!(
        stored.metadata_blob["enrichments"]["citation"]["status"],
        "skipped"
    );
}

#[tokio::test]
async fn same_case_number_different_sources_both_stored() {
    let dao = Arc::new(MockDocumentDao::new());
    let orchestrator = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_settings(serial_settings())
        .build();

    let mut first = scenario_b_record();
    first.source_id = Some("X-1".to_string());
    first.internal_id = Some("X-1".to_string());
    let mut second = scenario_b_record();
    second.source_id = Some("Y-2".to_string());
    second.internal_id = Some("Y-2".to_string());
    second.content = Some("Entirely different docket text.".to_string());

    let report = orchestrator
        .run(
            &PagedSource::single(vec![first, second]),
            &SourceFilter::default(),
            &CancelToken::never(),
        )
        .await
        .expect("run succeeds");

    assert_eq!(report.new, 2);
    assert_eq!(dao.row_count(), 2);
}

#[tokio::test]
async fn row_level_persistence_errors_do_not_abort_the_batch() {
    let dao = Arc::new(MockDocumentDao::new());
    dao.fail_upserts_for("A-1");

    let orchestrator = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_settings(serial_settings())
        .build();

    let source = PagedSource::single(vec![scenario_a_record(), scenario_b_record()]);
    let report = orchestrator
        .run(&source, &SourceFilter::default(), &CancelToken::never())
        .await
        .expect("run succeeds");

    assert_eq!(report.errors, 1);
    assert_eq!(report.new, 1);
    assert_eq!(report.records_attempted, 2);
    assert_eq!(report.row_errors.len(), 1);
    assert_eq!(report.row_errors[0].internal_id, "A-1");
    assert!(dao.stored("B-2").is_some());
}

#[tokio::test]
async fn changed_content_updates_and_merges_prior_enrichments() {
    let dao = Arc::new(MockDocumentDao::new());

    let first = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_settings(serial_settings())
        .build();
    first
        .run(
            &PagedSource::single(vec![scenario_a_record()]),
            &SourceFilter::default(),
            &CancelToken::never(),
        )
        .await
        .expect("first run succeeds");

    // Same record, changed body: the judge line is gone, so the judge
    // signal now comes from metadata alone; the court content scan no
    // longer fires either.
    let mut changed = scenario_a_record();
    changed.content = Some(opinion_content().replace("Before GILSTRAP, J.\n\n", ""));

    let second = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_settings(serial_settings())
        .build();
    let report = second
        .run(
            &PagedSource::single(vec![changed]),
            &SourceFilter::default(),
            &CancelToken::never(),
        )
        .await
        .expect("second run succeeds");

    assert_eq!(report.updated, 1);
    let stored = dao.stored("A-1").expect("stored");
    // Fresh successful enrichments replaced the prior ones.
    assert_eq!(stored.metadata_blob["enrichments"]["court"]["status"], "ok");
    assert_eq!(stored.metadata_blob["enrichments"]["judge"]["status"], "ok");
}

/// Source whose bodies come back as PDF bytes.
struct PdfBodySource {
    records: Vec<SourceRecord>,
}

#[async_trait]
impl DocumentSource for PdfBodySource {
    async fn fetch(
        &self,
        _filter: &SourceFilter,
        cursor: Option<&str>,
    ) -> anyhow::Result<SourcePage> {
        if cursor.is_some() {
            return Ok(SourcePage::default());
        }
        Ok(SourcePage {
            records: self.records.clone(),
            next_cursor: None,
            rate_remaining: None,
        })
    }

    async fn fetch_body(&self, _record: &RawRecord) -> anyhow::Result<BodyFetch> {
        Ok(BodyFetch::Pdf(b"%PDF-1.7 stub".to_vec()))
    }
}

struct StubPdfExtractor {
    text: String,
}

#[async_trait]
impl PdfExtractor for StubPdfExtractor {
    async fn extract_text(&self, _pdf_bytes: &[u8]) -> anyhow::Result<ExtractedText> {
        Ok(ExtractedText {
            text: self.text.clone(),
            page_count: 3,
            method: ExtractionMethod::Native,
        })
    }
}

#[tokio::test]
async fn pdf_bodies_are_extracted_before_enrichment() {
    let dao = Arc::new(MockDocumentDao::new());
    let orchestrator = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_pdf_extractor(Arc::new(StubPdfExtractor {
            text: "The motion for summary judgment is GRANTED.".to_string(),
        }))
        .with_settings(serial_settings())
        .build();

    let record = SourceRecord {
        internal_id: Some("P-9".to_string()),
        kind_hint: Some("order".to_string()),
        content: None,
        pdf_reference: Some("gov.uscourts.txed.12345.1.0.pdf".to_string()),
        ..SourceRecord::default()
    };

    orchestrator
        .run(
            &PdfBodySource {
                records: vec![record],
            },
            &SourceFilter::default(),
            &CancelToken::never(),
        )
        .await
        .expect("run succeeds");

    let stored = dao.stored("P-9").expect("stored");
    assert!(stored.content.contains("summary judgment"));
    let keyword = &stored.metadata_blob["enrichments"]["keyword"];
    assert_eq!(keyword["status"], "ok");
}

/// Source that reports every body as purchase-only.
struct PaidOnlySource {
    records: Vec<SourceRecord>,
}

#[async_trait]
impl DocumentSource for PaidOnlySource {
    async fn fetch(
        &self,
        _filter: &SourceFilter,
        cursor: Option<&str>,
    ) -> anyhow::Result<SourcePage> {
        if cursor.is_some() {
            return Ok(SourcePage::default());
        }
        Ok(SourcePage {
            records: self.records.clone(),
            next_cursor: None,
            rate_remaining: None,
        })
    }

    async fn fetch_body(&self, _record: &RawRecord) -> anyhow::Result<BodyFetch> {
        Ok(BodyFetch::MustPurchase)
    }
}

#[derive(Default)]
struct StubFulfillment {
    submissions: Mutex<Vec<String>>,
}

#[async_trait]
impl FulfillmentService for StubFulfillment {
    async fn register_callback(&self, _callback_url: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn submit_purchase(&self, record: &RawRecord) -> anyhow::Result<PurchaseReceipt> {
        self.submissions
            .lock()
            .expect("submissions")
            .push(record.internal_id.clone());
        Ok(PurchaseReceipt {
            ticket_id: format!("T-{}", record.internal_id),
            estimated_cost_cents: 120,
        })
    }
}

fn paid_record(id: &str) -> SourceRecord {
    SourceRecord {
        internal_id: Some(id.to_string()),
        kind_hint: Some("docket".to_string()),
        metadata: json!({"court_id": "txed"}),
        case_number: Some(format!("2:24-cv-{id}")),
        pdf_reference: Some(format!("{id}.pdf")),
        ..SourceRecord::default()
    }
}

#[tokio::test]
async fn purchases_stop_at_the_budget_and_records_persist_partial() {
    let dao = Arc::new(MockDocumentDao::new());
    let fulfillment = Arc::new(StubFulfillment::default());
    let settings = PipelineSettings {
        purchase_budget_cents: 100,
        ..serial_settings()
    };
    let orchestrator = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_fulfillment(Arc::clone(&fulfillment) as Arc<dyn FulfillmentService>)
        .with_settings(settings)
        .build();

    let source = PaidOnlySource {
        records: vec![paid_record("PB-1"), paid_record("PB-2")],
    };
    let report = orchestrator
        .run(&source, &SourceFilter::default(), &CancelToken::never())
        .await
        .expect("run succeeds");

    // The first purchase spends past the cap, the second is skipped, and
    // both records still persist in partial state.
    let submissions = fulfillment.submissions.lock().expect("submissions").clone();
    assert_eq!(submissions, vec!["PB-1".to_string()]);
    assert_eq!(report.new, 2);
    assert!(dao.stored("PB-1").expect("stored").content.is_empty());
    assert!(dao.stored("PB-2").expect("stored").content.is_empty());
}

#[tokio::test]
async fn purchases_disabled_by_default() {
    let dao = Arc::new(MockDocumentDao::new());
    let fulfillment = Arc::new(StubFulfillment::default());
    let orchestrator = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_fulfillment(Arc::clone(&fulfillment) as Arc<dyn FulfillmentService>)
        .with_settings(serial_settings())
        .build();

    let source = PaidOnlySource {
        records: vec![paid_record("PB-3")],
    };
    orchestrator
        .run(&source, &SourceFilter::default(), &CancelToken::never())
        .await
        .expect("run succeeds");

    assert!(fulfillment.submissions.lock().expect("submissions").is_empty());
    assert!(dao.stored("PB-3").is_some());
}

#[tokio::test]
async fn fulfilled_purchases_reenter_and_update_the_partial_record() {
    let dao = Arc::new(MockDocumentDao::new());
    let fulfillment = Arc::new(StubFulfillment::default());
    let settings = PipelineSettings {
        purchase_budget_cents: 1_000,
        ..serial_settings()
    };
    let orchestrator = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_fulfillment(Arc::clone(&fulfillment) as Arc<dyn FulfillmentService>)
        .with_settings(settings)
        .build();

    let source = PaidOnlySource {
        records: vec![paid_record("PF-1")],
    };
    orchestrator
        .run(&source, &SourceFilter::default(), &CancelToken::never())
        .await
        .expect("run succeeds");

    let partial = dao.stored("PF-1").expect("partial row persisted");
    assert!(partial.content.is_empty());
    assert_eq!(
        fulfillment.submissions.lock().expect("submissions").clone(),
        vec!["PF-1".to_string()]
    );

    // Fulfillment completes: the purchased document re-enters as a fresh
    // record and the changed content hash drives an update of the row.
    let mut fulfilled = paid_record("PF-1");
    fulfilled.content =
        Some("The purchased docket text resolves the motion for summary judgment.".to_string());
    orchestrator
        .process_purchased(fulfilled, &CancelToken::never())
        .await
        .expect("re-entry succeeds");

    let updated = dao.stored("PF-1").expect("updated row");
    assert!(updated.content.contains("summary judgment"));
    assert_ne!(updated.content_hash, partial.content_hash);
    assert_eq!(updated.metadata_blob["summary"]["origin"], "purchased");
    assert_eq!(
        updated.metadata_blob["enrichments"]["keyword"]["status"],
        "ok"
    );
    // One upsert for the partial insert, one for the fulfillment update.
    assert_eq!(dao.upsert_calls(), 2);
}

#[tokio::test]
async fn a_reused_orchestrator_scopes_duplicates_to_one_run() {
    let dao = Arc::new(MockDocumentDao::new());
    let orchestrator = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_settings(serial_settings())
        .build();

    let first = orchestrator
        .run(
            &PagedSource::single(vec![scenario_a_record()]),
            &SourceFilter::default(),
            &CancelToken::never(),
        )
        .await
        .expect("first run succeeds");
    assert_eq!(first.new, 1);

    // The same orchestrator on the next schedule tick: the record is
    // unchanged since the last run, not an in-run duplicate.
    let second = orchestrator
        .run(
            &PagedSource::single(vec![scenario_a_record()]),
            &SourceFilter::default(),
            &CancelToken::never(),
        )
        .await
        .expect("second run succeeds");
    assert_eq!(second.duplicates_skipped, 0);
    assert_eq!(second.unchanged, 1);
    assert_eq!(second.records_attempted, 1);
}

#[tokio::test]
async fn unknown_kind_still_runs_keyword_extraction() {
    let dao = Arc::new(MockDocumentDao::new());
    let orchestrator = PipelineOrchestrator::builder(Arc::clone(&dao) as Arc<dyn DocumentDao>)
        .with_settings(serial_settings())
        .build();

    let record = SourceRecord {
        internal_id: Some("U-7".to_string()),
        content: Some("Short note with no procedural phrases at all.".to_string()),
        ..SourceRecord::default()
    };
    let report = orchestrator
        .run(
            &PagedSource::single(vec![record]),
            &SourceFilter::default(),
            &CancelToken::never(),
        )
        .await
        .expect("run succeeds");

    assert_eq!(report.new, 1);
    let stored = dao.stored("U-7").expect("stored");
    assert_eq!(stored.metadata_blob["summary"]["category"], "unknown");
    // Keyword extraction ran; zero matches is a skip with a reason, never
    // an empty success.
    let keyword = &stored.metadata_blob["enrichments"]["keyword"];
    assert_eq!(keyword["status"], "skipped");
    assert_eq!(keyword["reason"], "no keywords matched");
    // Structure is not in the unknown plan at all.
    assert!(stored.metadata_blob["enrichments"].get("structure").is_none());
}
