//! Court resolution stage.
//!
//! Resolves a record's jurisdiction to a canonical id by consulting, in
//! rank order: the `court_id` metadata field, the `court` free-text name,
//! a court URL, the case-number prefix table, and finally a scan of the
//! opening content window. The first success wins; an unresolved court is
//! a failure, never a default jurisdiction.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::pipeline::stage::{EnrichmentStage, StageContext, StageFailure, StageId};

const SOURCE_COURT_ID: &str = "court_id";
const SOURCE_COURT_NAME: &str = "court_name";
const SOURCE_COURT_URL: &str = "court_url";
const SOURCE_CASE_NUMBER: &str = "case_number";
const SOURCE_CONTENT: &str = "content";

pub struct CourtResolutionStage;

#[async_trait]
impl EnrichmentStage for CourtResolutionStage {
    fn id(&self) -> StageId {
        StageId::Court
    }

    async fn run(&self, ctx: &StageContext<'_>) -> anyhow::Result<Value> {
        let courts = &ctx.registries.courts;
        let record = ctx.record;
        let mut attempted: Vec<&str> = Vec::new();

        if let Some(court_id) = record.metadata_str("court_id") {
            attempted.push(SOURCE_COURT_ID);
            if let Some(entry) = courts.resolve_id(court_id) {
                return Ok(resolution(entry.jurisdiction_id, SOURCE_COURT_ID, None));
            }
        }

        if let Some(court) = record.metadata_str("court") {
            if court.starts_with("http://") || court.starts_with("https://") {
                attempted.push(SOURCE_COURT_URL);
                if let Some(entry) = url_segment(court).and_then(|seg| courts.resolve_id(seg)) {
                    return Ok(resolution(entry.jurisdiction_id, SOURCE_COURT_URL, None));
                }
            } else {
                attempted.push(SOURCE_COURT_NAME);
                if let Some(entry) = courts.resolve_name(court) {
                    return Ok(resolution(entry.jurisdiction_id, SOURCE_COURT_NAME, None));
                }
            }
        }

        if let Some(court_url) = record.metadata_str("court_url") {
            attempted.push(SOURCE_COURT_URL);
            if let Some(entry) = url_segment(court_url).and_then(|seg| courts.resolve_id(seg)) {
                return Ok(resolution(entry.jurisdiction_id, SOURCE_COURT_URL, None));
            }
        }

        if let Some(case_number) = record.case_number.as_deref() {
            attempted.push(SOURCE_CASE_NUMBER);
            if let Some(entry) = courts.resolve_case_number(case_number) {
                // The content scan may disagree with the prefix; the prefix
                // wins and the disagreement is recorded for triage.
                let conflict = courts
                    .scan_content(&record.content, ctx.caps.court_content_window)
                    .filter(|scanned| scanned.jurisdiction_id != entry.jurisdiction_id)
                    .map(|scanned| scanned.jurisdiction_id);
                return Ok(resolution(
                    entry.jurisdiction_id,
                    SOURCE_CASE_NUMBER,
                    conflict,
                ));
            }
        }

        if !record.content.is_empty() {
            attempted.push(SOURCE_CONTENT);
            if let Some(entry) =
                courts.scan_content(&record.content, ctx.caps.court_content_window)
            {
                return Ok(resolution(entry.jurisdiction_id, SOURCE_CONTENT, None));
            }
        }

        Err(StageFailure::with_detail(
            "no court signal found",
            json!({ "attempted": attempted }),
        )
        .into())
    }
}

fn resolution(jurisdiction_id: &str, source: &str, conflict: Option<&str>) -> Value {
    let mut payload = json!({
        "jurisdiction_id": jurisdiction_id,
        "source": source,
    });
    if let Some(other) = conflict {
        payload["conflict"] = json!({
            "content_scan": other,
            "resolution": "case_number preferred",
        });
    }
    payload
}

/// Last non-empty path segment of a URL like `.../courts/txed/`.
fn url_segment(url: &str) -> Option<&str> {
    url.trim_end_matches('/')
        .rsplit('/')
        .find(|segment| !segment.is_empty() && !segment.contains(':'))
}
