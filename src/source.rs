//! Document sources and the input adapter.
//!
//! A [`SourceRecord`] is the wire shape as a source hands it over, with
//! all the upstream inconsistencies intact (scalar metadata, missing ids).
//! [`RawRecord::from_source`] normalizes it on entry so everything
//! downstream operates on mappings and non-empty identifiers.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::dao::DocumentDao;
use crate::util::text::normalize_case_number;

/// A record exactly as received from a source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub internal_id: Option<String>,
    #[serde(default)]
    pub kind_hint: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    /// Free-form; occasionally a scalar due to upstream bugs.
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub case_number: Option<String>,
    #[serde(default)]
    pub pdf_reference: Option<String>,
}

/// Where a record entered the pipeline from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOrigin {
    Source,
    /// Re-entered after paid-source fulfillment.
    Purchased,
}

impl RecordOrigin {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RecordOrigin::Source => "source",
            RecordOrigin::Purchased => "purchased",
        }
    }
}

/// Record malformed beyond repair. Fatal for that record only.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("record carries no identifier and no case number to synthesize one from")]
    NoStableIdentifier,
}

/// Normalized input record. Never mutated after entry.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub source_id: String,
    pub internal_id: String,
    pub kind_hint: Option<String>,
    pub content: String,
    pub metadata: Map<String, Value>,
    pub case_number: Option<String>,
    pub pdf_reference: Option<String>,
    pub origin: RecordOrigin,
    pub id_was_synthesized: bool,
    pub metadata_was_scalar: bool,
}

impl RawRecord {
    /// Normalize a wire record on entry.
    ///
    /// Identifier synthesis: a missing `internal_id` falls back to
    /// `source_id`; when both are absent one is synthesized from the
    /// normalized case number and the ingest timestamp, and the record is
    /// flagged `id_was_synthesized`. Non-mapping metadata is wrapped as
    /// `{"raw": <original>}` and flagged `metadata_was_scalar`.
    pub fn from_source(
        record: SourceRecord,
        ingested_at: DateTime<Utc>,
    ) -> Result<Self, InputError> {
        let provided_internal = record.internal_id.filter(|id| !id.trim().is_empty());
        let provided_source = record.source_id.filter(|id| !id.trim().is_empty());
        let case_number = record.case_number.filter(|c| !c.trim().is_empty());

        let mut id_was_synthesized = false;
        let internal_id = match (&provided_internal, &provided_source) {
            (Some(internal), _) => internal.clone(),
            (None, Some(source)) => source.clone(),
            (None, None) => {
                let case = case_number.as_deref().ok_or(InputError::NoStableIdentifier)?;
                id_was_synthesized = true;
                format!(
                    "syn-{}-{}",
                    normalize_case_number(case),
                    ingested_at.timestamp_millis()
                )
            }
        };
        let source_id = provided_source.unwrap_or_else(|| internal_id.clone());

        let (metadata, metadata_was_scalar) = match record.metadata {
            Value::Object(map) => (map, false),
            Value::Null => (Map::new(), false),
            other => {
                let mut map = Map::new();
                map.insert("raw".to_string(), other);
                (map, true)
            }
        };

        Ok(Self {
            source_id,
            internal_id,
            kind_hint: record.kind_hint.filter(|k| !k.trim().is_empty()),
            content: record.content.unwrap_or_default(),
            metadata,
            case_number,
            pdf_reference: record.pdf_reference,
            origin: RecordOrigin::Source,
            id_was_synthesized,
            metadata_was_scalar,
        })
    }

    /// Variant used when a purchased body re-enters the pipeline.
    pub fn from_fulfillment(
        record: SourceRecord,
        ingested_at: DateTime<Utc>,
    ) -> Result<Self, InputError> {
        let mut raw = Self::from_source(record, ingested_at)?;
        raw.origin = RecordOrigin::Purchased;
        Ok(raw)
    }

    /// First string value among the given metadata fields.
    #[must_use]
    pub fn metadata_str(&self, field: &str) -> Option<&str> {
        self.metadata.get(field).and_then(Value::as_str)
    }
}

/// Filter for a source fetch.
#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    pub jurisdictions: BTreeSet<String>,
    /// Inclusive start.
    pub date_start: Option<DateTime<Utc>>,
    /// Exclusive end.
    pub date_end: Option<DateTime<Utc>>,
    pub kind: Option<String>,
    pub nature_of_action: BTreeSet<String>,
    pub query: Option<String>,
    pub max_records: Option<NonZeroUsize>,
}

/// One page of a lazy fetch. Pagination is via opaque cursor tokens.
#[derive(Debug, Clone, Default)]
pub struct SourcePage {
    pub records: Vec<SourceRecord>,
    pub next_cursor: Option<String>,
    /// Remaining request budget as reported by the source, when known.
    pub rate_remaining: Option<u32>,
}

/// Result of asking a source for a record's body text.
#[derive(Debug, Clone)]
pub enum BodyFetch {
    Inline(String),
    /// Raw PDF bytes; text extraction happens via the external extractor.
    Pdf(Vec<u8>),
    /// Only available from the paid source.
    MustPurchase,
    Unavailable,
}

/// Upstream record supply. The HTTP case-law client implements this
/// elsewhere; within this crate the store-backed replay source does.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, filter: &SourceFilter, cursor: Option<&str>) -> Result<SourcePage>;

    async fn fetch_body(&self, record: &RawRecord) -> Result<BodyFetch>;
}

/// How PDF text extraction happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Native,
    Ocr,
}

#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: u32,
    pub method: ExtractionMethod,
}

/// External PDF-to-text service. Failures are isolated per record.
#[async_trait]
pub trait PdfExtractor: Send + Sync {
    async fn extract_text(&self, pdf_bytes: &[u8]) -> Result<ExtractedText>;
}

#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    pub ticket_id: String,
    pub estimated_cost_cents: u64,
}

/// Asynchronous paid-source fulfillment. The pipeline registers a callback
/// once, submits purchase requests, and completed documents re-enter later
/// as fresh records via [`RawRecord::from_fulfillment`]. No polling.
#[async_trait]
pub trait FulfillmentService: Send + Sync {
    async fn register_callback(&self, callback_url: &str) -> Result<()>;

    async fn submit_purchase(&self, record: &RawRecord) -> Result<PurchaseReceipt>;
}

const STORE_PAGE_SIZE: usize = 200;

/// Replays records already in the relational store back through the
/// pipeline, for re-enrichment runs. Rate budget is unlimited.
pub struct StoreBackedSource {
    dao: Arc<dyn DocumentDao>,
}

impl StoreBackedSource {
    #[must_use]
    pub fn new(dao: Arc<dyn DocumentDao>) -> Self {
        Self { dao }
    }
}

#[async_trait]
impl DocumentSource for StoreBackedSource {
    async fn fetch(&self, filter: &SourceFilter, cursor: Option<&str>) -> Result<SourcePage> {
        let offset: usize = cursor.map(str::parse).transpose()?.unwrap_or(0);
        let page_size = filter
            .max_records
            .map_or(STORE_PAGE_SIZE, |max| max.get().min(STORE_PAGE_SIZE));
        let stored = self.dao.list_records(filter, page_size, offset).await?;
        let page_len = stored.len();

        let records = stored
            .into_iter()
            .map(|row| SourceRecord {
                source_id: Some(row.internal_id.clone()),
                internal_id: Some(row.internal_id),
                kind_hint: Some(row.kind),
                content: Some(row.content),
                metadata: row
                    .metadata_blob
                    .get("source")
                    .cloned()
                    .unwrap_or(Value::Null),
                case_number: row.case_number,
                pdf_reference: None,
            })
            .collect();

        let next_cursor = if page_len == page_size {
            Some((offset + page_len).to_string())
        } else {
            None
        };

        Ok(SourcePage {
            records,
            next_cursor,
            rate_remaining: None,
        })
    }

    async fn fetch_body(&self, record: &RawRecord) -> Result<BodyFetch> {
        match self.dao.get_by_internal_id(&record.internal_id).await? {
            Some(row) if !row.content.is_empty() => Ok(BodyFetch::Inline(row.content)),
            _ => Ok(BodyFetch::Unavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn internal_id_falls_back_to_source_id() {
        let record = SourceRecord {
            source_id: Some("S-9".to_string()),
            ..SourceRecord::default()
        };
        let raw = RawRecord::from_source(record, at()).expect("normalizes");
        assert_eq!(raw.internal_id, "S-9");
        assert_eq!(raw.source_id, "S-9");
        assert!(!raw.id_was_synthesized);
    }

    #[test]
    fn both_ids_absent_synthesizes_from_case_number() {
        let record = SourceRecord {
            case_number: Some("2:22-cv-00001".to_string()),
            ..SourceRecord::default()
        };
        let raw = RawRecord::from_source(record, at()).expect("normalizes");
        assert!(raw.id_was_synthesized);
        assert!(raw.internal_id.starts_with("syn-2:22-cv-00001-"));
        assert_eq!(raw.source_id, raw.internal_id);
    }

    #[test]
    fn no_identifier_at_all_is_an_input_error() {
        let record = SourceRecord::default();
        assert!(matches!(
            RawRecord::from_source(record, at()),
            Err(InputError::NoStableIdentifier)
        ));
    }

    #[test]
    fn scalar_metadata_is_wrapped_and_flagged() {
        let record = SourceRecord {
            internal_id: Some("A-1".to_string()),
            metadata: json!("oops, a bare string"),
            ..SourceRecord::default()
        };
        let raw = RawRecord::from_source(record, at()).expect("normalizes");
        assert!(raw.metadata_was_scalar);
        assert_eq!(
            raw.metadata.get("raw"),
            Some(&json!("oops, a bare string"))
        );
    }

    #[test]
    fn mapping_metadata_passes_through() {
        let record = SourceRecord {
            internal_id: Some("A-1".to_string()),
            metadata: json!({"court": "txed"}),
            ..SourceRecord::default()
        };
        let raw = RawRecord::from_source(record, at()).expect("normalizes");
        assert!(!raw.metadata_was_scalar);
        assert_eq!(raw.metadata_str("court"), Some("txed"));
    }

    #[test]
    fn blank_kind_hint_becomes_none() {
        let record = SourceRecord {
            internal_id: Some("A-1".to_string()),
            kind_hint: Some("  ".to_string()),
            ..SourceRecord::default()
        };
        let raw = RawRecord::from_source(record, at()).expect("normalizes");
        assert!(raw.kind_hint.is_none());
    }

    #[test]
    fn fulfillment_records_are_marked_purchased() {
        let record = SourceRecord {
            internal_id: Some("A-1".to_string()),
            content: Some("the purchased body".to_string()),
            ..SourceRecord::default()
        };
        let raw = RawRecord::from_fulfillment(record, at()).expect("normalizes");
        assert_eq!(raw.origin, RecordOrigin::Purchased);
    }
}
