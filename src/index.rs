//! Search-index handoff.
//!
//! The sink accepts a bare list of documents as its payload, each with the
//! full content and a flat metadata mapping suitable for faceting. The
//! handoff for a record happens only after its upsert succeeded.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::pipeline::assemble::{EnrichedRecord, SUMMARY_KEY};

#[derive(Debug, Clone, Serialize)]
pub struct IndexDocument {
    pub internal_id: String,
    pub content: String,
    /// Flat facet fields only, no nesting.
    pub metadata: Map<String, Value>,
}

impl IndexDocument {
    /// Flatten an enriched record into its index shape: kind, category,
    /// case number, jurisdiction, and every scalar summary flag.
    #[must_use]
    pub fn from_enriched(enriched: &EnrichedRecord) -> Self {
        let record = &enriched.classified.record;
        let mut metadata = Map::new();
        metadata.insert(
            "kind".to_string(),
            Value::String(
                record
                    .kind_hint
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            ),
        );
        if let Some(case_number) = &record.case_number {
            metadata.insert("case_number".to_string(), Value::String(case_number.clone()));
        }
        if let Some(jurisdiction) = &enriched.jurisdiction_id {
            metadata.insert(
                "jurisdiction_id".to_string(),
                Value::String(jurisdiction.clone()),
            );
        }
        if let Some(summary) = enriched.metadata_blob.get(SUMMARY_KEY).and_then(Value::as_object) {
            for (key, value) in summary {
                // Facet fields stay scalar.
                if value.is_string() || value.is_number() || value.is_boolean() {
                    metadata.insert(key.clone(), value.clone());
                }
            }
        }

        Self {
            internal_id: record.internal_id.clone(),
            content: record.content.clone(),
            metadata,
        }
    }
}

/// Downstream vector/search index. The payload is the list itself.
#[async_trait]
pub trait IndexSink: Send + Sync {
    async fn submit(&self, documents: &[IndexDocument]) -> Result<()>;
}

/// Sink that logs the handoff; stands in where no index is configured.
pub struct TracingIndexSink;

#[async_trait]
impl IndexSink for TracingIndexSink {
    async fn submit(&self, documents: &[IndexDocument]) -> Result<()> {
        info!(
            document_count = documents.len(),
            "index handoff (no sink configured)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::pipeline::assemble::MetadataAssembler;
    use crate::pipeline::classify::DocumentClassifier;
    use crate::pipeline::stage::{StageId, StageOutcome};
    use crate::source::{RawRecord, SourceRecord};

    #[test]
    fn index_document_flattens_summary_scalars() {
        let record = RawRecord::from_source(
            SourceRecord {
                internal_id: Some("IX-1".to_string()),
                kind_hint: Some("docket".to_string()),
                case_number: Some("2:22-cv-00002".to_string()),
                metadata: json!({"court_id": "txed"}),
                ..SourceRecord::default()
            },
            Utc::now(),
        )
        .expect("valid record");
        let classified = DocumentClassifier::new().classify(record);
        let outcomes = vec![StageOutcome::ok(
            StageId::Court,
            json!({"jurisdiction_id": "txed", "source": "court_id"}),
            Duration::from_millis(1),
        )];
        let enriched = MetadataAssembler::assemble(
            classified,
            outcomes,
            80.0,
            "hash".to_string(),
            "print".to_string(),
        );

        let document = IndexDocument::from_enriched(&enriched);
        assert_eq!(document.internal_id, "IX-1");
        assert_eq!(document.metadata["jurisdiction_id"], "txed");
        assert_eq!(document.metadata["court_resolved"], json!(true));
        assert_eq!(document.metadata["case_number"], "2:22-cv-00002");
        // Flat mapping only.
        assert!(document.metadata.values().all(|v| !v.is_object() && !v.is_array()));
    }

    #[test]
    fn payload_serializes_as_a_bare_list() {
        let documents: Vec<IndexDocument> = vec![];
        let payload = serde_json::to_value(&documents).expect("serializes");
        assert!(payload.is_array());
    }
}
