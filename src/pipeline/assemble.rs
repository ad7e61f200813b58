//! Metadata assembly and blob merging.
//!
//! Stage outputs are merged into one semi-structured blob with three
//! top-level keys: `source` (the upstream metadata, untouched),
//! `enrichments` (one entry per attempted stage), and `summary` (flat
//! flags for fast querying). On update, the merge never silently
//! downgrades a prior successful enrichment to a failed newer one.

use serde_json::{Map, Value, json};

use crate::pipeline::classify::ClassifiedRecord;
use crate::pipeline::stage::{StageId, StageOutcome};

pub const SOURCE_KEY: &str = "source";
pub const ENRICHMENTS_KEY: &str = "enrichments";
pub const SUMMARY_KEY: &str = "summary";

/// Fully enriched record, ready for persistence and index handoff.
#[derive(Debug, Clone)]
pub struct EnrichedRecord {
    pub classified: ClassifiedRecord,
    pub outcomes: Vec<StageOutcome>,
    pub completeness: f64,
    pub content_hash: String,
    pub fingerprint: String,
    /// Populated only from a successful court outcome.
    pub jurisdiction_id: Option<String>,
    pub metadata_blob: Value,
}

pub struct MetadataAssembler;

impl MetadataAssembler {
    /// Build the enriched record from the classified record and its stage
    /// outcomes.
    #[must_use]
    pub fn assemble(
        classified: ClassifiedRecord,
        outcomes: Vec<StageOutcome>,
        completeness: f64,
        content_hash: String,
        fingerprint: String,
    ) -> EnrichedRecord {
        let jurisdiction_id = outcomes
            .iter()
            .find(|o| o.stage == StageId::Court && o.is_ok())
            .and_then(|o| o.payload.as_ref())
            .and_then(|p| p.get("jurisdiction_id"))
            .and_then(Value::as_str)
            .map(String::from);

        let enrichments = enrichments_map(&outcomes);
        let summary = summary_map(&classified, &enrichments, completeness, &jurisdiction_id);

        let mut blob = Map::new();
        blob.insert(
            SOURCE_KEY.to_string(),
            Value::Object(classified.record.metadata.clone()),
        );
        blob.insert(ENRICHMENTS_KEY.to_string(), Value::Object(enrichments));
        blob.insert(SUMMARY_KEY.to_string(), Value::Object(summary));

        EnrichedRecord {
            classified,
            outcomes,
            completeness,
            content_hash,
            fingerprint,
            jurisdiction_id,
            metadata_blob: Value::Object(blob),
        }
    }
}

fn enrichments_map(outcomes: &[StageOutcome]) -> Map<String, Value> {
    let mut map = Map::new();
    for outcome in outcomes {
        let mut entry = Map::new();
        entry.insert("status".to_string(), json!(outcome.status.as_str()));
        if let Some(payload) = &outcome.payload {
            entry.insert("payload".to_string(), payload.clone());
        }
        if let Some(reason) = &outcome.reason {
            entry.insert("reason".to_string(), json!(reason));
        }
        entry.insert(
            "duration_ms".to_string(),
            json!(outcome.duration.as_millis() as u64),
        );
        map.insert(outcome.stage.as_str().to_string(), Value::Object(entry));
    }
    map
}

fn summary_map(
    classified: &ClassifiedRecord,
    enrichments: &Map<String, Value>,
    completeness: f64,
    jurisdiction_id: &Option<String>,
) -> Map<String, Value> {
    let mut summary = Map::new();
    summary.insert("category".to_string(), json!(classified.category.as_str()));
    summary.insert("completeness".to_string(), json!(completeness));
    summary.insert("origin".to_string(), json!(classified.record.origin.as_str()));

    let flags = summary_flags(enrichments);
    for (key, value) in flags {
        summary.insert(key, value);
    }
    if let Some(jurisdiction) = jurisdiction_id {
        summary.insert("jurisdiction_id".to_string(), json!(jurisdiction));
    }
    if classified.record.id_was_synthesized {
        summary.insert("id_was_synthesized".to_string(), json!(true));
    }
    if classified.record.metadata_was_scalar {
        summary.insert("metadata_was_scalar".to_string(), json!(true));
    }
    summary
}

/// Flat per-stage flags derived from an enrichments map. Also used after
/// a blob merge so the flags always describe the merged state.
fn summary_flags(enrichments: &Map<String, Value>) -> Vec<(String, Value)> {
    let status_of = |stage: StageId| {
        enrichments
            .get(stage.as_str())
            .and_then(|e| e.get("status"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let payload_of = |stage: StageId| enrichments.get(stage.as_str()).and_then(|e| e.get("payload"));

    let mut flags: Vec<(String, Value)> = Vec::new();
    flags.push((
        "court_resolved".to_string(),
        json!(status_of(StageId::Court).as_deref() == Some("ok")),
    ));
    flags.push((
        "judge_identified".to_string(),
        json!(status_of(StageId::Judge).as_deref() == Some("ok")),
    ));
    if let Some(name) = payload_of(StageId::Judge)
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
    {
        flags.push(("judge_name".to_string(), json!(name)));
    }

    let citations_count = payload_of(StageId::Citation)
        .and_then(|p| p.get("citations"))
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    flags.push(("citations_found_count".to_string(), json!(citations_count)));

    let reporters_count = payload_of(StageId::Reporter)
        .and_then(|p| p.get("unique_normalized_count"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    flags.push((
        "reporters_normalized_count".to_string(),
        json!(reporters_count),
    ));

    flags.push((
        "structure_captured".to_string(),
        json!(status_of(StageId::Structure).as_deref() == Some("ok")),
    ));

    let keywords_count = payload_of(StageId::Keyword)
        .and_then(|p| p.get("keywords"))
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    flags.push(("keywords_found_count".to_string(), json!(keywords_count)));

    flags
}

/// Deep merge of a stored blob with a freshly assembled one.
///
/// Per stage: a fresh `ok` wins outright; a fresh non-ok against a prior
/// `ok` keeps the prior entry and records the attempt under
/// `last_attempt`; otherwise the fresh entry wins. Stages present only in
/// the prior blob are preserved. Summary flags are rebuilt from the
/// merged enrichments.
#[must_use]
pub fn merge_metadata_blobs(prior: &Value, fresh: Value) -> Value {
    let Value::Object(mut fresh_map) = fresh else {
        return fresh;
    };
    let Some(prior_map) = prior.as_object() else {
        return Value::Object(fresh_map);
    };

    let empty = Map::new();
    let prior_enrichments = prior_map
        .get(ENRICHMENTS_KEY)
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let fresh_enrichments = fresh_map
        .get(ENRICHMENTS_KEY)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let mut merged = Map::new();
    for (stage, prior_entry) in prior_enrichments {
        merged.insert(stage.clone(), prior_entry.clone());
    }
    for (stage, fresh_entry) in fresh_enrichments {
        let fresh_ok = fresh_entry.get("status").and_then(Value::as_str) == Some("ok");
        let prior_ok = merged
            .get(&stage)
            .and_then(|e| e.get("status"))
            .and_then(Value::as_str)
            == Some("ok");

        if fresh_ok || !prior_ok {
            merged.insert(stage, fresh_entry);
        } else if let Some(Value::Object(prior_entry)) = merged.get_mut(&stage) {
            prior_entry.insert("last_attempt".to_string(), fresh_entry);
        }
    }

    // Rebuild the flags so they describe the merged enrichment state.
    if let Some(Value::Object(summary)) = fresh_map.get_mut(SUMMARY_KEY) {
        for (key, value) in summary_flags(&merged) {
            summary.insert(key, value);
        }
    }

    fresh_map.insert(ENRICHMENTS_KEY.to_string(), Value::Object(merged));
    Value::Object(fresh_map)
}
