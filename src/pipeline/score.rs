//! Completeness scoring.
//!
//! Scores are relative to the record's stage plan: a stage the plan
//! skipped leaves both numerator and denominator, so a docket with no
//! body text is never penalized for having no citations. A stage that
//! ran and came back empty or failed stays in the denominator with zero
//! credit.

use crate::pipeline::classify::{ClassifiedRecord, DocumentCategory, PlanDisposition};
use crate::pipeline::stage::{StageId, StageOutcome};

/// Per-signal weights for one category.
#[derive(Debug, Clone, Copy)]
pub struct SignalWeights {
    pub court: u32,
    pub judge: u32,
    pub citations: u32,
    pub reporters: u32,
    pub structure: u32,
    pub key_fields: u32,
}

/// Weight table per category. `unknown` borrows the `order` column,
/// restricted by its own plan.
#[must_use]
pub fn weights_for(category: DocumentCategory) -> SignalWeights {
    match category {
        DocumentCategory::FullOpinion => SignalWeights {
            court: 15,
            judge: 15,
            citations: 25,
            reporters: 10,
            structure: 15,
            key_fields: 20,
        },
        DocumentCategory::MetadataDocument => SignalWeights {
            court: 40,
            judge: 40,
            citations: 0,
            reporters: 0,
            structure: 0,
            key_fields: 20,
        },
        DocumentCategory::Order | DocumentCategory::Unknown => SignalWeights {
            court: 25,
            judge: 25,
            citations: 20,
            reporters: 10,
            structure: 10,
            key_fields: 10,
        },
    }
}

/// Metadata fields whose presence marks the record as well-described.
const KEY_METADATA_FIELDS: [&str; 7] = [
    "court",
    "court_id",
    "assigned_to",
    "assigned_to_str",
    "date_filed",
    "date_created",
    "nature_of_suit",
];

/// Completeness in `[0, 100]`, relative to the plan.
#[must_use]
pub fn completeness(classified: &ClassifiedRecord, outcomes: &[StageOutcome]) -> f64 {
    let weights = weights_for(classified.category);
    let stage_signals = [
        (StageId::Court, weights.court),
        (StageId::Judge, weights.judge),
        (StageId::Citation, weights.citations),
        (StageId::Reporter, weights.reporters),
        (StageId::Structure, weights.structure),
    ];

    let mut numerator = 0u32;
    let mut denominator = 0u32;

    for (stage, weight) in stage_signals {
        if weight == 0 {
            continue;
        }
        let Some(entry) = classified.plan.entries.iter().find(|e| e.stage == stage) else {
            continue;
        };
        if matches!(entry.disposition, PlanDisposition::SkipByPlan { .. }) {
            continue;
        }
        denominator += weight;
        let stage_ok = outcomes.iter().any(|o| o.stage == stage && o.is_ok());
        if stage_ok {
            numerator += weight;
        }
    }

    if weights.key_fields > 0 {
        denominator += weights.key_fields;
        if key_fields_present(classified) {
            numerator += weights.key_fields;
        }
    }

    if denominator == 0 {
        return 0.0;
    }
    (f64::from(numerator) / f64::from(denominator) * 100.0).clamp(0.0, 100.0)
}

fn key_fields_present(classified: &ClassifiedRecord) -> bool {
    let record = &classified.record;
    let has_case_number = record
        .case_number
        .as_deref()
        .is_some_and(|c| !c.trim().is_empty());
    let has_descriptive_field = KEY_METADATA_FIELDS
        .iter()
        .any(|field| record.metadata.contains_key(*field));
    has_case_number && has_descriptive_field
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::pipeline::classify::DocumentClassifier;
    use crate::source::{RawRecord, SourceRecord};

    fn classified(kind_hint: &str, content_len: usize) -> ClassifiedRecord {
        let record = RawRecord::from_source(
            SourceRecord {
                internal_id: Some("SC-1".to_string()),
                kind_hint: Some(kind_hint.to_string()),
                content: Some("x".repeat(content_len)),
                case_number: Some("2:22-cv-00001".to_string()),
                metadata: json!({"court_id": "txed"}),
                ..SourceRecord::default()
            },
            Utc::now(),
        )
        .expect("valid record");
        DocumentClassifier::new().classify(record)
    }

    fn ok(stage: StageId) -> StageOutcome {
        StageOutcome::ok(stage, json!({"done": true}), Duration::from_millis(1))
    }

    fn failed(stage: StageId) -> StageOutcome {
        StageOutcome::failed(stage, "reason", None, Duration::from_millis(1))
    }

    #[test]
    fn docket_is_not_penalized_for_absent_citations() {
        let classified = classified("docket", 0);
        let outcomes = vec![ok(StageId::Court), ok(StageId::Judge)];
        let score = completeness(&classified, &outcomes);
        assert!((score - 100.0).abs() < f64::EPSILON, "score was {score}");
    }

    #[test]
    fn failed_stage_keeps_its_weight_in_the_denominator() {
        let classified = classified("docket", 0);
        let outcomes = vec![ok(StageId::Court), failed(StageId::Judge)];
        let score = completeness(&classified, &outcomes);
        // court 40 + key fields 20 out of 100
        assert!((score - 60.0).abs() < f64::EPSILON, "score was {score}");
    }

    #[test]
    fn full_opinion_with_everything_ok_scores_100() {
        let classified = classified("opinion", 6000);
        let outcomes = vec![
            ok(StageId::Court),
            ok(StageId::Citation),
            ok(StageId::Reporter),
            ok(StageId::Judge),
            ok(StageId::Structure),
        ];
        let score = completeness(&classified, &outcomes);
        assert!((score - 100.0).abs() < f64::EPSILON, "score was {score}");
    }

    #[test]
    fn unknown_category_excludes_structure_from_the_denominator() {
        let classified = classified("mystery", 10);
        let outcomes = vec![
            ok(StageId::Court),
            failed(StageId::Citation),
            failed(StageId::Reporter),
            failed(StageId::Judge),
        ];
        // order weights minus structure: denominator 25+25+20+10+10 = 90
        let score = completeness(&classified, &outcomes);
        let expected = (25.0 + 10.0) / 90.0 * 100.0;
        assert!((score - expected).abs() < 0.001, "score was {score}");
    }

    #[test]
    fn score_is_always_within_bounds() {
        let classified = classified("order", 2000);
        assert!(completeness(&classified, &[]) >= 0.0);
        let all_ok: Vec<StageOutcome> = StageId::ALL.iter().map(|&s| ok(s)).collect();
        assert!(completeness(&classified, &all_ok) <= 100.0);
    }

    #[test]
    fn missing_key_fields_cost_their_weight() {
        let record = RawRecord::from_source(
            SourceRecord {
                internal_id: Some("SC-2".to_string()),
                kind_hint: Some("docket".to_string()),
                metadata: json!({}),
                ..SourceRecord::default()
            },
            Utc::now(),
        )
        .expect("valid record");
        let classified = DocumentClassifier::new().classify(record);
        let outcomes = vec![ok(StageId::Court), ok(StageId::Judge)];
        let score = completeness(&classified, &outcomes);
        assert!((score - 80.0).abs() < f64::EPSILON, "score was {score}");
    }
}
