//! Document classification and stage-plan selection.
//!
//! All per-kind behavior is decided here, once, as a plan. Stages never
//! inspect the document kind themselves; they read the plan's context.

use serde::Serialize;

use crate::pipeline::stage::StageId;
use crate::source::RawRecord;

/// Derived document category. First matching rule wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    FullOpinion,
    MetadataDocument,
    Order,
    Unknown,
}

impl DocumentCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentCategory::FullOpinion => "full_opinion",
            DocumentCategory::MetadataDocument => "metadata_document",
            DocumentCategory::Order => "order",
            DocumentCategory::Unknown => "unknown",
        }
    }
}

/// Which signal the judge stage tries first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeMode {
    ContentFirst,
    MetadataFirst,
}

/// Whether a planned stage runs or is skipped up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanDisposition {
    Run,
    SkipByPlan { reason: String },
}

#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub stage: StageId,
    pub disposition: PlanDisposition,
}

/// Ordered list of stages selected for one record.
#[derive(Debug, Clone)]
pub struct StagePlan {
    pub entries: Vec<PlanEntry>,
    pub judge_mode: JudgeMode,
}

impl StagePlan {
    /// Every stage with a plan entry, whether run or skipped up front.
    #[must_use]
    pub fn planned_stages(&self) -> Vec<StageId> {
        self.entries.iter().map(|e| e.stage).collect()
    }

    /// Whether the plan includes the stage with a `Run` disposition.
    #[must_use]
    pub fn runs(&self, stage: StageId) -> bool {
        self.entries
            .iter()
            .any(|e| e.stage == stage && e.disposition == PlanDisposition::Run)
    }

    /// Whether the stage appears in the plan at all.
    #[must_use]
    pub fn includes(&self, stage: StageId) -> bool {
        self.entries.iter().any(|e| e.stage == stage)
    }
}

/// A record plus its derived category and plan. Immutable thereafter.
#[derive(Debug, Clone)]
pub struct ClassifiedRecord {
    pub record: RawRecord,
    pub category: DocumentCategory,
    pub plan: StagePlan,
}

/// Classifies records and builds their stage plans.
#[derive(Debug, Clone, Copy)]
pub struct DocumentClassifier {
    /// Content length strictly above which an "opinion" hint is a full
    /// opinion.
    opinion_min_chars: usize,
    /// Content length strictly above which an "order" hint is an order.
    order_min_chars: usize,
}

impl Default for DocumentClassifier {
    fn default() -> Self {
        Self {
            opinion_min_chars: 5_000,
            order_min_chars: 1_000,
        }
    }
}

impl DocumentClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn classify(&self, record: RawRecord) -> ClassifiedRecord {
        let category = self.categorize(&record);
        let plan = Self::plan_for(category);
        ClassifiedRecord {
            record,
            category,
            plan,
        }
    }

    fn categorize(&self, record: &RawRecord) -> DocumentCategory {
        let content_len = record.content.chars().count();
        match record.kind_hint.as_deref() {
            Some("opinion") if content_len > self.opinion_min_chars => {
                DocumentCategory::FullOpinion
            }
            Some("docket" | "recap_docket" | "civil_case") => DocumentCategory::MetadataDocument,
            Some("order") if content_len > self.order_min_chars => DocumentCategory::Order,
            _ => DocumentCategory::Unknown,
        }
    }

    /// Stage plan per category. Stages listed as skipped stay in the plan
    /// and receive a skipped outcome; stages absent from the plan produce
    /// no outcome at all (structure for `unknown`).
    #[must_use]
    pub fn plan_for(category: DocumentCategory) -> StagePlan {
        let run = |stage| PlanEntry {
            stage,
            disposition: PlanDisposition::Run,
        };
        let skip = |stage| PlanEntry {
            stage,
            disposition: PlanDisposition::SkipByPlan {
                reason: format!("not applicable for category {}", category.as_str()),
            },
        };

        match category {
            DocumentCategory::FullOpinion => StagePlan {
                entries: vec![
                    run(StageId::Court),
                    run(StageId::Citation),
                    run(StageId::Reporter),
                    run(StageId::Judge),
                    run(StageId::Structure),
                    run(StageId::Keyword),
                ],
                judge_mode: JudgeMode::ContentFirst,
            },
            DocumentCategory::MetadataDocument => StagePlan {
                entries: vec![
                    run(StageId::Court),
                    skip(StageId::Citation),
                    skip(StageId::Reporter),
                    run(StageId::Judge),
                    skip(StageId::Structure),
                    run(StageId::Keyword),
                ],
                judge_mode: JudgeMode::MetadataFirst,
            },
            DocumentCategory::Order => StagePlan {
                entries: vec![
                    run(StageId::Court),
                    run(StageId::Citation),
                    run(StageId::Reporter),
                    run(StageId::Judge),
                    run(StageId::Structure),
                    run(StageId::Keyword),
                ],
                judge_mode: JudgeMode::ContentFirst,
            },
            DocumentCategory::Unknown => StagePlan {
                entries: vec![
                    run(StageId::Court),
                    run(StageId::Citation),
                    run(StageId::Reporter),
                    run(StageId::Judge),
                    run(StageId::Keyword),
                ],
                judge_mode: JudgeMode::ContentFirst,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rstest::rstest;

    use super::*;
    use crate::source::{RawRecord, SourceRecord};

    fn record(kind_hint: Option<&str>, content_len: usize) -> RawRecord {
        RawRecord::from_source(
            SourceRecord {
                internal_id: Some("T-1".to_string()),
                kind_hint: kind_hint.map(String::from),
                content: Some("x".repeat(content_len)),
                ..SourceRecord::default()
            },
            Utc::now(),
        )
        .expect("valid record")
    }

    #[rstest]
    #[case(Some("opinion"), 5001, DocumentCategory::FullOpinion)]
    #[case(Some("opinion"), 5000, DocumentCategory::Unknown)]
    #[case(Some("opinion"), 0, DocumentCategory::Unknown)]
    #[case(Some("docket"), 0, DocumentCategory::MetadataDocument)]
    #[case(Some("recap_docket"), 9000, DocumentCategory::MetadataDocument)]
    #[case(Some("civil_case"), 0, DocumentCategory::MetadataDocument)]
    #[case(Some("order"), 1001, DocumentCategory::Order)]
    #[case(Some("order"), 1000, DocumentCategory::Unknown)]
    #[case(None, 9000, DocumentCategory::Unknown)]
    fn categorization_follows_first_matching_rule(
        #[case] kind_hint: Option<&str>,
        #[case] content_len: usize,
        #[case] expected: DocumentCategory,
    ) {
        let classifier = DocumentClassifier::new();
        let classified = classifier.classify(record(kind_hint, content_len));
        assert_eq!(classified.category, expected);
    }

    #[test]
    fn metadata_document_plan_skips_content_stages() {
        let plan = DocumentClassifier::plan_for(DocumentCategory::MetadataDocument);
        assert!(plan.runs(StageId::Court));
        assert!(plan.runs(StageId::Keyword));
        assert!(!plan.runs(StageId::Citation));
        assert!(plan.includes(StageId::Citation));
        assert!(plan.includes(StageId::Structure));
        assert_eq!(plan.judge_mode, JudgeMode::MetadataFirst);
    }

    #[test]
    fn unknown_plan_omits_structure_entirely() {
        let plan = DocumentClassifier::plan_for(DocumentCategory::Unknown);
        assert!(!plan.includes(StageId::Structure));
        assert!(plan.runs(StageId::Keyword));
        assert_eq!(plan.entries.len(), 5);
    }

    #[test]
    fn full_opinion_plan_runs_everything_in_order() {
        let plan = DocumentClassifier::plan_for(DocumentCategory::FullOpinion);
        assert_eq!(
            plan.planned_stages(),
            vec![
                StageId::Court,
                StageId::Citation,
                StageId::Reporter,
                StageId::Judge,
                StageId::Structure,
                StageId::Keyword,
            ]
        );
        assert!(plan.planned_stages().iter().all(|&s| plan.runs(s)));
    }

    #[test]
    fn skip_reason_names_the_category() {
        let plan = DocumentClassifier::plan_for(DocumentCategory::MetadataDocument);
        let entry = plan
            .entries
            .iter()
            .find(|e| e.stage == StageId::Citation)
            .expect("citation entry");
        match &entry.disposition {
            PlanDisposition::SkipByPlan { reason } => {
                assert_eq!(reason, "not applicable for category metadata_document");
            }
            PlanDisposition::Run => panic!("citation must be skipped for dockets"),
        }
    }
}
