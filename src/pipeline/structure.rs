//! Structure analysis stage.
//!
//! Shallow outline only: detected section headers, paragraph count, and
//! estimated opinion boundaries. No semantic parsing.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};

use crate::pipeline::stage::{EnrichmentStage, StageContext, StageId, StageSkip};

/// Headers common to federal opinions and orders.
const SECTION_WORDS: [&str; 8] = [
    "INTRODUCTION",
    "BACKGROUND",
    "LEGAL STANDARD",
    "DISCUSSION",
    "ANALYSIS",
    "CONCLUSION",
    "OPINION",
    "ORDER",
];

pub struct StructureAnalysisStage {
    numbered_heading: Regex,
}

impl Default for StructureAnalysisStage {
    fn default() -> Self {
        Self::new()
    }
}

impl StructureAnalysisStage {
    #[must_use]
    pub fn new() -> Self {
        // `I. BACKGROUND`, `IV. Discussion`, `A. Claim Construction`
        let numbered_heading = Regex::new(r"^\s*(?:[IVXL]+|[A-Z])\.\s+\S.{0,80}$")
            .expect("heading pattern is static and valid");
        Self { numbered_heading }
    }
}

#[async_trait]
impl EnrichmentStage for StructureAnalysisStage {
    fn id(&self) -> StageId {
        StageId::Structure
    }

    async fn run(&self, ctx: &StageContext<'_>) -> anyhow::Result<Value> {
        let content = &ctx.record.content;
        if content.trim().is_empty() {
            return Err(StageSkip::new("empty content").into());
        }

        let mut headers: Vec<String> = Vec::new();
        let mut opinion_start: Option<usize> = None;
        let mut opinion_end: Option<usize> = None;
        let mut offset = 0usize;

        for line in content.lines() {
            let trimmed = line.trim();
            if is_section_header(trimmed) || self.numbered_heading.is_match(trimmed) {
                headers.push(trimmed.to_string());
            }

            let upper = trimmed.to_ascii_uppercase();
            if opinion_start.is_none()
                && (upper.contains("MEMORANDUM OPINION")
                    || upper == "OPINION"
                    || upper.contains("OPINION AND ORDER"))
            {
                opinion_start = Some(offset);
            }
            if upper.contains("IT IS SO ORDERED") || upper.starts_with("CONCLUSION") {
                opinion_end = Some(offset + line.len());
            }

            offset += line.len() + 1;
        }

        let paragraph_count = content
            .split("\n\n")
            .filter(|block| !block.trim().is_empty())
            .count();

        Ok(json!({
            "section_headers": headers,
            "paragraph_count": paragraph_count,
            "opinion_boundaries": {
                "start_offset": opinion_start,
                "end_offset": opinion_end,
            },
        }))
    }
}

fn is_section_header(line: &str) -> bool {
    if line.is_empty() || line.len() > 60 {
        return false;
    }
    let upper = line.trim_end_matches(['.', ':']);
    SECTION_WORDS
        .iter()
        .any(|word| upper.eq_ignore_ascii_case(word))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::pipeline::classify::{DocumentCategory, JudgeMode};
    use crate::pipeline::stage::ScanCaps;
    use crate::registry::Registries;
    use crate::source::{RawRecord, SourceRecord};

    async fn run(content: &str) -> anyhow::Result<Value> {
        let record = RawRecord::from_source(
            SourceRecord {
                internal_id: Some("S-1".to_string()),
                content: Some(content.to_string()),
                ..SourceRecord::default()
            },
            Utc::now(),
        )
        .expect("valid record");
        let registries = Registries::builtin();
        let ctx = StageContext {
            record: &record,
            category: DocumentCategory::FullOpinion,
            judge_mode: JudgeMode::ContentFirst,
            registries: &registries,
            outcomes: &[],
            caps: ScanCaps::default(),
        };
        StructureAnalysisStage::new().run(&ctx).await
    }

    #[tokio::test]
    async fn detects_headers_and_paragraphs() {
        let content = "MEMORANDUM OPINION\n\nI. BACKGROUND\n\nThe plaintiff filed suit.\n\nII. DISCUSSION\n\nSummary judgment is proper.\n\nCONCLUSION\n\nIT IS SO ORDERED.";
        let payload = run(content).await.expect("ok");
        let headers = payload["section_headers"].as_array().expect("headers");
        assert!(headers.iter().any(|h| h == "I. BACKGROUND"));
        assert!(headers.iter().any(|h| h == "CONCLUSION"));
        assert!(payload["paragraph_count"].as_u64().expect("count") >= 5);
        assert!(payload["opinion_boundaries"]["start_offset"].is_number());
        assert!(payload["opinion_boundaries"]["end_offset"].is_number());
    }

    #[tokio::test]
    async fn empty_content_is_a_skip() {
        let error = run(" \n ").await.expect_err("skip");
        assert!(error.downcast_ref::<StageSkip>().is_some());
    }

    #[tokio::test]
    async fn plain_prose_has_no_headers_but_still_counts_paragraphs() {
        let payload = run("Just a paragraph.\n\nAnd another one.")
            .await
            .expect("ok");
        assert_eq!(payload["section_headers"].as_array().expect("headers").len(), 0);
        assert_eq!(payload["paragraph_count"], 2);
    }
}
