//! Keyword extraction stage.
//!
//! Matches a closed vocabulary of procedural phrases against content.
//! This is keyword matching, not analysis; the payload carries
//! `method="keyword_match"` so downstream consumers cannot mistake it for
//! inference.

use aho_corasick::{AhoCorasick, MatchKind};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::pipeline::stage::{EnrichmentStage, StageContext, StageId, StageSkip};

pub const METHOD_LABEL: &str = "keyword_match";

/// Closed vocabulary of procedural and substantive phrases.
const VOCABULARY: [&str; 24] = [
    "summary judgment",
    "motion to dismiss",
    "motion to compel",
    "motion in limine",
    "claim construction",
    "markman hearing",
    "preliminary injunction",
    "temporary restraining order",
    "class certification",
    "habeas corpus",
    "qualified immunity",
    "personal jurisdiction",
    "subject matter jurisdiction",
    "improper venue",
    "transfer of venue",
    "default judgment",
    "protective order",
    "attorney fees",
    "sanctions",
    "willful infringement",
    "invalidity",
    "obviousness",
    "remand",
    "arbitration",
];

pub struct KeywordExtractionStage {
    matcher: AhoCorasick,
}

impl Default for KeywordExtractionStage {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordExtractionStage {
    #[must_use]
    pub fn new() -> Self {
        let matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(VOCABULARY)
            .expect("keyword vocabulary is static and valid");
        Self { matcher }
    }

    /// Phrase hit counts in vocabulary order.
    #[must_use]
    pub fn match_counts(&self, content: &str) -> Vec<(&'static str, u32)> {
        let mut counts = [0u32; VOCABULARY.len()];
        for matched in self.matcher.find_iter(content) {
            counts[matched.pattern().as_usize()] += 1;
        }
        VOCABULARY
            .iter()
            .zip(counts)
            .filter(|(_, count)| *count > 0)
            .map(|(&phrase, count)| (phrase, count))
            .collect()
    }
}

#[async_trait]
impl EnrichmentStage for KeywordExtractionStage {
    fn id(&self) -> StageId {
        StageId::Keyword
    }

    async fn run(&self, ctx: &StageContext<'_>) -> anyhow::Result<Value> {
        let content = &ctx.record.content;
        if content.trim().is_empty() {
            return Err(StageSkip::new("empty content").into());
        }

        let matches = self.match_counts(content);
        if matches.is_empty() {
            return Err(StageSkip::new("no keywords matched").into());
        }

        let keywords: Vec<Value> = matches
            .into_iter()
            .map(|(phrase, count)| json!({ "phrase": phrase, "count": count }))
            .collect();

        Ok(json!({
            "method": METHOD_LABEL,
            "keywords": keywords,
        }))
    }
}
