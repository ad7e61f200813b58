//! Citation extraction stage.
//!
//! Finds `volume reporter page` citations in body text, with optional
//! party names and a parenthetical year. Identical raw citations are
//! reported once with a count. Work is bounded by a soft cap on scanned
//! characters; anything beyond it is ignored and flagged `truncated`.

use async_trait::async_trait;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::{Value, json};
use smallvec::SmallVec;

use crate::pipeline::stage::{EnrichmentStage, StageContext, StageId, StageSkip};

#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub raw_text: String,
    pub reporter_abbrev: String,
    pub volume: u32,
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parties: Option<String>,
    pub count: u32,
}

pub struct CitationExtractionStage {
    pattern: Regex,
    year_pattern: Regex,
}

impl Default for CitationExtractionStage {
    fn default() -> Self {
        Self::new()
    }
}

impl CitationExtractionStage {
    #[must_use]
    pub fn new() -> Self {
        // Reporter tokens are abbreviation words (`F.3d`, `Supp.`, `U.S.`)
        // or series markers (`2d`, `4th`), at most four of them.
        let pattern = Regex::new(
            r"(?x)
            (?:(?P<parties>[A-Z][A-Za-z0-9.,'&\-\ ]{1,70}?\s+v\.\s+[A-Z][A-Za-z0-9.,'&\-\ ]{1,70}?),\s+)?
            \b(?P<volume>\d{1,4})\s+
            (?P<reporter>
                (?:[A-Z][A-Za-z0-9.']*|\d{1,2}[a-z]{1,3})
                (?:[\ ](?:[A-Z][A-Za-z0-9.']*|\d{1,2}[a-z]{1,3})){0,3}
            )\s+
            (?P<page>\d{1,5})\b
            (?:\s+\((?P<paren>[^)]{0,80})\))?
            ",
        )
        .expect("citation pattern is static and valid");
        let year_pattern = Regex::new(r"\b(1[89]\d{2}|20\d{2})\b")
            .expect("year pattern is static and valid");
        Self {
            pattern,
            year_pattern,
        }
    }

    /// Extract deduplicated citations from a bounded window of `content`.
    #[must_use]
    pub fn extract(&self, content: &str, soft_cap: usize, ctx: &StageContext<'_>) -> Extraction {
        let (window, truncated) = bounded_window(content, soft_cap);

        let mut order: Vec<String> = Vec::new();
        let mut by_raw: FxHashMap<String, Citation> = FxHashMap::default();

        for captures in self.pattern.captures_iter(window) {
            let reporter = captures["reporter"].trim().to_string();
            // Plausibility gate: a real reporter abbreviation either
            // carries a period or is known to the registry (e.g. `WL`).
            if !reporter.contains('.') && ctx.registries.reporters.resolve(&reporter).is_none() {
                continue;
            }
            let (Ok(volume), Ok(page)) = (
                captures["volume"].parse::<u32>(),
                captures["page"].parse::<u32>(),
            ) else {
                continue;
            };

            let raw_text = format!("{volume} {reporter} {page}");
            if let Some(existing) = by_raw.get_mut(&raw_text) {
                existing.count += 1;
                continue;
            }

            let year = captures
                .name("paren")
                .and_then(|paren| self.year_pattern.find(paren.as_str()))
                .and_then(|m| m.as_str().parse::<u16>().ok());
            let parties = captures
                .name("parties")
                .map(|m| m.as_str().trim().to_string());

            order.push(raw_text.clone());
            by_raw.insert(
                raw_text.clone(),
                Citation {
                    raw_text,
                    reporter_abbrev: reporter,
                    volume,
                    page,
                    year,
                    parties,
                    count: 1,
                },
            );
        }

        let citations: SmallVec<[Citation; 8]> = order
            .into_iter()
            .filter_map(|raw| by_raw.remove(&raw))
            .collect();

        Extraction {
            citations: citations.into_vec(),
            truncated,
            scanned_chars: window.chars().count(),
        }
    }
}

pub struct Extraction {
    pub citations: Vec<Citation>,
    pub truncated: bool,
    pub scanned_chars: usize,
}

#[async_trait]
impl EnrichmentStage for CitationExtractionStage {
    fn id(&self) -> StageId {
        StageId::Citation
    }

    async fn run(&self, ctx: &StageContext<'_>) -> anyhow::Result<Value> {
        if ctx.record.content.trim().is_empty() {
            return Err(StageSkip::new("empty content").into());
        }

        let extraction = self.extract(&ctx.record.content, ctx.caps.citation_soft_cap, ctx);
        if extraction.citations.is_empty() {
            return Err(StageSkip::new("no citations found").into());
        }

        Ok(json!({
            "citations": extraction.citations,
            "truncated": extraction.truncated,
            "scanned_chars": extraction.scanned_chars,
        }))
    }
}

/// Prefix of at most `cap` characters, cut at a char boundary.
fn bounded_window(content: &str, cap: usize) -> (&str, bool) {
    match content.char_indices().nth(cap) {
        Some((idx, _)) => (&content[..idx], true),
        None => (content, false),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::pipeline::classify::{DocumentCategory, JudgeMode};
    use crate::pipeline::stage::ScanCaps;
    use crate::registry::Registries;
    use crate::source::{RawRecord, SourceRecord};

    fn raw(content: &str) -> RawRecord {
        RawRecord::from_source(
            SourceRecord {
                internal_id: Some("CIT-1".to_string()),
                content: Some(content.to_string()),
                ..SourceRecord::default()
            },
            Utc::now(),
        )
        .expect("valid record")
    }

    fn extract(content: &str, cap: usize) -> Extraction {
        let registries = Registries::builtin();
        let record = raw(content);
        let ctx = StageContext {
            record: &record,
            category: DocumentCategory::FullOpinion,
            judge_mode: JudgeMode::ContentFirst,
            registries: &registries,
            outcomes: &[],
            caps: ScanCaps::default(),
        };
        CitationExtractionStage::new().extract(content, cap, &ctx)
    }

    #[test]
    fn extracts_volume_reporter_page() {
        let extraction = extract("See 123 F.3d 456 for the standard.", 10_000);
        assert_eq!(extraction.citations.len(), 1);
        let citation = &extraction.citations[0];
        assert_eq!(citation.volume, 123);
        assert_eq!(citation.reporter_abbrev, "F.3d");
        assert_eq!(citation.page, 456);
        assert!(!extraction.truncated);
    }

    #[test]
    fn extracts_year_and_parties() {
        let extraction = extract(
            "Markman v. Westview Instruments, 52 F.3d 967 (Fed. Cir. 1995) controls.",
            10_000,
        );
        let citation = &extraction.citations[0];
        assert_eq!(citation.year, Some(1995));
        assert_eq!(
            citation.parties.as_deref(),
            Some("Markman v. Westview Instruments")
        );
    }

    #[test]
    fn repeated_citations_collapse_with_count() {
        let extraction = extract(
            "See 123 F.3d 456. Later, 123 F.3d 456 again, and 9 F. Supp. 2d 12.",
            10_000,
        );
        assert_eq!(extraction.citations.len(), 2);
        assert_eq!(extraction.citations[0].count, 2);
        assert_eq!(extraction.citations[1].reporter_abbrev, "F. Supp. 2d");
    }

    #[test]
    fn implausible_reporters_are_ignored() {
        let extraction = extract("He lived at 12 Main Street 33 years ago.", 10_000);
        assert!(extraction.citations.is_empty());
    }

    #[test]
    fn soft_cap_truncates_the_scan() {
        let mut content = "x".repeat(200);
        content.push_str(" 123 F.3d 456 ");
        let extraction = extract(&content, 100);
        assert!(extraction.truncated);
        assert!(extraction.citations.is_empty());
        assert_eq!(extraction.scanned_chars, 100);
    }

    #[tokio::test]
    async fn empty_content_is_a_skip() {
        let registries = Registries::builtin();
        let record = raw("   ");
        let ctx = StageContext {
            record: &record,
            category: DocumentCategory::FullOpinion,
            judge_mode: JudgeMode::ContentFirst,
            registries: &registries,
            outcomes: &[],
            caps: ScanCaps::default(),
        };
        let error = CitationExtractionStage::new()
            .run(&ctx)
            .await
            .expect_err("skip");
        let skip = error.downcast_ref::<StageSkip>().expect("stage skip");
        assert_eq!(skip.reason, "empty content");
    }

    #[tokio::test]
    async fn zero_citations_is_a_skip_not_an_empty_success() {
        let registries = Registries::builtin();
        let record = raw("No citations appear anywhere in this text.");
        let ctx = StageContext {
            record: &record,
            category: DocumentCategory::FullOpinion,
            judge_mode: JudgeMode::ContentFirst,
            registries: &registries,
            outcomes: &[],
            caps: ScanCaps::default(),
        };
        let error = CitationExtractionStage::new()
            .run(&ctx)
            .await
            .expect_err("skip");
        let skip = error.downcast_ref::<StageSkip>().expect("stage skip");
        assert_eq!(skip.reason, "no citations found");
    }

    #[tokio::test]
    async fn payload_shape_matches_contract() {
        let registries = Registries::builtin();
        let record = raw("See 123 F.3d 456 (5th Cir. 1999).");
        let ctx = StageContext {
            record: &record,
            category: DocumentCategory::FullOpinion,
            judge_mode: JudgeMode::ContentFirst,
            registries: &registries,
            outcomes: &[],
            caps: ScanCaps::default(),
        };
        let payload = CitationExtractionStage::new().run(&ctx).await.expect("ok");
        assert_eq!(payload["truncated"], json!(false));
        assert_eq!(payload["citations"][0]["raw_text"], "123 F.3d 456");
        assert_eq!(payload["citations"][0]["count"], 1);
    }
}
