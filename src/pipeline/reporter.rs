//! Reporter normalization stage.
//!
//! Rewrites each extracted citation's reporter abbreviation to the
//! canonical form for its exact series. Unknown abbreviations pass
//! through unchanged with `normalized=false`. Unique normalized forms are
//! counted once per document.

use async_trait::async_trait;
use rustc_hash::FxHashSet;
use serde_json::{Value, json};

use crate::pipeline::stage::{EnrichmentStage, StageContext, StageId, StageSkip};

pub struct ReporterNormalizationStage;

#[async_trait]
impl EnrichmentStage for ReporterNormalizationStage {
    fn id(&self) -> StageId {
        StageId::Reporter
    }

    async fn run(&self, ctx: &StageContext<'_>) -> anyhow::Result<Value> {
        let Some(citations) = ctx.citations() else {
            return Err(StageSkip::new("no citations to normalize").into());
        };

        let mut normalized_citations: Vec<Value> = Vec::with_capacity(citations.len());
        let mut unique_normalized: FxHashSet<&str> = FxHashSet::default();
        let mut unknown: Vec<String> = Vec::new();

        for citation in citations {
            let mut entry = citation.clone();
            let abbrev = citation
                .get("reporter_abbrev")
                .and_then(Value::as_str)
                .unwrap_or_default();

            match ctx.registries.reporters.resolve(abbrev) {
                Some(reporter) => {
                    unique_normalized.insert(reporter.abbreviation);
                    entry["normalized_reporter"] = json!(reporter.abbreviation);
                    entry["reporter_name"] = json!(reporter.name);
                    entry["reporter_series"] = json!(reporter.series);
                    entry["normalized"] = json!(true);
                }
                None => {
                    unknown.push(abbrev.to_string());
                    entry["normalized"] = json!(false);
                }
            }
            normalized_citations.push(entry);
        }

        if unique_normalized.is_empty() {
            return Err(StageSkip::new("no known reporters among citations").into());
        }

        Ok(json!({
            "citations": normalized_citations,
            "unique_normalized_count": unique_normalized.len(),
            "unknown_abbreviations": unknown,
        }))
    }
}
