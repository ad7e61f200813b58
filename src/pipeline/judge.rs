//! Judge resolution stage.
//!
//! Three signal modes: metadata fields, jurisdiction-scoped initials, and
//! a regex scan of the opening content window. The plan's judge mode
//! decides attempt order; a high-confidence candidate short-circuits,
//! otherwise every mode is consulted and the best candidate wins, ties
//! going to the earlier mode.

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};

use crate::pipeline::classify::JudgeMode;
use crate::pipeline::stage::{EnrichmentStage, StageContext, StageFailure, StageId};

/// Metadata fields probed in order.
const METADATA_FIELDS: [&str; 4] = ["assigned_to", "assigned_to_str", "judge", "judge_name"];

/// Metadata fields that may carry judge initials.
const INITIALS_FIELDS: [&str; 2] = ["federal_dn_judge_initials_assigned", "judge_initials"];

/// Hosts whose URLs carry a judge slug as the trailing path segment.
const KNOWN_JUDGE_HOSTS: [&str; 2] = ["courtlistener.com", "law.resource.org"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeSource {
    Metadata,
    Initials,
    Content,
}

#[derive(Debug, Clone)]
struct Candidate {
    name: String,
    source: JudgeSource,
    confidence: Confidence,
}

pub struct JudgeResolutionStage {
    before_pattern: Regex,
    signature_pattern: Regex,
}

impl Default for JudgeResolutionStage {
    fn default() -> Self {
        Self::new()
    }
}

impl JudgeResolutionStage {
    #[must_use]
    pub fn new() -> Self {
        // `Before GILSTRAP, J.` / `Before the Honorable Rodney Gilstrap`
        let before_pattern = Regex::new(
            r"\b[Bb]efore[:\s]+(?:[Tt]he\s+)?(?:[Hh]onorable\s+|HONORABLE\s+)?(?P<name>[A-Z][A-Za-z.'\-]+(?:\s+[A-Z][A-Za-z.'\-]+){0,3})",
        )
        .expect("judge pattern is static and valid");
        // `GILSTRAP, District Judge` signature lines
        let signature_pattern = Regex::new(
            r"(?P<name>[A-Z][A-Z.'\-]{2,}(?:\s+[A-Z][A-Z.'\-]{2,}){0,2}),\s+(?:Chief\s+)?(?:District|Circuit|Magistrate)?\s*Judge",
        )
        .expect("signature pattern is static and valid");
        Self {
            before_pattern,
            signature_pattern,
        }
    }

    fn metadata_candidate(&self, ctx: &StageContext<'_>) -> Option<Candidate> {
        for field in METADATA_FIELDS {
            let Some(value) = ctx.record.metadata.get(field) else {
                continue;
            };
            // Upstream quirk: the field is sometimes an integer row id.
            // Treat that as if the field were absent.
            if value.is_number() {
                continue;
            }
            let Some(text) = value.as_str() else { continue };
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let name = if is_known_judge_url(text) {
                title_case_slug(trailing_segment(text)?)
            } else if text.starts_with("http://") || text.starts_with("https://") {
                continue;
            } else {
                text.to_string()
            };
            return Some(Candidate {
                name,
                source: JudgeSource::Metadata,
                confidence: Confidence::High,
            });
        }
        None
    }

    fn initials_candidate(&self, ctx: &StageContext<'_>) -> Option<Candidate> {
        // Initials are only meaningful within a jurisdiction; without a
        // resolved court this mode does not fire.
        let jurisdiction = ctx.resolved_jurisdiction()?;
        for field in INITIALS_FIELDS {
            let Some(code) = ctx.record.metadata_str(field) else {
                continue;
            };
            if let Some(name) = ctx.registries.judges.lookup(jurisdiction, code) {
                return Some(Candidate {
                    name: name.to_string(),
                    source: JudgeSource::Initials,
                    confidence: Confidence::Medium,
                });
            }
        }
        None
    }

    fn content_candidate(&self, ctx: &StageContext<'_>) -> Option<Candidate> {
        let content = &ctx.record.content;
        if content.trim().is_empty() {
            return None;
        }
        let end = content
            .char_indices()
            .nth(ctx.caps.judge_content_window)
            .map_or(content.len(), |(idx, _)| idx);
        let window = &content[..end];

        let name = self
            .before_pattern
            .captures(window)
            .or_else(|| self.signature_pattern.captures(window))
            .map(|captures| clean_content_name(&captures["name"]))?;
        if name.is_empty() {
            return None;
        }
        Some(Candidate {
            name,
            source: JudgeSource::Content,
            confidence: Confidence::Low,
        })
    }
}

#[async_trait]
impl EnrichmentStage for JudgeResolutionStage {
    fn id(&self) -> StageId {
        StageId::Judge
    }

    async fn run(&self, ctx: &StageContext<'_>) -> anyhow::Result<Value> {
        let modes: [fn(&Self, &StageContext<'_>) -> Option<Candidate>; 3] = match ctx.judge_mode {
            JudgeMode::MetadataFirst => [
                Self::metadata_candidate,
                Self::initials_candidate,
                Self::content_candidate,
            ],
            JudgeMode::ContentFirst => [
                Self::content_candidate,
                Self::initials_candidate,
                Self::metadata_candidate,
            ],
        };

        let mut best: Option<Candidate> = None;
        for mode in modes {
            if let Some(candidate) = mode(self, ctx) {
                if candidate.confidence == Confidence::High {
                    best = Some(candidate);
                    break;
                }
                let better = best
                    .as_ref()
                    .is_none_or(|current| candidate.confidence > current.confidence);
                if better {
                    best = Some(candidate);
                }
            }
        }

        match best {
            Some(candidate) => Ok(json!({
                "name": candidate.name,
                "source": candidate.source,
                "confidence": candidate.confidence,
            })),
            None => Err(StageFailure::new("no judge signal").into()),
        }
    }
}

fn is_known_judge_url(text: &str) -> bool {
    (text.starts_with("http://") || text.starts_with("https://"))
        && KNOWN_JUDGE_HOSTS.iter().any(|host| text.contains(host))
}

fn trailing_segment(url: &str) -> Option<&str> {
    url.trim_end_matches('/')
        .rsplit('/')
        .find(|segment| !segment.is_empty() && !segment.contains(':'))
}

/// `rodney-gilstrap` -> `Rodney Gilstrap`
fn title_case_slug(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize an all-caps capture like `GILSTRAP` to `Gilstrap`, keeping
/// mixed-case names as written and dropping a trailing role word.
fn clean_content_name(raw: &str) -> String {
    let trimmed = raw
        .trim()
        .trim_end_matches(',')
        .trim_end_matches(" J.")
        .trim();
    trimmed
        .split_whitespace()
        .filter(|word| {
            !matches!(
                word.to_ascii_lowercase().as_str(),
                "judge" | "district" | "circuit" | "chief" | "magistrate" | "court" | "the"
            )
        })
        .map(|word| {
            if word.len() > 2 && word.chars().all(|c| c.is_ascii_uppercase() || c == '.') {
                title_case_slug(&word.to_ascii_lowercase())
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
