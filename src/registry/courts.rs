/// Static court registry: canonical jurisdiction ids, aliases, case-number
/// prefix patterns, and a content scanner for court names.
use aho_corasick::{AhoCorasick, MatchKind};
use rustc_hash::FxHashMap;

/// Court tier, used by downstream consumers for faceting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourtType {
    Appellate,
    Trial,
    Specialty,
}

impl CourtType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CourtType::Appellate => "appellate",
            CourtType::Trial => "trial",
            CourtType::Specialty => "specialty",
        }
    }
}

/// One registry entry. Loaded at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct CourtEntry {
    pub jurisdiction_id: &'static str,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub parent: Option<&'static str>,
    pub court_type: CourtType,
}

struct PrefixPattern {
    needle: &'static str,
    entry_idx: usize,
}

/// Read-only lookup structure over the built-in court table.
pub struct CourtRegistry {
    entries: Vec<CourtEntry>,
    by_id: FxHashMap<String, usize>,
    by_name: FxHashMap<String, usize>,
    prefix_patterns: Vec<PrefixPattern>,
    scanner: AhoCorasick,
    scanner_targets: Vec<usize>,
}

impl CourtRegistry {
    /// Build the registry from the built-in table.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_entries(builtin_courts())
    }

    fn from_entries(entries: Vec<CourtEntry>) -> Self {
        let mut by_id = FxHashMap::default();
        let mut by_name = FxHashMap::default();
        let mut prefix_patterns = Vec::new();
        let mut scanner_patterns: Vec<String> = Vec::new();
        let mut scanner_targets = Vec::new();

        for (idx, entry) in entries.iter().enumerate() {
            by_id.insert(entry.jurisdiction_id.to_ascii_lowercase(), idx);
            by_name.insert(entry.name.to_ascii_lowercase(), idx);
            scanner_patterns.push(entry.name.to_ascii_lowercase());
            scanner_targets.push(idx);
            for alias in entry.aliases {
                by_name.insert(alias.to_ascii_lowercase(), idx);
                scanner_patterns.push(alias.to_ascii_lowercase());
                scanner_targets.push(idx);
            }
            // The jurisdiction id doubles as a docket-number prefix
            // (`2:22-cv-00001` filings carry it as `txed` in PACER-style
            // case numbers), and so do the spelled-out district aliases.
            prefix_patterns.push(PrefixPattern {
                needle: entry.jurisdiction_id,
                entry_idx: idx,
            });
            for alias in entry.aliases {
                prefix_patterns.push(PrefixPattern {
                    needle: alias,
                    entry_idx: idx,
                });
            }
        }

        let scanner = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(&scanner_patterns)
            .expect("court scanner patterns are static and valid");

        Self {
            entries,
            by_id,
            by_name,
            prefix_patterns,
            scanner,
            scanner_targets,
        }
    }

    /// Exact jurisdiction-id lookup, case-insensitive.
    #[must_use]
    pub fn resolve_id(&self, court_id: &str) -> Option<&CourtEntry> {
        self.by_id
            .get(&court_id.trim().to_ascii_lowercase())
            .map(|&idx| &self.entries[idx])
    }

    /// Free-text name lookup: case-insensitive exact match on the canonical
    /// name, then on aliases.
    #[must_use]
    pub fn resolve_name(&self, name: &str) -> Option<&CourtEntry> {
        self.by_name
            .get(&name.trim().to_ascii_lowercase())
            .map(|&idx| &self.entries[idx])
    }

    /// Resolve from a case-number string via the substring pattern table.
    /// Longest matching pattern wins so `e.d. tex.` beats `tex`.
    #[must_use]
    pub fn resolve_case_number(&self, case_number: &str) -> Option<&CourtEntry> {
        let haystack = case_number.to_ascii_lowercase();
        let mut best: Option<(usize, usize)> = None;
        for pattern in &self.prefix_patterns {
            let needle = pattern.needle.to_ascii_lowercase();
            if haystack.contains(&needle) {
                let len = needle.len();
                if best.map_or(true, |(best_len, _)| len > best_len) {
                    best = Some((len, pattern.entry_idx));
                }
            }
        }
        best.map(|(_, idx)| &self.entries[idx])
    }

    /// Scan the opening `window` characters of content for the first
    /// occurrence of a known court name or alias.
    #[must_use]
    pub fn scan_content(&self, content: &str, window: usize) -> Option<&CourtEntry> {
        let end = content
            .char_indices()
            .nth(window)
            .map_or(content.len(), |(idx, _)| idx);
        let head = &content[..end];
        self.scanner
            .find(head)
            .map(|m| &self.entries[self.scanner_targets[m.pattern().as_usize()]])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Built-in table. Ids follow the conventional short-form court
/// identifiers used by public case-law sources.
#[allow(clippy::too_many_lines)]
fn builtin_courts() -> Vec<CourtEntry> {
    vec![
        CourtEntry {
            jurisdiction_id: "txed",
            name: "Eastern District of Texas",
            aliases: &["e.d. tex.", "ed tex", "united states district court for the eastern district of texas"],
            parent: Some("ca5"),
            court_type: CourtType::Trial,
        },
        CourtEntry {
            jurisdiction_id: "txwd",
            name: "Western District of Texas",
            aliases: &["w.d. tex.", "wd tex", "united states district court for the western district of texas"],
            parent: Some("ca5"),
            court_type: CourtType::Trial,
        },
        CourtEntry {
            jurisdiction_id: "txnd",
            name: "Northern District of Texas",
            aliases: &["n.d. tex.", "nd tex"],
            parent: Some("ca5"),
            court_type: CourtType::Trial,
        },
        CourtEntry {
            jurisdiction_id: "txsd",
            name: "Southern District of Texas",
            aliases: &["s.d. tex.", "sd tex"],
            parent: Some("ca5"),
            court_type: CourtType::Trial,
        },
        CourtEntry {
            jurisdiction_id: "cand",
            name: "Northern District of California",
            aliases: &["n.d. cal.", "nd cal"],
            parent: Some("ca9"),
            court_type: CourtType::Trial,
        },
        CourtEntry {
            jurisdiction_id: "cacd",
            name: "Central District of California",
            aliases: &["c.d. cal.", "cd cal"],
            parent: Some("ca9"),
            court_type: CourtType::Trial,
        },
        CourtEntry {
            jurisdiction_id: "nysd",
            name: "Southern District of New York",
            aliases: &["s.d.n.y.", "sdny"],
            parent: Some("ca2"),
            court_type: CourtType::Trial,
        },
        CourtEntry {
            jurisdiction_id: "nyed",
            name: "Eastern District of New York",
            aliases: &["e.d.n.y.", "edny"],
            parent: Some("ca2"),
            court_type: CourtType::Trial,
        },
        CourtEntry {
            jurisdiction_id: "ded",
            name: "District of Delaware",
            aliases: &["d. del.", "d del"],
            parent: Some("ca3"),
            court_type: CourtType::Trial,
        },
        CourtEntry {
            jurisdiction_id: "ilnd",
            name: "Northern District of Illinois",
            aliases: &["n.d. ill.", "nd ill"],
            parent: Some("ca7"),
            court_type: CourtType::Trial,
        },
        CourtEntry {
            jurisdiction_id: "flsd",
            name: "Southern District of Florida",
            aliases: &["s.d. fla.", "sd fla"],
            parent: Some("ca11"),
            court_type: CourtType::Trial,
        },
        CourtEntry {
            jurisdiction_id: "vaed",
            name: "Eastern District of Virginia",
            aliases: &["e.d. va.", "ed va"],
            parent: Some("ca4"),
            court_type: CourtType::Trial,
        },
        CourtEntry {
            jurisdiction_id: "wdwa",
            name: "Western District of Washington",
            aliases: &["w.d. wash.", "wd wash"],
            parent: Some("ca9"),
            court_type: CourtType::Trial,
        },
        CourtEntry {
            jurisdiction_id: "njd",
            name: "District of New Jersey",
            aliases: &["d.n.j.", "dnj"],
            parent: Some("ca3"),
            court_type: CourtType::Trial,
        },
        CourtEntry {
            jurisdiction_id: "mad",
            name: "District of Massachusetts",
            aliases: &["d. mass.", "d mass"],
            parent: Some("ca1"),
            court_type: CourtType::Trial,
        },
        CourtEntry {
            jurisdiction_id: "ca1",
            name: "Court of Appeals for the First Circuit",
            aliases: &["1st cir.", "first circuit"],
            parent: None,
            court_type: CourtType::Appellate,
        },
        CourtEntry {
            jurisdiction_id: "ca2",
            name: "Court of Appeals for the Second Circuit",
            aliases: &["2d cir.", "second circuit"],
            parent: None,
            court_type: CourtType::Appellate,
        },
        CourtEntry {
            jurisdiction_id: "ca3",
            name: "Court of Appeals for the Third Circuit",
            aliases: &["3d cir.", "third circuit"],
            parent: None,
            court_type: CourtType::Appellate,
        },
        CourtEntry {
            jurisdiction_id: "ca4",
            name: "Court of Appeals for the Fourth Circuit",
            aliases: &["4th cir.", "fourth circuit"],
            parent: None,
            court_type: CourtType::Appellate,
        },
        CourtEntry {
            jurisdiction_id: "ca5",
            name: "Court of Appeals for the Fifth Circuit",
            aliases: &["5th cir.", "fifth circuit"],
            parent: None,
            court_type: CourtType::Appellate,
        },
        CourtEntry {
            jurisdiction_id: "ca7",
            name: "Court of Appeals for the Seventh Circuit",
            aliases: &["7th cir.", "seventh circuit"],
            parent: None,
            court_type: CourtType::Appellate,
        },
        CourtEntry {
            jurisdiction_id: "ca9",
            name: "Court of Appeals for the Ninth Circuit",
            aliases: &["9th cir.", "ninth circuit"],
            parent: None,
            court_type: CourtType::Appellate,
        },
        CourtEntry {
            jurisdiction_id: "ca11",
            name: "Court of Appeals for the Eleventh Circuit",
            aliases: &["11th cir.", "eleventh circuit"],
            parent: None,
            court_type: CourtType::Appellate,
        },
        CourtEntry {
            jurisdiction_id: "cafc",
            name: "Court of Appeals for the Federal Circuit",
            aliases: &["fed. cir.", "federal circuit"],
            parent: None,
            court_type: CourtType::Appellate,
        },
        CourtEntry {
            jurisdiction_id: "cadc",
            name: "Court of Appeals for the D.C. Circuit",
            aliases: &["d.c. cir.", "dc circuit"],
            parent: None,
            court_type: CourtType::Appellate,
        },
        CourtEntry {
            jurisdiction_id: "scotus",
            name: "Supreme Court of the United States",
            aliases: &["u.s. supreme court", "supreme court"],
            parent: None,
            court_type: CourtType::Appellate,
        },
        CourtEntry {
            jurisdiction_id: "uscfc",
            name: "Court of Federal Claims",
            aliases: &["fed. cl.", "court of claims"],
            parent: Some("cafc"),
            court_type: CourtType::Specialty,
        },
        CourtEntry {
            jurisdiction_id: "cit",
            name: "Court of International Trade",
            aliases: &["ct. int'l trade"],
            parent: Some("cafc"),
            court_type: CourtType::Specialty,
        },
    ]
}
