/// Static reporter registry with edition-family awareness.
///
/// A citation like `123 F.3d 456` names the third series of the Federal
/// Reporter; the registry resolves the series-bearing abbreviation to the
/// exact series entry, never to the base reporter.
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
pub struct ReporterEntry {
    /// Canonical abbreviation, e.g. `F.3d`.
    pub abbreviation: &'static str,
    /// Full publication name.
    pub name: &'static str,
    /// Family key shared by all series of one reporter, e.g. `F`.
    pub family: &'static str,
    /// Series number within the family (1 = base series).
    pub series: u8,
    /// Accepted spelling variants beyond the canonical form.
    pub variants: &'static [&'static str],
}

pub struct ReporterRegistry {
    entries: Vec<ReporterEntry>,
    by_variant: FxHashMap<String, usize>,
}

impl ReporterRegistry {
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_entries(builtin_reporters())
    }

    fn from_entries(entries: Vec<ReporterEntry>) -> Self {
        let mut by_variant = FxHashMap::default();
        for (idx, entry) in entries.iter().enumerate() {
            by_variant.insert(normalize_abbreviation(entry.abbreviation), idx);
            for variant in entry.variants {
                by_variant.insert(normalize_abbreviation(variant), idx);
            }
        }
        Self { entries, by_variant }
    }

    /// Resolve an abbreviation as it appeared in text to its canonical
    /// series entry. Unknown abbreviations return `None` and are passed
    /// through by the normalization stage.
    #[must_use]
    pub fn resolve(&self, abbreviation: &str) -> Option<&ReporterEntry> {
        self.by_variant
            .get(&normalize_abbreviation(abbreviation))
            .map(|&idx| &self.entries[idx])
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

/// Lowercase and strip internal whitespace so `F. 3d`, `f.3d` and `F.3d`
/// agree.
fn normalize_abbreviation(abbreviation: &str) -> String {
    abbreviation
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn builtin_reporters() -> Vec<ReporterEntry> {
    vec![
        ReporterEntry {
            abbreviation: "U.S.",
            name: "United States Reports",
            family: "US",
            series: 1,
            variants: &["US"],
        },
        ReporterEntry {
            abbreviation: "S. Ct.",
            name: "Supreme Court Reporter",
            family: "SCt",
            series: 1,
            variants: &["S.Ct."],
        },
        ReporterEntry {
            abbreviation: "L. Ed.",
            name: "Lawyers' Edition",
            family: "LEd",
            series: 1,
            variants: &["L.Ed."],
        },
        ReporterEntry {
            abbreviation: "L. Ed. 2d",
            name: "Lawyers' Edition, Second Series",
            family: "LEd",
            series: 2,
            variants: &["L.Ed.2d"],
        },
        ReporterEntry {
            abbreviation: "F.",
            name: "Federal Reporter",
            family: "F",
            series: 1,
            variants: &["Fed."],
        },
        ReporterEntry {
            abbreviation: "F.2d",
            name: "Federal Reporter, Second Series",
            family: "F",
            series: 2,
            variants: &["F. 2d"],
        },
        ReporterEntry {
            abbreviation: "F.3d",
            name: "Federal Reporter, Third Series",
            family: "F",
            series: 3,
            variants: &["F. 3d"],
        },
        ReporterEntry {
            abbreviation: "F.4th",
            name: "Federal Reporter, Fourth Series",
            family: "F",
            series: 4,
            variants: &["F. 4th"],
        },
        ReporterEntry {
            abbreviation: "F. Supp.",
            name: "Federal Supplement",
            family: "FSupp",
            series: 1,
            variants: &["F.Supp."],
        },
        ReporterEntry {
            abbreviation: "F. Supp. 2d",
            name: "Federal Supplement, Second Series",
            family: "FSupp",
            series: 2,
            variants: &["F.Supp.2d"],
        },
        ReporterEntry {
            abbreviation: "F. Supp. 3d",
            name: "Federal Supplement, Third Series",
            family: "FSupp",
            series: 3,
            variants: &["F.Supp.3d"],
        },
        ReporterEntry {
            abbreviation: "F. App'x",
            name: "Federal Appendix",
            family: "FAppx",
            series: 1,
            variants: &["Fed. Appx.", "F. Appx."],
        },
        ReporterEntry {
            abbreviation: "B.R.",
            name: "Bankruptcy Reporter",
            family: "BR",
            series: 1,
            variants: &["Bankr."],
        },
        ReporterEntry {
            abbreviation: "Fed. Cl.",
            name: "Federal Claims Reporter",
            family: "FedCl",
            series: 1,
            variants: &[],
        },
        ReporterEntry {
            abbreviation: "A.",
            name: "Atlantic Reporter",
            family: "A",
            series: 1,
            variants: &[],
        },
        ReporterEntry {
            abbreviation: "A.2d",
            name: "Atlantic Reporter, Second Series",
            family: "A",
            series: 2,
            variants: &["A. 2d"],
        },
        ReporterEntry {
            abbreviation: "A.3d",
            name: "Atlantic Reporter, Third Series",
            family: "A",
            series: 3,
            variants: &["A. 3d"],
        },
        ReporterEntry {
            abbreviation: "P.",
            name: "Pacific Reporter",
            family: "P",
            series: 1,
            variants: &["Pac."],
        },
        ReporterEntry {
            abbreviation: "P.2d",
            name: "Pacific Reporter, Second Series",
            family: "P",
            series: 2,
            variants: &["P. 2d"],
        },
        ReporterEntry {
            abbreviation: "P.3d",
            name: "Pacific Reporter, Third Series",
            family: "P",
            series: 3,
            variants: &["P. 3d"],
        },
        ReporterEntry {
            abbreviation: "N.E.2d",
            name: "North Eastern Reporter, Second Series",
            family: "NE",
            series: 2,
            variants: &["N.E. 2d"],
        },
        ReporterEntry {
            abbreviation: "N.E.3d",
            name: "North Eastern Reporter, Third Series",
            family: "NE",
            series: 3,
            variants: &["N.E. 3d"],
        },
        ReporterEntry {
            abbreviation: "N.W.2d",
            name: "North Western Reporter, Second Series",
            family: "NW",
            series: 2,
            variants: &["N.W. 2d"],
        },
        ReporterEntry {
            abbreviation: "S.E.2d",
            name: "South Eastern Reporter, Second Series",
            family: "SE",
            series: 2,
            variants: &["S.E. 2d"],
        },
        ReporterEntry {
            abbreviation: "S.W.3d",
            name: "South Western Reporter, Third Series",
            family: "SW",
            series: 3,
            variants: &["S.W. 3d"],
        },
        ReporterEntry {
            abbreviation: "So. 2d",
            name: "Southern Reporter, Second Series",
            family: "So",
            series: 2,
            variants: &["So.2d"],
        },
        ReporterEntry {
            abbreviation: "So. 3d",
            name: "Southern Reporter, Third Series",
            family: "So",
            series: 3,
            variants: &["So.3d"],
        },
        ReporterEntry {
            abbreviation: "Cal. Rptr. 3d",
            name: "California Reporter, Third Series",
            family: "CalRptr",
            series: 3,
            variants: &["Cal.Rptr.3d"],
        },
        ReporterEntry {
            abbreviation: "WL",
            name: "Westlaw",
            family: "WL",
            series: 1,
            variants: &[],
        },
    ]
}
