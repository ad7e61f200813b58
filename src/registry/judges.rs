/// Jurisdiction-scoped map from judge initials to full names.
///
/// Docket metadata often carries only a two-to-four-letter code for the
/// assigned judge; the code is meaningful only within one district, so
/// lookups require a resolved jurisdiction.
use rustc_hash::FxHashMap;

pub struct JudgeInitialsMap {
    by_key: FxHashMap<(String, String), &'static str>,
}

impl JudgeInitialsMap {
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_entries(builtin_initials())
    }

    fn from_entries(entries: &[(&'static str, &'static str, &'static str)]) -> Self {
        let mut by_key = FxHashMap::default();
        for &(jurisdiction, initials, name) in entries {
            by_key.insert(
                (
                    jurisdiction.to_ascii_lowercase(),
                    initials.to_ascii_uppercase(),
                ),
                name,
            );
        }
        Self { by_key }
    }

    /// Look up initials within a jurisdiction. Initials are matched
    /// case-insensitively; codes outside 2..=4 letters are rejected.
    #[must_use]
    pub fn lookup(&self, jurisdiction_id: &str, initials: &str) -> Option<&'static str> {
        let code = initials.trim();
        if code.len() < 2 || code.len() > 4 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        self.by_key
            .get(&(
                jurisdiction_id.to_ascii_lowercase(),
                code.to_ascii_uppercase(),
            ))
            .copied()
    }
}

/// (jurisdiction_id, initials, full name)
fn builtin_initials() -> &'static [(&'static str, &'static str, &'static str)] {
    &[
        ("txed", "RG", "Rodney Gilstrap"),
        ("txed", "JRG", "Rodney Gilstrap"),
        ("txed", "RSP", "Roy S. Payne"),
        ("txed", "ALM", "Amos L. Mazzant III"),
        ("txwd", "ADA", "Alan D. Albright"),
        ("txwd", "DAE", "David A. Ezra"),
        ("ded", "CFC", "Colm F. Connolly"),
        ("ded", "RGA", "Richard G. Andrews"),
        ("ded", "GBW", "Gregory B. Williams"),
        ("cand", "WHA", "William H. Alsup"),
        ("cand", "JD", "James Donato"),
        ("cand", "EJD", "Edward J. Davila"),
        ("nysd", "JMF", "Jesse M. Furman"),
        ("nysd", "AKH", "Alvin K. Hellerstein"),
        ("ilnd", "MFK", "Matthew F. Kennelly"),
        ("flsd", "RNS", "Rodney Smith"),
        ("wdwa", "RAJ", "Richard A. Jones"),
        ("njd", "KM", "Kevin McNulty"),
        ("mad", "WGY", "William G. Young"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_scoped_to_jurisdiction() {
        let map = JudgeInitialsMap::builtin();
        assert_eq!(map.lookup("txed", "RG"), Some("Rodney Gilstrap"));
        assert_eq!(map.lookup("cand", "RG"), None);
    }

    #[test]
    fn lookup_normalizes_case() {
        let map = JudgeInitialsMap::builtin();
        assert_eq!(map.lookup("TXED", "rg"), Some("Rodney Gilstrap"));
    }

    #[test]
    fn lookup_rejects_malformed_codes() {
        let map = JudgeInitialsMap::builtin();
        assert_eq!(map.lookup("txed", "R"), None);
        assert_eq!(map.lookup("txed", "RGRGR"), None);
        assert_eq!(map.lookup("txed", "R2"), None);
    }
}
