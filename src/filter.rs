//! Filter Engine: denylist veto over a fixed set of textual fields.
//!
//! Matching is a substring test on case-folded, accent-stripped text, so a
//! term `"cafe"` vetoes `"Café-brasserie"`. Callers always treat a hit the same
//! way (mark seen, never notify); this module only answers the question.

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::ingest::types::Item;

/// Attribute keys included in the haystack next to the title.
pub const FILTER_FIELDS: [&str; 7] = [
    "location",
    "price",
    "teaser",
    "type",
    "sector",
    "description",
    "turnover",
];

/// Lowercase and strip diacritics (NFD, drop combining marks).
pub fn fold(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

#[derive(Debug, Clone, Default)]
pub struct Denylist {
    // (term as configured, folded form)
    terms: Vec<(String, String)>,
}

impl Denylist {
    /// Blank terms are dropped; duplicates (after folding) keep their first spelling.
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<(String, String)> = Vec::new();
        for t in terms {
            let raw = t.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            let folded = fold(raw);
            if out.iter().any(|(_, f)| *f == folded) {
                continue;
            }
            out.push((raw.to_string(), folded));
        }
        Self { terms: out }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Terms as configured, in order.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|(raw, _)| raw.as_str())
    }

    /// First configured term found in the item's filterable text.
    pub fn matches(&self, item: &Item) -> Option<&str> {
        if self.terms.is_empty() {
            return None;
        }
        let hay = fold(&haystack(item));
        self.terms
            .iter()
            .find(|(_, f)| hay.contains(f.as_str()))
            .map(|(raw, _)| raw.as_str())
    }
}

fn haystack(item: &Item) -> String {
    let mut parts = Vec::with_capacity(FILTER_FIELDS.len() + 1);
    parts.push(item.title.as_str());
    for k in FILTER_FIELDS {
        parts.push(item.attr(k).unwrap_or_default());
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> Item {
        Item::new("cofim", "Café-Brasserie à reprendre", "https://x.be/1")
            .with_attr("location", "Liège")
            .with_attr("sector", "Horeca")
            .with_attr("contact", "restaurant@example.be")
    }

    #[test]
    fn empty_denylist_never_matches() {
        assert_eq!(Denylist::default().matches(&item()), None);
        assert!(Denylist::new(["", "  "]).is_empty());
    }

    #[test]
    fn accents_and_case_are_ignored_both_ways() {
        let dl = Denylist::new(["cafe"]);
        assert_eq!(dl.matches(&item()), Some("cafe"));
        let dl = Denylist::new(["LIÈGE"]);
        assert_eq!(dl.matches(&item()), Some("LIÈGE"));
        let dl = Denylist::new(["horeca"]);
        assert_eq!(dl.matches(&item()), Some("horeca"));
    }

    #[test]
    fn only_designated_fields_are_searched() {
        let dl = Denylist::new(["restaurant"]);
        assert_eq!(dl.matches(&item()), None);
    }

    #[test]
    fn first_configured_term_is_reported() {
        let dl = Denylist::new(["garage", "brasserie", "cafe"]);
        assert_eq!(dl.matches(&item()), Some("brasserie"));
    }

    #[test]
    fn duplicates_collapse_after_folding() {
        let dl = Denylist::new(["Café", "cafe", " CAFE "]);
        assert_eq!(dl.len(), 1);
    }
}
