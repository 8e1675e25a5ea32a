//! Patent identifier validation, normalization, and deduplication.
//!
//! Identifiers are jurisdiction-prefixed publication numbers such as
//! `US10000001B2` or `EP1234567A1`. The raw scraped form is what gets stored
//! and downloaded; a normalized form (kind code stripped, and for US numbers
//! leading zeros stripped) exists only to collapse duplicates.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

fn valid_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]{2}\d{4,}[A-Z]?\d*$").expect("identifier pattern"))
}

fn kind_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Z]{2}\d+)[A-Z]\d*$").expect("kind code pattern"))
}

/// Whether a candidate token has the shape of a publication number:
/// two uppercase letters, at least four digits, and an optional kind code.
///
/// This is the only gate applied before deduplication; looser page-source
/// matches are funneled through it too.
pub fn is_valid(candidate: &str) -> bool {
    !candidate.is_empty() && valid_id_re().is_match(candidate)
}

/// Strip a trailing kind-code suffix (one letter plus digits), leaving the
/// country prefix and digit run: `US10000001B2` -> `US10000001`.
pub fn strip_kind_code(id: &str) -> &str {
    match kind_code_re().captures(id) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(id),
        None => id,
    }
}

/// Canonical form used for deduplication only. Kind code is stripped; US
/// numbers additionally lose leading zeros after the prefix, since the site
/// serves `US06789012` and `US6789012` as the same document.
pub fn normalize(id: &str) -> String {
    let base = strip_kind_code(id);
    if let Some(digits) = base.strip_prefix("US") {
        format!("US{}", digits.trim_start_matches('0'))
    } else {
        base.to_string()
    }
}

/// Insertion-ordered identifier collection with normalized-key dedup.
///
/// The first raw form seen for a normalized key wins; later variants
/// (differing only in kind code or leading zeros) are dropped.
#[derive(Debug, Clone, Default)]
pub struct IdentifierSet {
    ids: Vec<String>,
    seen: HashSet<String>,
}

impl IdentifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert a raw identifier. Returns true when the
    /// identifier was new (and valid); false for rejects and duplicates.
    pub fn insert(&mut self, raw: &str) -> bool {
        let raw = raw.trim();
        if !is_valid(raw) {
            return false;
        }
        let key = normalize(raw);
        if !self.seen.insert(key) {
            return false;
        }
        self.ids.push(raw.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Raw identifiers in discovery order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(|s| s.as_str())
    }

    pub fn into_vec(self) -> Vec<String> {
        self.ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_wellformed_identifiers() {
        assert!(is_valid("US1234567"));
        assert!(is_valid("US12345678A1"));
        assert!(is_valid("EP999999A1"));
        assert!(is_valid("WO2019123456A1"));
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(!is_valid("abc123"));
        assert!(!is_valid("US12"));
        assert!(!is_valid("1234567"));
        assert!(!is_valid(""));
        assert!(!is_valid("us1234567"));
    }

    #[test]
    fn strips_kind_code() {
        assert_eq!(strip_kind_code("US10000001B2"), "US10000001");
        assert_eq!(strip_kind_code("EP999999A1"), "EP999999");
        assert_eq!(strip_kind_code("US1234567"), "US1234567");
    }

    #[test]
    fn normalizes_us_leading_zeros() {
        assert_eq!(normalize("US06789012B2"), "US6789012");
        assert_eq!(normalize("US06789012"), "US6789012");
        assert_eq!(normalize("EP0999999A1"), "EP0999999");
    }

    #[test]
    fn normalize_is_idempotent() {
        for id in [
            "US10000001B2",
            "US06789012",
            "EP999999A1",
            "WO2019123456A1",
            "US1234567",
            "not-an-id",
        ] {
            let once = normalize(id);
            assert_eq!(normalize(&once), once, "normalize({id}) not idempotent");
        }
    }

    #[test]
    fn dedup_is_first_wins_and_order_preserving() {
        let mut set = IdentifierSet::new();
        assert!(set.insert("US1234567A1"));
        assert!(!set.insert("US1234567B2"));
        assert!(set.insert("EP999999A1"));
        assert_eq!(set.ids(), ["US1234567A1", "EP999999A1"]);
    }

    #[test]
    fn dedup_collapses_leading_zero_variants() {
        let mut set = IdentifierSet::new();
        assert!(set.insert("US06789012B2"));
        assert!(!set.insert("US6789012A1"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.ids()[0], "US06789012B2");
    }

    #[test]
    fn insert_rejects_invalid() {
        let mut set = IdentifierSet::new();
        assert!(!set.insert("garbage"));
        assert!(set.is_empty());
    }
}
