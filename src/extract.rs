//! Tiered patent-identifier extraction from rendered search pages.
//!
//! The search frontend is a single-page application whose markup varies by
//! result type, so extraction layers several strategies: canonical document
//! links first, then result attributes and heading text, and finally a
//! broader sweep over raw markup that trades precision for recall. Every
//! candidate from every tier passes through the same validation gate and the
//! same running deduplicated set.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use crate::ident::IdentifierSet;

fn patent_link_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("a[href*='/patent/']").expect("static selector"))
}

fn docid_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("[data-docid], [data-id]").expect("static selector"))
}

fn heading_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| {
        Selector::parse("h3, h4, .result-title, .patent-title, .search-result, article, .title")
            .expect("static selector")
    })
}

fn block_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("a, div").expect("static selector"))
}

fn id_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Z]{2}\d{4,}[A-Z]?\d*)\b").expect("token pattern"))
}

fn href_patent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/patent/([A-Z]{2}\d{4,}[A-Z]?\d*)").expect("href pattern"))
}

fn data_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"data-(?:docid|id)=["']([A-Z]{2}\d{4,}[A-Z]?\d*)["']"#)
            .expect("data attribute pattern")
    })
}

fn loose_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"[>"'\s]([A-Z]{2}\d{6,}[A-Z]?\d*)[\s<"']"#).expect("loose token pattern")
    })
}

/// Pull the identifier out of a document-path href:
/// `/patent/US1234567B2/en?oq=x` -> `US1234567B2`.
fn id_from_patent_href(href: &str) -> Option<&str> {
    let (_, rest) = href.split_once("/patent/")?;
    let id = rest.split(['/', '?']).next().unwrap_or(rest);
    (!id.is_empty()).then_some(id)
}

fn accept(set: &mut IdentifierSet, candidate: &str) {
    if set.insert(candidate) {
        debug!("found patent identifier {}", candidate.trim());
    }
}

/// Tiers 1-3: document-path anchors, result data attributes, and
/// identifier-shaped tokens in headings and result containers.
///
/// Merges new identifiers into `set`, short-circuiting at `cap`, and returns
/// the number newly accepted.
pub fn extract_primary(source: &str, set: &mut IdentifierSet, cap: usize) -> usize {
    let before = set.len();
    let document = Html::parse_document(source);

    // Anchors carrying the canonical document path are the most reliable
    // signal and always run first.
    for element in document.select(patent_link_selector()) {
        if set.len() >= cap {
            return set.len() - before;
        }
        if let Some(id) = element.value().attr("href").and_then(id_from_patent_href) {
            accept(set, id);
        }
    }

    // Some result types expose the identifier only as a data attribute.
    for element in document.select(docid_selector()) {
        if set.len() >= cap {
            return set.len() - before;
        }
        let value = element
            .value()
            .attr("data-docid")
            .or_else(|| element.value().attr("data-id"));
        if let Some(id) = value {
            accept(set, id);
        }
    }

    // Identifier-shaped tokens in headings and result containers.
    for element in document.select(heading_selector()) {
        if set.len() >= cap {
            break;
        }
        let text: String = element.text().collect();
        for token in id_token_re().find_iter(&text) {
            if set.len() >= cap {
                break;
            }
            accept(set, token.as_str());
        }
    }

    set.len() - before
}

/// Tier 4: broader sweep used only when the primary tiers underperform.
///
/// Walks every anchor and block element's href and text, then runs three
/// regex passes over the raw markup, loosest last. All matches still go
/// through the standard validation gate inside `IdentifierSet::insert`.
pub fn extract_fallback(source: &str, set: &mut IdentifierSet, cap: usize) -> usize {
    let before = set.len();

    {
        let document = Html::parse_document(source);
        for element in document.select(block_selector()) {
            if set.len() >= cap {
                return set.len() - before;
            }
            if element.value().name() == "a" {
                if let Some(id) = element.value().attr("href").and_then(id_from_patent_href) {
                    accept(set, id);
                }
            }
            let text: String = element.text().collect();
            for token in id_token_re().find_iter(&text) {
                if set.len() >= cap {
                    break;
                }
                accept(set, token.as_str());
            }
        }
    }

    // Raw-markup sweeps: href-embedded paths, data-attribute identifiers,
    // then a loose token scan bounded by markup delimiters.
    for re in [href_patent_re(), data_attr_re(), loose_token_re()] {
        if set.len() >= cap {
            break;
        }
        for caps in re.captures_iter(source) {
            if set.len() >= cap {
                break;
            }
            if let Some(m) = caps.get(1) {
                accept(set, m.as_str());
            }
        }
    }

    set.len() - before
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_FIXTURE: &str = r#"
        <html><body>
          <search-results>
            <article>
              <a href="/patent/US10000001B2/en?oq=battery">Solid electrolyte</a>
            </article>
            <article>
              <a href="https://patents.google.com/patent/US10000001A1/en">Solid electrolyte (application)</a>
            </article>
            <article data-docid="EP20000002A1">
              <h3>EP20000002A1 - Electrolyte composition</h3>
            </article>
          </search-results>
        </body></html>
    "#;

    #[test]
    fn anchors_win_and_duplicates_collapse() {
        let mut set = IdentifierSet::new();
        extract_primary(SEARCH_FIXTURE, &mut set, 10);
        // US10000001A1 normalizes to the same document as US10000001B2.
        assert_eq!(set.ids(), ["US10000001B2", "EP20000002A1"]);
    }

    #[test]
    fn cap_is_enforced() {
        let mut set = IdentifierSet::new();
        let added = extract_primary(SEARCH_FIXTURE, &mut set, 1);
        assert_eq!(added, 1);
        assert_eq!(set.ids(), ["US10000001B2"]);
    }

    #[test]
    fn href_query_suffix_is_stripped() {
        assert_eq!(
            id_from_patent_href("/patent/US1234567B2/en?oq=x"),
            Some("US1234567B2")
        );
        assert_eq!(
            id_from_patent_href("https://patents.google.com/patent/EP999999A1"),
            Some("EP999999A1")
        );
        assert_eq!(id_from_patent_href("/scholar?q=US1234567"), None);
    }

    #[test]
    fn data_attributes_are_read_when_anchors_are_absent() {
        let html = r#"<div data-id="US7654321B1">A result</div>"#;
        let mut set = IdentifierSet::new();
        extract_primary(html, &mut set, 10);
        assert_eq!(set.ids(), ["US7654321B1"]);
    }

    #[test]
    fn heading_text_is_scanned() {
        let html = "<h3>Publication US8888888A1 relates to membranes</h3>";
        let mut set = IdentifierSet::new();
        extract_primary(html, &mut set, 10);
        assert_eq!(set.ids(), ["US8888888A1"]);
    }

    #[test]
    fn fallback_sweeps_raw_markup() {
        // No element-level signal at all; only raw-source patterns.
        let html = r#"
            <html><body>
              <script>var x = {"link": "/patent/US9999991B2/en"};</script>
              <template data-docid="US9999992A1"></template>
              <span>ref: US9999993 </span>
            </body></html>
        "#;
        let mut set = IdentifierSet::new();
        extract_fallback(html, &mut set, 10);
        assert!(set.iter().any(|id| id == "US9999991B2"));
        assert!(set.iter().any(|id| id == "US9999992A1"));
        assert!(set.iter().any(|id| id == "US9999993"));
    }

    #[test]
    fn fallback_respects_existing_entries() {
        let html = r#"<a href="/patent/US9999991B2/en">x</a>"#;
        let mut set = IdentifierSet::new();
        set.insert("US9999991A1");
        let added = extract_fallback(html, &mut set, 10);
        assert_eq!(added, 0);
        assert_eq!(set.ids(), ["US9999991A1"]);
    }

    #[test]
    fn invalid_tokens_never_survive_the_sweep() {
        let html = r#"<div>lowercase us1234567 and bare 1234567890 here</div>"#;
        let mut set = IdentifierSet::new();
        extract_fallback(html, &mut set, 10);
        assert!(set.is_empty());
    }
}
