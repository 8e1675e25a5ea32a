//! Search orchestration: result waits, scroll/pagination, fallback
//! extraction, and query refinement.
//!
//! Each query attempt is an independent session producing its own
//! identifier set; refinement keeps whichever attempt did best rather than
//! merging across attempts.

use chrono::Utc;
use console::style;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::AcquireError;
use crate::extract;
use crate::ident::IdentifierSet;
use crate::render::RenderSession;
use crate::storage::{self, DebugSink};

/// Refinement kicks in below min(5, cap) identifiers.
const REFINE_THRESHOLD: usize = 5;

/// The tier-4 sweep kicks in below min(10, cap) identifiers.
const FALLBACK_FLOOR: usize = 10;

/// Result indicators tried in order, each with a short timeout, before the
/// generic body wait.
const WAIT_SELECTORS: &[&str] = &[
    "article",
    "search-result",
    ".search-result",
    "a[href*='/patent/']",
    "h3",
    "[data-docid]",
];

const SCROLL_TO_BOTTOM_JS: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// Best-effort click on a "show more / next page" control. Returns whether
/// anything was clicked; absence of a control is the common case.
const CLICK_MORE_RESULTS_JS: &str = r#"
    (() => {
        const buttons = Array.from(document.querySelectorAll('button'));
        const target = buttons.find((b) => {
            const label = ((b.textContent || '') + ' ' + (b.getAttribute('aria-label') || '')).toLowerCase();
            return (label.includes('more') || label.includes('next')) && !b.disabled && b.offsetParent !== null;
        });
        if (!target) return false;
        target.scrollIntoView(true);
        target.click();
        return true;
    })()
"#;

/// Refinement keeps whichever attempt found more; it never merges.
fn keep_better(current: IdentifierSet, candidate: IdentifierSet) -> IdentifierSet {
    if candidate.len() > current.len() {
        candidate
    } else {
        current
    }
}

fn reaches_threshold(set: &IdentifierSet, cap: usize) -> bool {
    set.len() >= REFINE_THRESHOLD.min(cap)
}

/// Drives the browser through the search flow for one topic.
pub struct SearchOrchestrator<'a> {
    session: &'a mut RenderSession,
    settings: &'a Settings,
    debug: &'a DebugSink,
}

impl<'a> SearchOrchestrator<'a> {
    pub fn new(session: &'a mut RenderSession, settings: &'a Settings, debug: &'a DebugSink) -> Self {
        Self {
            session,
            settings,
            debug,
        }
    }

    /// Run the full search state machine for a topic. Returns the accepted
    /// identifier set, or `SearchExhausted` when every attempt came up
    /// empty.
    pub async fn run(&mut self, topic: &str) -> Result<IdentifierSet, AcquireError> {
        let cap = self.settings.max_results;

        println!(
            "{} Searching for patents about: {}",
            style("→").cyan(),
            style(topic).bold()
        );

        let mut best = match self.attempt(topic).await {
            Ok(set) => set,
            Err(e) => {
                warn!("initial search attempt failed: {}", e);
                self.snapshot("search_error").await;
                IdentifierSet::new()
            }
        };

        if !reaches_threshold(&best, cap) {
            println!(
                "{} Initial search yielded few results; trying alternative queries",
                style("!").yellow()
            );

            if topic.chars().any(char::is_whitespace) {
                let quoted = format!("\"{topic}\"");
                match self.attempt(&quoted).await {
                    Ok(set) if reaches_threshold(&set, cap) => {
                        return self.conclude(topic, set);
                    }
                    Ok(set) => best = keep_better(best, set),
                    Err(e) => warn!("quoted query attempt failed: {}", e),
                }
            }

            let suffixed = format!("{topic} patent");
            match self.attempt(&suffixed).await {
                Ok(set) if reaches_threshold(&set, cap) => {
                    return self.conclude(topic, set);
                }
                Ok(set) => best = keep_better(best, set),
                Err(e) => warn!("suffixed query attempt failed: {}", e),
            }
        }

        self.conclude(topic, best)
    }

    /// One full query attempt: render, wait, extract, scroll, fallback.
    async fn attempt(&mut self, query: &str) -> Result<IdentifierSet, AcquireError> {
        let cap = self.settings.max_results;
        let mut found = IdentifierSet::new();

        let url = self.settings.search_url(query);
        info!("search URL: {}", url);

        self.session.navigate(&url).await?;
        self.await_results().await?;
        self.snapshot(&format!("search_{}", Utc::now().format("%Y%m%d_%H%M%S")))
            .await;

        let source = self.session.page_source().await?;
        extract::extract_primary(&source, &mut found, cap);
        println!(
            "  {} {} identifiers from initial results",
            style("→").dim(),
            found.len()
        );

        if found.len() < cap {
            self.scroll_and_extract(&mut found).await?;
        }

        if found.len() < FALLBACK_FLOOR.min(cap) {
            info!("few identifiers from primary extraction, running fallback sweep");
            let source = self.session.page_source().await?;
            let added = extract::extract_fallback(&source, &mut found, cap);
            if added > 0 {
                println!(
                    "  {} {} more identifiers from fallback sweep",
                    style("→").dim(),
                    added
                );
            }
        }

        Ok(found)
    }

    /// Wait for any result indicator; fall through to a generic body wait
    /// plus a settle delay when none matched.
    async fn await_results(&mut self) -> Result<(), AcquireError> {
        for selector in WAIT_SELECTORS {
            if self
                .session
                .wait_for_selector(selector, self.settings.selector_timeout())
                .await?
            {
                debug!("search results found using selector: {}", selector);
                return Ok(());
            }
        }

        debug!("no result indicator matched, waiting for page body");
        self.session
            .wait_for_selector("body", self.settings.body_timeout())
            .await?;
        tokio::time::sleep(self.settings.settle_delay()).await;
        Ok(())
    }

    /// Scroll/paginate until the cap is reached or a fixed number of
    /// consecutive iterations yields nothing new. The counter resets
    /// whenever a scroll produces at least one identifier.
    async fn scroll_and_extract(
        &mut self,
        found: &mut IdentifierSet,
    ) -> Result<(), AcquireError> {
        let cap = self.settings.max_results;
        let max_attempts = self.settings.max_scroll_attempts;
        let mut no_progress = 0u32;
        let mut iteration = 0u32;

        println!(
            "  {} Scrolling to load more results (up to {})",
            style("→").dim(),
            cap
        );

        while found.len() < cap && no_progress < max_attempts {
            iteration += 1;
            self.session.evaluate(SCROLL_TO_BOTTOM_JS).await?;
            tokio::time::sleep(self.settings.scroll_delay()).await;

            match self.session.evaluate(CLICK_MORE_RESULTS_JS).await {
                Ok(value) if value.as_bool().unwrap_or(false) => {
                    debug!("clicked navigation control to load more results");
                    tokio::time::sleep(self.settings.post_click_delay()).await;
                }
                Ok(_) => {}
                Err(e) => debug!("more-results probe failed: {}", e),
            }

            let source = self.session.page_source().await?;
            let added = extract::extract_primary(&source, found, cap);
            if added > 0 {
                no_progress = 0;
                println!(
                    "  {} {} identifiers so far",
                    style("→").dim(),
                    found.len()
                );
            } else {
                no_progress += 1;
            }

            self.snapshot_screenshot(&format!("search_scroll_{iteration}"))
                .await;
        }

        if no_progress >= max_attempts {
            info!("reached maximum scroll attempts without new identifiers");
        }
        Ok(())
    }

    /// Accept a terminal result: persist the identifier list or report
    /// exhaustion.
    fn conclude(&self, topic: &str, set: IdentifierSet) -> Result<IdentifierSet, AcquireError> {
        if set.is_empty() {
            return Err(AcquireError::SearchExhausted);
        }
        let path = storage::save_identifier_list(&self.settings.output_dir, topic, set.ids())
            .map_err(|e| AcquireError::persistence(&self.settings.output_dir, e))?;
        println!(
            "{} Saved {} patent ids to {}",
            style("✓").green(),
            set.len(),
            path.display()
        );
        Ok(set)
    }

    async fn snapshot(&mut self, prefix: &str) {
        if !self.debug.enabled() {
            return;
        }
        match self.session.page_source().await {
            Ok(html) => self.debug.save_html(prefix, &html),
            Err(e) => debug!("debug page source failed: {}", e),
        }
        self.snapshot_screenshot(prefix).await;
    }

    async fn snapshot_screenshot(&mut self, prefix: &str) {
        if !self.debug.enabled() {
            return;
        }
        match self.session.screenshot().await {
            Ok(png) => self.debug.save_png(prefix, &png),
            Err(e) => debug!("debug screenshot failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(ids: &[&str]) -> IdentifierSet {
        let mut set = IdentifierSet::new();
        for id in ids {
            set.insert(id);
        }
        set
    }

    #[test]
    fn refinement_accepts_attempt_reaching_threshold_without_merging() {
        // Initial attempt: 2 identifiers, below min(5, cap).
        let initial = set_of(&["US1000001B2", "US1000002B2"]);
        assert!(!reaches_threshold(&initial, 10));

        // Quoted retry: 6 fresh identifiers.
        let retry = set_of(&[
            "US2000001B2",
            "US2000002B2",
            "US2000003B2",
            "US2000004B2",
            "US2000005B2",
            "US2000006B2",
        ]);
        assert!(reaches_threshold(&retry, 10));

        // The retry is accepted as-is: 6 entries, none of the initial ones.
        assert_eq!(retry.len(), 6);
        assert!(!retry.iter().any(|id| id.starts_with("US1000")));
    }

    #[test]
    fn keep_better_prefers_larger_attempt() {
        let small = set_of(&["US1000001B2"]);
        let large = set_of(&["US2000001B2", "US2000002B2"]);
        let kept = keep_better(small, large);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|id| id.starts_with("US2000")));
    }

    #[test]
    fn keep_better_keeps_current_on_tie() {
        let first = set_of(&["US1000001B2"]);
        let second = set_of(&["US2000001B2"]);
        let kept = keep_better(first, second);
        assert_eq!(kept.ids(), ["US1000001B2"]);
    }

    #[test]
    fn threshold_is_capped_by_max_results() {
        let three = set_of(&["US1000001B2", "US1000002B2", "US1000003B2"]);
        // cap 3 -> min(5, 3) = 3, already enough.
        assert!(reaches_threshold(&three, 3));
        assert!(!reaches_threshold(&three, 10));
    }
}
