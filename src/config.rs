//! Runtime settings.
//!
//! A single flat settings struct with serde defaults, optionally layered
//! from a TOML file; CLI flags override individual fields on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the patent search frontend.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Result language (`hl` query parameter and document path segment).
    #[serde(default = "default_language")]
    pub language: String,

    /// Directory that receives PDFs, HTML fallbacks, and run records.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Maximum number of patents to collect and download per run.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Run the browser headless.
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Save debug snapshots (screenshot + HTML) of rendered pages.
    #[serde(default)]
    pub debug_snapshots: bool,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Delay applied after every HTTP request, in milliseconds.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Politeness pause between successive patent downloads, in milliseconds.
    #[serde(default = "default_download_delay_ms")]
    pub download_delay_ms: u64,

    /// Pause after each scroll while loading more results, in milliseconds.
    #[serde(default = "default_scroll_delay_ms")]
    pub scroll_delay_ms: u64,

    /// Extra pause after clicking a "more results" control, in milliseconds.
    #[serde(default = "default_post_click_delay_ms")]
    pub post_click_delay_ms: u64,

    /// Settle pause after the generic page-body wait, in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Per-selector timeout while waiting for search results, in seconds.
    #[serde(default = "default_selector_timeout")]
    pub selector_timeout_secs: u64,

    /// Generic page-body wait timeout, in seconds.
    #[serde(default = "default_body_timeout")]
    pub body_timeout_secs: u64,

    /// Consecutive no-progress scroll iterations before giving up.
    #[serde(default = "default_max_scroll_attempts")]
    pub max_scroll_attempts: u32,

    /// Retry budget for browser operations.
    #[serde(default = "default_render_retries")]
    pub render_retries: u32,

    /// Candidate PDF URL patterns, `{id}` substituted with the
    /// kind-code-stripped identifier. The HTTP document source tries the
    /// whole list; the browser source only guesses the final (static-asset
    /// host) entry after page-level discovery fails.
    #[serde(default = "default_pdf_url_patterns")]
    pub pdf_url_patterns: Vec<String>,
}

fn default_base_url() -> String {
    "https://patents.google.com".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("patents")
}

fn default_max_results() -> usize {
    10
}

fn default_headless() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

fn default_request_delay_ms() -> u64 {
    500
}

fn default_download_delay_ms() -> u64 {
    2000
}

fn default_scroll_delay_ms() -> u64 {
    2000
}

fn default_post_click_delay_ms() -> u64 {
    3000
}

fn default_settle_delay_ms() -> u64 {
    5000
}

fn default_selector_timeout() -> u64 {
    5
}

fn default_body_timeout() -> u64 {
    15
}

fn default_max_scroll_attempts() -> u32 {
    10
}

fn default_render_retries() -> u32 {
    3
}

fn default_pdf_url_patterns() -> Vec<String> {
    vec![
        "https://patents.google.com/patent/pdf/{id}.pdf".to_string(),
        "https://patents.google.com/patent/{id}.pdf".to_string(),
        "https://patents.google.com/patent/{id}/en/pdf".to_string(),
        "https://patents.google.com/patent/{id}/pdf".to_string(),
        "https://patentimages.storage.googleapis.com/pdfs/{id}.pdf".to_string(),
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            language: default_language(),
            output_dir: default_output_dir(),
            max_results: default_max_results(),
            headless: default_headless(),
            debug_snapshots: false,
            request_timeout_secs: default_request_timeout(),
            request_delay_ms: default_request_delay_ms(),
            download_delay_ms: default_download_delay_ms(),
            scroll_delay_ms: default_scroll_delay_ms(),
            post_click_delay_ms: default_post_click_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            selector_timeout_secs: default_selector_timeout(),
            body_timeout_secs: default_body_timeout(),
            max_scroll_attempts: default_max_scroll_attempts(),
            render_retries: default_render_retries(),
            pdf_url_patterns: default_pdf_url_patterns(),
        }
    }
}

impl Settings {
    /// Search URL for a query. Asks for large result pages up front (`num`).
    pub fn search_url(&self, query: &str) -> String {
        format!(
            "{}/?q={}&hl={}&num=100",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(query),
            self.language
        )
    }

    /// Canonical document page URL for an identifier.
    pub fn patent_url(&self, patent_id: &str) -> String {
        format!(
            "{}/patent/{}/{}",
            self.base_url.trim_end_matches('/'),
            patent_id,
            self.language
        )
    }

    /// All configured PDF URL guesses for a kind-code-stripped identifier.
    pub fn constructed_pdf_urls(&self, base_id: &str) -> Vec<String> {
        self.pdf_url_patterns
            .iter()
            .map(|pattern| pattern.replace("{id}", base_id))
            .collect()
    }

    /// The static-asset host guess alone (the last configured pattern).
    pub fn static_asset_pdf_url(&self, base_id: &str) -> Option<String> {
        self.pdf_url_patterns
            .last()
            .map(|pattern| pattern.replace("{id}", base_id))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn download_delay(&self) -> Duration {
        Duration::from_millis(self.download_delay_ms)
    }

    pub fn scroll_delay(&self) -> Duration {
        Duration::from_millis(self.scroll_delay_ms)
    }

    pub fn post_click_delay(&self) -> Duration {
        Duration::from_millis(self.post_click_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_secs(self.selector_timeout_secs)
    }

    pub fn body_timeout(&self) -> Duration {
        Duration::from_secs(self.body_timeout_secs)
    }

    /// Create the output directory (and debug directory when snapshots are
    /// enabled).
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.output_dir)?;
        if self.debug_snapshots {
            std::fs::create_dir_all(self.output_dir.join("debug"))?;
        }
        Ok(())
    }
}

/// Load settings from an optional TOML file, falling back to defaults.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
            let settings = toml::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?;
            Ok(settings)
        }
        None => Ok(Settings::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_encodes_query() {
        let settings = Settings::default();
        assert_eq!(
            settings.search_url("battery electrolyte"),
            "https://patents.google.com/?q=battery%20electrolyte&hl=en&num=100"
        );
    }

    #[test]
    fn patent_url_includes_language() {
        let settings = Settings::default();
        assert_eq!(
            settings.patent_url("US1234567B2"),
            "https://patents.google.com/patent/US1234567B2/en"
        );
    }

    #[test]
    fn constructed_urls_substitute_identifier() {
        let settings = Settings::default();
        let urls = settings.constructed_pdf_urls("US1234567");
        assert_eq!(urls.len(), 5);
        assert!(urls.iter().all(|u| u.contains("US1234567")));
        assert_eq!(
            settings.static_asset_pdf_url("US1234567").as_deref(),
            Some("https://patentimages.storage.googleapis.com/pdfs/US1234567.pdf")
        );
    }

    #[test]
    fn toml_overrides_defaults() {
        let settings: Settings =
            toml::from_str("max_results = 25\nlanguage = \"de\"").expect("parse");
        assert_eq!(settings.max_results, 25);
        assert_eq!(settings.language, "de");
        assert_eq!(settings.base_url, "https://patents.google.com");
    }
}
