//! Download orchestration: layered PDF location, HTML fallback, and the
//! durable per-identifier ledger.
//!
//! The orchestrator is parameterized by a document source: either the live
//! browser session (default; the search frontend is JS-heavy) or a plain
//! HTTP fetch of the document page. PDF candidates are tried in a fixed
//! order (page anchors, then a markup scan, then constructed guesses) and
//! the first candidate that actually serves a PDF wins.

use std::path::PathBuf;
use std::sync::OnceLock;

use async_trait::async_trait;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Settings;
use crate::error::{AcquireError, FetchError};
use crate::fetch::HttpClient;
use crate::ident;
use crate::render::RenderSession;
use crate::storage::{sanitize_title, DebugSink, DownloadLedger, DownloadRecord};

fn pdf_anchor_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("a[href*='.pdf']").expect("static selector"))
}

fn title_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("title").expect("static selector"))
}

fn abs_pdf_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https://[^"'\s<>]+\.pdf"#).expect("pdf url pattern"))
}

/// A rendered (or fetched) document page.
pub struct DocumentPage {
    pub source: String,
    pub title: Option<String>,
}

/// Capability that produces the document page for a patent URL.
#[async_trait]
pub trait DocumentSource: Send {
    /// Name for narration ("browser" / "http").
    fn name(&self) -> &'static str;

    async fn document(&mut self, url: &str) -> Result<DocumentPage, AcquireError>;

    /// Visual snapshot of the current document, where supported.
    async fn snapshot(&mut self) -> Option<Vec<u8>> {
        None
    }

    /// Constructed PDF URL guesses for a kind-code-stripped identifier,
    /// tried after page-level discovery fails.
    fn pdf_url_guesses(&self, settings: &Settings, base_id: &str) -> Vec<String>;
}

/// Renders document pages in the live browser session.
pub struct BrowserDocumentSource<'a> {
    session: &'a mut RenderSession,
    title_timeout: std::time::Duration,
}

impl<'a> BrowserDocumentSource<'a> {
    pub fn new(session: &'a mut RenderSession, settings: &Settings) -> Self {
        Self {
            session,
            title_timeout: settings.selector_timeout(),
        }
    }
}

#[async_trait]
impl DocumentSource for BrowserDocumentSource<'_> {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn document(&mut self, url: &str) -> Result<DocumentPage, AcquireError> {
        self.session.navigate(url).await?;
        self.session
            .wait_for_selector("title", self.title_timeout)
            .await?;
        let source = self.session.page_source().await?;
        // Title is cosmetic; failure to read it is tolerated silently.
        let title = self.session.title().await.ok().flatten();
        Ok(DocumentPage { source, title })
    }

    async fn snapshot(&mut self) -> Option<Vec<u8>> {
        self.session.screenshot().await.ok()
    }

    fn pdf_url_guesses(&self, settings: &Settings, base_id: &str) -> Vec<String> {
        settings
            .static_asset_pdf_url(base_id)
            .into_iter()
            .collect()
    }
}

/// Fetches document pages with plain HTTP; no JS execution. Works for the
/// canonical document pages even though the search frontend itself needs a
/// browser.
pub struct HttpDocumentSource {
    client: HttpClient,
}

impl HttpDocumentSource {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn document(&mut self, url: &str) -> Result<DocumentPage, AcquireError> {
        let source = self.client.get_text(url).await.map_err(AcquireError::from)?;
        let title = title_from_markup(&source);
        Ok(DocumentPage { source, title })
    }

    fn pdf_url_guesses(&self, settings: &Settings, base_id: &str) -> Vec<String> {
        settings.constructed_pdf_urls(base_id)
    }
}

/// First `<title>` text in the markup, trimmed.
pub fn title_from_markup(markup: &str) -> Option<String> {
    let document = Html::parse_document(markup);
    document
        .select(title_selector())
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Strip known site suffixes and a leading `<id> - ` prefix from a document
/// title.
pub fn clean_title(raw: &str, patent_id: &str) -> String {
    let mut title = raw.trim().to_string();
    for suffix in [" - Patents.com - Google Patents", " - Google Patents"] {
        if let Some(stripped) = title.strip_suffix(suffix) {
            title = stripped.to_string();
        }
    }
    let prefix = format!("{patent_id} - ");
    if let Some(stripped) = title.strip_prefix(&prefix) {
        title = stripped.to_string();
    }
    title.trim().to_string()
}

fn absolutize(href: &str, page_url: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    Url::parse(page_url)
        .ok()?
        .join(href)
        .ok()
        .map(|u| u.to_string())
}

/// Candidate PDF URLs for a document page in fixed strategy order: anchors
/// ending in `.pdf`, absolute PDF URLs anywhere in the markup, then the
/// constructed guesses. First success during fetch wins, so order is the
/// whole contract here.
pub fn locate_pdf_candidates(
    markup: &str,
    page_url: &str,
    constructed: &[String],
) -> Vec<String> {
    fn push(url: String, candidates: &mut Vec<String>) {
        if !candidates.contains(&url) {
            candidates.push(url);
        }
    }

    let mut candidates: Vec<String> = Vec::new();

    {
        let document = Html::parse_document(markup);
        for element in document.select(pdf_anchor_selector()) {
            if let Some(href) = element.value().attr("href") {
                if let Some(url) = absolutize(href, page_url) {
                    if url.ends_with(".pdf") {
                        push(url, &mut candidates);
                    }
                }
            }
        }
    }

    for m in abs_pdf_re().find_iter(markup) {
        push(m.as_str().to_string(), &mut candidates);
    }

    for url in constructed {
        push(url.clone(), &mut candidates);
    }

    candidates
}

fn artifact_filename(patent_id: &str, title: Option<&str>, ext: &str) -> String {
    match title {
        Some(t) if !t.is_empty() => format!("{patent_id}_{t}.{ext}"),
        _ => format!("{patent_id}.{ext}"),
    }
}

/// Fetch a candidate URL and verify it actually serves a PDF.
async fn fetch_pdf(client: &HttpClient, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url).await?;
    if !response.is_success() {
        return Err(FetchError::Status {
            status: response.status.as_u16(),
            url: url.to_string(),
        });
    }
    if !response.is_pdf() {
        return Err(FetchError::ContentType {
            expected: "application/pdf",
            actual: response.content_type().unwrap_or("unknown").to_string(),
            url: url.to_string(),
        });
    }
    response.bytes().await
}

/// Counts reported after a download run.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub attempted: usize,
    pub pdf_downloaded: usize,
    pub ledger_path: PathBuf,
}

/// Downloads every identifier in sequence, recording each outcome durably
/// before moving on.
pub struct DownloadOrchestrator<'a> {
    source: &'a mut dyn DocumentSource,
    client: &'a HttpClient,
    settings: &'a Settings,
    debug: &'a DebugSink,
}

impl<'a> DownloadOrchestrator<'a> {
    pub fn new(
        source: &'a mut dyn DocumentSource,
        client: &'a HttpClient,
        settings: &'a Settings,
        debug: &'a DebugSink,
    ) -> Self {
        Self {
            source,
            client,
            settings,
            debug,
        }
    }

    /// Download all identifiers, flushing the ledger after every attempt.
    /// Individual failures never abort the remaining identifiers.
    pub async fn run_all(
        &mut self,
        record_key: &str,
        ids: &[String],
    ) -> Result<DownloadOutcome, AcquireError> {
        let mut ledger = DownloadLedger::create(&self.settings.output_dir, record_key, ids)
            .map_err(|e| AcquireError::persistence(&self.settings.output_dir, e))?;

        println!(
            "{} Downloading {} patents via {} source",
            style("→").cyan(),
            ids.len(),
            self.source.name()
        );

        let bar = ProgressBar::new(ids.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("  [{bar:30}] {pos}/{len} {msg}")
                .expect("progress template")
                .progress_chars("=> "),
        );

        let mut downloaded = 0usize;
        for (index, patent_id) in ids.iter().enumerate() {
            bar.set_message(patent_id.clone());

            let record = match self.download_one(patent_id).await {
                Ok(Some(path)) => {
                    downloaded += 1;
                    bar.println(format!(
                        "  {} {} saved to {}",
                        style("✓").green(),
                        patent_id,
                        path.display()
                    ));
                    DownloadRecord::success(path.display().to_string())
                }
                Ok(None) => {
                    bar.println(format!(
                        "  {} {} no PDF available, kept HTML fallback",
                        style("!").yellow(),
                        patent_id
                    ));
                    DownloadRecord::failed("Could not download PDF")
                }
                Err(e) => {
                    warn!("error processing {}: {}", patent_id, e);
                    bar.println(format!(
                        "  {} {} {}",
                        style("✗").red(),
                        patent_id,
                        e
                    ));
                    DownloadRecord::error(e.to_string())
                }
            };

            // Ledger flush failure is surfaced but does not abort the run.
            if let Err(e) = ledger.record(patent_id, record) {
                warn!("cannot update download record: {}", e);
            }
            bar.inc(1);

            if index + 1 < ids.len() {
                tokio::time::sleep(self.settings.download_delay()).await;
            }
        }
        bar.finish_and_clear();

        Ok(DownloadOutcome {
            attempted: ids.len(),
            pdf_downloaded: downloaded,
            ledger_path: ledger.path().to_path_buf(),
        })
    }

    /// Download one patent: Ok(Some(path)) on PDF success, Ok(None) when
    /// only the HTML fallback could be saved.
    async fn download_one(&mut self, patent_id: &str) -> Result<Option<PathBuf>, AcquireError> {
        let page_url = self.settings.patent_url(patent_id);
        info!("fetching patent page {}", page_url);

        let page = self.source.document(&page_url).await?;

        if self.debug.enabled() {
            self.debug
                .save_html(&format!("patent_{patent_id}"), &page.source);
            if let Some(png) = self.source.snapshot().await {
                self.debug.save_png(&format!("patent_{patent_id}"), &png);
            }
        }

        let title = page
            .title
            .as_deref()
            .map(|t| clean_title(t, patent_id))
            .filter(|t| !t.is_empty());
        if let Some(ref t) = title {
            debug!("patent title: {}", t);
        }

        let base_id = ident::strip_kind_code(patent_id);
        let guesses = self.source.pdf_url_guesses(self.settings, base_id);
        let candidates = locate_pdf_candidates(&page.source, &page_url, &guesses);

        let sanitized = title.as_deref().map(sanitize_title);
        for candidate in &candidates {
            info!("trying PDF URL {}", candidate);
            match fetch_pdf(self.client, candidate).await {
                Ok(bytes) => {
                    let filename =
                        artifact_filename(patent_id, sanitized.as_deref(), "pdf");
                    let path = self.settings.output_dir.join(filename);
                    std::fs::write(&path, &bytes)
                        .map_err(|e| AcquireError::persistence(&path, e))?;
                    return Ok(Some(path));
                }
                Err(e) => debug!("PDF candidate failed: {}", e),
            }
        }

        // No candidate served a PDF; keep the page markup instead.
        let filename = artifact_filename(patent_id, sanitized.as_deref(), "html");
        let path = self.settings.output_dir.join(filename);
        std::fs::write(&path, &page.source).map_err(|e| AcquireError::persistence(&path, e))?;
        info!("saved HTML fallback {}", path.display());
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_title_strips_site_suffix_and_id_prefix() {
        assert_eq!(
            clean_title("US1234567B2 - Solid electrolyte - Google Patents", "US1234567B2"),
            "Solid electrolyte"
        );
        assert_eq!(clean_title("Just a title", "US1"), "Just a title");
    }

    #[test]
    fn title_from_markup_reads_first_title() {
        let html = "<html><head><title> A title </title></head><body></body></html>";
        assert_eq!(title_from_markup(html).as_deref(), Some("A title"));
        assert_eq!(title_from_markup("<html></html>"), None);
    }

    #[test]
    fn anchor_candidates_come_before_constructed_urls() {
        let html = r#"
            <html><body>
              <a href="https://patentimages.example.com/pdfs/US1234567.pdf">Download PDF</a>
            </body></html>
        "#;
        let constructed = vec!["https://assets.example.com/US1234567.pdf".to_string()];
        let candidates = locate_pdf_candidates(
            html,
            "https://patents.google.com/patent/US1234567B2/en",
            &constructed,
        );
        assert_eq!(
            candidates,
            [
                "https://patentimages.example.com/pdfs/US1234567.pdf",
                "https://assets.example.com/US1234567.pdf",
            ]
        );
    }

    #[test]
    fn relative_pdf_hrefs_are_resolved_against_the_page() {
        let html = r#"<a href="/downloads/US1.pdf">pdf</a>"#;
        let candidates = locate_pdf_candidates(
            html,
            "https://patents.google.com/patent/US1/en",
            &[],
        );
        assert_eq!(candidates, ["https://patents.google.com/downloads/US1.pdf"]);
    }

    #[test]
    fn markup_scan_finds_absolute_pdf_urls() {
        let html = r#"<script>var pdf = "https://cdn.example.com/docs/US2.pdf";</script>"#;
        let candidates =
            locate_pdf_candidates(html, "https://patents.google.com/patent/US2/en", &[]);
        assert_eq!(candidates, ["https://cdn.example.com/docs/US2.pdf"]);
    }

    #[test]
    fn duplicate_candidates_collapse() {
        let html = r#"
            <a href="https://cdn.example.com/US3.pdf">one</a>
            <a href="https://cdn.example.com/US3.pdf">two</a>
        "#;
        let candidates =
            locate_pdf_candidates(html, "https://patents.google.com/patent/US3/en", &[]);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn anchors_not_ending_in_pdf_are_ignored() {
        let html = r#"<a href="/viewer?file=US4.pdf&page=1">viewer</a>"#;
        let candidates =
            locate_pdf_candidates(html, "https://patents.google.com/patent/US4/en", &[]);
        assert!(candidates.is_empty());
    }

    #[test]
    fn artifact_filenames_include_sanitized_title_when_present() {
        assert_eq!(
            artifact_filename("US1234567B2", Some("Solid_electrolyte"), "pdf"),
            "US1234567B2_Solid_electrolyte.pdf"
        );
        assert_eq!(artifact_filename("US1234567B2", None, "html"), "US1234567B2.html");
    }
}
