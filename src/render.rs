//! Controlled browser session for the JS-heavy search frontend.
//!
//! Wraps chromiumoxide (CDP) behind a small capability surface: navigate,
//! wait for a selector, evaluate a script, read page source/title, capture a
//! screenshot. Every operation runs through a retry wrapper that recreates
//! the browser on a typed session-lost signal and backs off linearly on
//! other transient failures.

#[cfg(feature = "browser")]
use std::time::Duration;

use serde::{Deserialize, Serialize};
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, NavigateParams};
#[cfg(feature = "browser")]
use chromiumoxide::error::CdpError;
#[cfg(feature = "browser")]
use chromiumoxide::page::ScreenshotParams;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;

use crate::error::RenderError;
#[cfg(feature = "browser")]
use crate::fetch::USER_AGENT;

/// Browser session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Run headless (default). Visible mode helps debugging.
    pub headless: bool,

    /// Retry budget for browser operations.
    pub retries: u32,

    /// Additional Chrome arguments.
    pub chrome_args: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            headless: true,
            retries: 3,
            chrome_args: Vec::new(),
        }
    }
}

impl RenderConfig {
    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        Self {
            headless: settings.headless,
            retries: settings.render_retries,
            chrome_args: Vec::new(),
        }
    }
}

#[cfg(feature = "browser")]
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Classify session-fatal CDP failures: a broken websocket or command
/// channel means the browser process is gone and must be relaunched.
#[cfg(feature = "browser")]
fn is_session_error(err: &CdpError) -> bool {
    matches!(
        err,
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse
    )
}

#[cfg(feature = "browser")]
fn classify(err: CdpError, what: &str) -> RenderError {
    if is_session_error(&err) {
        RenderError::SessionLost(err.to_string())
    } else if matches!(err, CdpError::Timeout) {
        RenderError::Timeout(what.to_string())
    } else {
        RenderError::Browser {
            what: what.to_string(),
            message: err.to_string(),
        }
    }
}

/// One controlled browser instance with a single active page.
#[cfg(feature = "browser")]
pub struct RenderSession {
    config: RenderConfig,
    browser: Option<Browser>,
    page: Option<Page>,
}

#[cfg(feature = "browser")]
impl RenderSession {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        // Common install locations
        "/opt/google/chrome/google-chrome",
    ];

    /// Launch a session eagerly so startup failures surface before any
    /// orchestration begins.
    pub async fn launch(config: RenderConfig) -> Result<Self, RenderError> {
        let mut session = Self {
            config,
            browser: None,
            page: None,
        };
        session.ensure_open().await?;
        Ok(session)
    }

    fn find_chrome() -> Result<std::path::PathBuf, RenderError> {
        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("Found Chrome in PATH: {}", path);
                        return Ok(std::path::PathBuf::from(path));
                    }
                }
            }
        }

        Err(RenderError::Browser {
            what: "locate chrome".to_string(),
            message: "Chrome/Chromium not found; install it or put it on PATH".to_string(),
        })
    }

    async fn ensure_open(&mut self) -> Result<(), RenderError> {
        if self.page.is_some() {
            return Ok(());
        }

        if self.browser.is_none() {
            info!("Launching browser (headless={})", self.config.headless);

            let chrome_path = Self::find_chrome()?;
            let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);

            // with_head means NOT headless, confusingly
            if !self.config.headless {
                builder = builder.with_head();
            }

            builder = builder
                .arg("--disable-blink-features=AutomationControlled")
                .arg("--disable-infobars")
                .arg("--disable-dev-shm-usage")
                .arg("--no-first-run")
                .arg("--no-default-browser-check")
                .arg("--disable-background-networking")
                .arg("--disable-sync")
                .arg("--window-size=1920,1080")
                .arg("--no-sandbox") // Often needed for headless in containers
                .arg("--disable-gpu")
                .arg("--disable-software-rasterizer");

            for arg in &self.config.chrome_args {
                builder = builder.arg(arg);
            }

            let browser_config = builder.build().map_err(|e| RenderError::Browser {
                what: "build browser config".to_string(),
                message: e,
            })?;

            let (browser, mut handler) = Browser::launch(browser_config)
                .await
                .map_err(|e| classify(e, "launch browser"))?;

            tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            self.browser = Some(browser);
        }

        let browser = match self.browser.as_ref() {
            Some(b) => b,
            None => {
                return Err(RenderError::Browser {
                    what: "open page".to_string(),
                    message: "browser unavailable after launch".to_string(),
                })
            }
        };

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| classify(e, "open page"))?;

        // Realistic user agent before any navigation.
        page.execute(SetUserAgentOverrideParams::new(USER_AGENT.to_string()))
            .await
            .map_err(|e| classify(e, "set user agent"))?;

        self.page = Some(page);
        Ok(())
    }

    /// Handle to the live page. Cheap: pages are reference-counted.
    async fn page(&mut self) -> Result<Page, RenderError> {
        self.ensure_open().await?;
        self.page.clone().ok_or_else(|| RenderError::Browser {
            what: "access page".to_string(),
            message: "page unavailable".to_string(),
        })
    }

    /// Tear down the current browser and start a fresh one.
    async fn reinitialize(&mut self) -> Result<(), RenderError> {
        warn!("Browser session invalid, reinitializing");
        self.teardown().await;
        self.ensure_open().await
    }

    async fn teardown(&mut self) {
        self.page = None;
        if let Some(mut browser) = self.browser.take() {
            let _ = browser.close().await;
            let _ = browser.wait().await;
        }
    }

    /// Run an operation against the live page with retries. A session-lost
    /// failure recreates the browser before the next attempt; other
    /// failures wait with linearly increasing backoff.
    async fn with_retry<T, F, Fut>(&mut self, what: &str, op: F) -> Result<T, RenderError>
    where
        F: Fn(Page) -> Fut,
        Fut: std::future::Future<Output = Result<T, CdpError>>,
    {
        let budget = self.config.retries.max(1);
        let mut attempt = 0u32;
        loop {
            let page = self.page().await?;
            match op(page).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let classified = classify(err, what);
                    if attempt + 1 >= budget {
                        return Err(classified);
                    }
                    warn!(
                        "{} failed (attempt {}/{}): {}",
                        what,
                        attempt + 1,
                        budget,
                        classified
                    );
                    if classified.is_session_lost() {
                        self.reinitialize().await?;
                    } else {
                        tokio::time::sleep(Duration::from_secs(2 * (u64::from(attempt) + 1)))
                            .await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Navigate the page and wait best-effort for the DOM to be ready.
    pub async fn navigate(&mut self, url: &str) -> Result<(), RenderError> {
        info!("Navigating to {}", url);
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| RenderError::Browser {
                what: "build navigation".to_string(),
                message: e,
            })?;

        self.with_retry("navigate", move |page| {
            let params = params.clone();
            async move {
                page.execute(params).await?;
                Ok(())
            }
        })
        .await?;

        // Ready-state check instead of a fixed sleep; non-HTML pages or
        // mid-transition evaluation failures are tolerated.
        let ready_script = r#"
            new Promise((resolve) => {
                if (document.readyState === 'complete' || document.readyState === 'interactive') {
                    resolve(document.readyState);
                } else {
                    document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
                    setTimeout(() => resolve('timeout'), 10000);
                }
            })
        "#;
        match self.evaluate(ready_script).await {
            Ok(state) => debug!("Page ready state: {}", state),
            Err(e) => debug!("Could not check ready state: {}", e),
        }

        Ok(())
    }

    /// Wait for a selector to appear, polling until the timeout. Absence is
    /// not an error: returns Ok(false) when the timeout elapses.
    pub async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, RenderError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let sel = selector.to_string();
            let found = self
                .with_retry("query selector", move |page| {
                    let sel = sel.clone();
                    async move {
                        match page.find_element(sel).await {
                            Ok(_) => Ok(true),
                            Err(err) if is_session_error(&err) => Err(err),
                            // Not present yet (or not queryable): a miss,
                            // not a failure.
                            Err(_) => Ok(false),
                        }
                    }
                })
                .await?;
            if found {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    /// Evaluate a script, returning its JSON value (null when the result
    /// does not deserialize).
    pub async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, RenderError> {
        let script = script.to_string();
        self.with_retry("evaluate script", move |page| {
            let script = script.clone();
            async move {
                let result = page.evaluate(script).await?;
                Ok(result
                    .into_value::<serde_json::Value>()
                    .unwrap_or(serde_json::Value::Null))
            }
        })
        .await
    }

    /// Current page markup.
    pub async fn page_source(&mut self) -> Result<String, RenderError> {
        self.with_retry("read page source", |page| async move {
            page.content().await
        })
        .await
    }

    /// Document title, if the page has one.
    pub async fn title(&mut self) -> Result<Option<String>, RenderError> {
        self.with_retry("read title", |page| async move { page.get_title().await })
            .await
    }

    /// Full-page PNG screenshot.
    pub async fn screenshot(&mut self) -> Result<Vec<u8>, RenderError> {
        self.with_retry("capture screenshot", |page| async move {
            page.screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
        })
        .await
    }

    /// Release the browser. Safe to call on an already-closed session.
    pub async fn close(&mut self) {
        self.teardown().await;
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct RenderSession {
    #[allow(dead_code)]
    config: RenderConfig,
}

#[cfg(not(feature = "browser"))]
impl RenderSession {
    pub async fn launch(_config: RenderConfig) -> Result<Self, RenderError> {
        Err(RenderError::Unsupported)
    }

    pub async fn navigate(&mut self, _url: &str) -> Result<(), RenderError> {
        Err(RenderError::Unsupported)
    }

    pub async fn wait_for_selector(
        &mut self,
        _selector: &str,
        _timeout: std::time::Duration,
    ) -> Result<bool, RenderError> {
        Err(RenderError::Unsupported)
    }

    pub async fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value, RenderError> {
        Err(RenderError::Unsupported)
    }

    pub async fn page_source(&mut self) -> Result<String, RenderError> {
        Err(RenderError::Unsupported)
    }

    pub async fn title(&mut self) -> Result<Option<String>, RenderError> {
        Err(RenderError::Unsupported)
    }

    pub async fn screenshot(&mut self) -> Result<Vec<u8>, RenderError> {
        Err(RenderError::Unsupported)
    }

    pub async fn close(&mut self) {}
}
