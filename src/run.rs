//! Run controller: search then download, with guaranteed browser teardown
//! on every exit path.

use std::process::ExitCode;

use console::style;
use tracing::info;

use crate::config::Settings;
use crate::download::{
    BrowserDocumentSource, DownloadOrchestrator, DownloadOutcome, HttpDocumentSource,
};
use crate::error::AcquireError;
use crate::fetch::HttpClient;
use crate::ident;
use crate::render::{RenderConfig, RenderSession};
use crate::search::SearchOrchestrator;
use crate::storage::DebugSink;

/// Which capability backs the download phase's document pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Browser,
    Http,
}

/// Terminal state of a run, mapped to distinct exit codes so calling
/// automation can tell "nothing found" from "found but none downloadable".
#[derive(Debug)]
pub enum RunOutcome {
    Completed { found: usize, downloaded: usize },
    NoPdfDownloaded { found: usize },
    NothingFound,
}

impl RunOutcome {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            RunOutcome::Completed { .. } => ExitCode::SUCCESS,
            RunOutcome::NothingFound => ExitCode::from(2),
            RunOutcome::NoPdfDownloaded { .. } => ExitCode::from(3),
        }
    }
}

/// Search a topic, then download every discovered patent.
pub async fn acquire_topic(
    settings: &Settings,
    topic: &str,
    engine: EngineKind,
) -> anyhow::Result<RunOutcome> {
    settings.ensure_directories()?;
    let debug = DebugSink::new(&settings.output_dir, settings.debug_snapshots);
    let client = HttpClient::new(settings.request_timeout(), settings.request_delay())?;

    let mut session = RenderSession::launch(RenderConfig::from_settings(settings)).await?;
    let result = acquire_with_session(settings, topic, engine, &client, &debug, &mut session).await;
    // Teardown runs on every path, including failure.
    session.close().await;
    result
}

async fn acquire_with_session(
    settings: &Settings,
    topic: &str,
    engine: EngineKind,
    client: &HttpClient,
    debug: &DebugSink,
    session: &mut RenderSession,
) -> anyhow::Result<RunOutcome> {
    println!("{} Step 1: search", style("●").cyan());
    let ids = {
        let mut search = SearchOrchestrator::new(session, settings, debug);
        match search.run(topic).await {
            Ok(set) => set,
            Err(AcquireError::SearchExhausted) => {
                println!(
                    "{} No patents found for this topic; try a different query",
                    style("✗").red()
                );
                return Ok(RunOutcome::NothingFound);
            }
            Err(other) => return Err(other.into()),
        }
    };

    println!(
        "{} Step 2: download {} patents",
        style("●").cyan(),
        ids.len()
    );
    let outcome = match engine {
        EngineKind::Browser => {
            let mut source = BrowserDocumentSource::new(session, settings);
            DownloadOrchestrator::new(&mut source, client, settings, debug)
                .run_all(topic, ids.ids())
                .await?
        }
        EngineKind::Http => {
            let mut source = HttpDocumentSource::new(client.clone());
            DownloadOrchestrator::new(&mut source, client, settings, debug)
                .run_all(topic, ids.ids())
                .await?
        }
    };

    summarize(&outcome);
    Ok(if outcome.pdf_downloaded == 0 {
        RunOutcome::NoPdfDownloaded { found: ids.len() }
    } else {
        RunOutcome::Completed {
            found: ids.len(),
            downloaded: outcome.pdf_downloaded,
        }
    })
}

/// Download a single named identifier, skipping search. The ledger is keyed
/// by the identifier itself.
pub async fn fetch_single(
    settings: &Settings,
    patent_id: &str,
    engine: EngineKind,
) -> anyhow::Result<RunOutcome> {
    if !ident::is_valid(patent_id) {
        anyhow::bail!("'{patent_id}' does not look like a patent identifier");
    }

    settings.ensure_directories()?;
    let debug = DebugSink::new(&settings.output_dir, settings.debug_snapshots);
    let client = HttpClient::new(settings.request_timeout(), settings.request_delay())?;
    let ids = vec![patent_id.to_string()];

    info!("direct download of {}", patent_id);
    let outcome = match engine {
        EngineKind::Browser => {
            let mut session =
                RenderSession::launch(RenderConfig::from_settings(settings)).await?;
            let result = {
                let mut source = BrowserDocumentSource::new(&mut session, settings);
                DownloadOrchestrator::new(&mut source, &client, settings, &debug)
                    .run_all(patent_id, &ids)
                    .await
            };
            session.close().await;
            result?
        }
        EngineKind::Http => {
            let mut source = HttpDocumentSource::new(client.clone());
            DownloadOrchestrator::new(&mut source, &client, settings, &debug)
                .run_all(patent_id, &ids)
                .await?
        }
    };

    summarize(&outcome);
    Ok(if outcome.pdf_downloaded == 0 {
        RunOutcome::NoPdfDownloaded { found: 1 }
    } else {
        RunOutcome::Completed {
            found: 1,
            downloaded: 1,
        }
    })
}

fn summarize(outcome: &DownloadOutcome) {
    println!(
        "{} Downloaded {} of {} patents as PDF (record: {})",
        style("✓").green(),
        outcome.pdf_downloaded,
        outcome.attempted,
        outcome.ledger_path.display()
    );
}
