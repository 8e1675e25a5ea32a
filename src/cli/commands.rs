//! CLI commands implementation.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use patacquire::config::{load_settings, Settings};
use patacquire::run::{self, EngineKind};

#[derive(Parser)]
#[command(name = "patac")]
#[command(about = "Patent document acquisition from Google Patents")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Search a topic and download the matching patents
    Acquire {
        /// Topic to search for
        topic: String,

        /// Output directory for downloaded patents
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum number of patents to download
        #[arg(short, long)]
        max: Option<usize>,

        /// Result language
        #[arg(short, long)]
        language: Option<String>,

        /// Run the browser visibly (not headless)
        #[arg(long)]
        visible: bool,

        /// Save debug snapshots of rendered pages
        #[arg(long)]
        debug: bool,

        /// Document source for the download phase
        #[arg(long, value_enum, default_value = "browser")]
        engine: Engine,
    },

    /// Download one patent by identifier, skipping search
    Fetch {
        /// Patent identifier (e.g. US9999999B2)
        patent_id: String,

        /// Output directory for downloaded patents
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Run the browser visibly (not headless)
        #[arg(long)]
        visible: bool,

        /// Save debug snapshots of rendered pages
        #[arg(long)]
        debug: bool,

        /// Document source for the patent page
        #[arg(long, value_enum, default_value = "browser")]
        engine: Engine,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Engine {
    /// Render document pages in the controlled browser
    Browser,
    /// Fetch document pages with plain HTTP
    Http,
}

impl From<Engine> for EngineKind {
    fn from(engine: Engine) -> Self {
        match engine {
            Engine::Browser => EngineKind::Browser,
            Engine::Http => EngineKind::Http,
        }
    }
}

fn apply_overrides(
    settings: &mut Settings,
    output: Option<PathBuf>,
    max: Option<usize>,
    language: Option<String>,
    visible: bool,
    debug: bool,
) {
    if let Some(output) = output {
        settings.output_dir = output;
    }
    if let Some(max) = max {
        settings.max_results = max;
    }
    if let Some(language) = language {
        settings.language = language;
    }
    if visible {
        settings.headless = false;
    }
    if debug {
        settings.debug_snapshots = true;
    }
}

pub async fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Acquire {
            topic,
            output,
            max,
            language,
            visible,
            debug,
            engine,
        } => {
            apply_overrides(&mut settings, output, max, language, visible, debug);
            let outcome = run::acquire_topic(&settings, &topic, engine.into()).await?;
            Ok(outcome.exit_code())
        }
        Commands::Fetch {
            patent_id,
            output,
            visible,
            debug,
            engine,
        } => {
            apply_overrides(&mut settings, output, None, None, visible, debug);
            let outcome = run::fetch_single(&settings, &patent_id, engine.into()).await?;
            Ok(outcome.exit_code())
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&settings)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
