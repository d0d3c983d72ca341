//! tunecheck - music plagiarism check
//!
//! Subcommands:
//! - `build-index`: embed the reference corpus and write a fresh index snapshot
//! - `check`: score one query track (and optionally its lyrics) against the snapshot
//! - `stats`: print the persisted corpus statistics and manifest
//!
//! Results go to stdout; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tunecheck_common::config::{default_config_path, DataFolderInitializer, DataFolderResolver};
use tunecheck_engine::index::SnapshotStore;
use tunecheck_engine::{build_index, report, DetectError, Detector, DetectorConfig, Providers, ResourceManager};

/// Command-line arguments for tunecheck
#[derive(Parser, Debug)]
#[command(name = "tunecheck")]
#[command(about = "Detect likely musical plagiarism against a reference corpus")]
#[command(version)]
struct Cli {
    /// Data folder holding the index snapshot and reference material
    #[arg(long, global = true)]
    data_folder: Option<PathBuf>,

    /// Configuration file (default: <config_dir>/tunecheck/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the reference index, corpus statistics and lyrics index
    BuildIndex {
        /// Reference audio directory (overrides paths.songs_dir)
        #[arg(long)]
        songs: Option<PathBuf>,

        /// Reference lyrics directory (overrides paths.lyrics_dir)
        #[arg(long)]
        lyrics: Option<PathBuf>,
    },

    /// Check a query track against the reference index
    Check {
        /// Query audio file
        audio: PathBuf,

        /// Lyrics of the query track
        #[arg(long)]
        lyrics: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Print the persisted corpus statistics
    Stats,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<DetectError>() {
            Some(DetectError::MissingIndex { path, remediation }) => {
                eprintln!("error: no reference index at {}", path.display());
                eprintln!("hint: {}", remediation);
                ExitCode::from(2)
            }
            Some(err @ DetectError::IndexCorpusMismatch(_)) => {
                eprintln!("error: {}", err);
                eprintln!("hint: the index snapshot is inconsistent; rebuild it with `tunecheck build-index`");
                ExitCode::from(3)
            }
            _ => {
                eprintln!("error: {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().or_else(default_config_path);
    let config = DetectorConfig::load(config_path.as_deref())?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.logging.level))
                .unwrap_or_else(|_| EnvFilter::new("tunecheck_engine=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let data_folder = DataFolderResolver::new("tunecheck")
        .with_cli_arg(cli.data_folder.clone())
        .with_config_path(cli.config.clone())
        .resolve();
    let paths = config.paths.resolved_against(&data_folder);
    info!(
        data_folder = %data_folder.display(),
        version = env!("CARGO_PKG_VERSION"),
        "tunecheck starting"
    );

    match cli.command {
        Command::BuildIndex { songs, lyrics } => {
            DataFolderInitializer::new(data_folder.clone())
                .ensure_directory_exists()
                .context("Failed to initialize data folder")?;

            let songs_dir = songs.unwrap_or_else(|| paths.songs_dir.clone());
            let lyrics_dir = lyrics.unwrap_or_else(|| paths.lyrics_dir.clone());
            let providers = Providers::baseline(&config);
            let chunking = config.chunking.clone();
            let store = SnapshotStore::new(paths.index_dir.clone());

            let built = tokio::task::spawn_blocking(move || -> Result<_> {
                let built = build_index(
                    &songs_dir,
                    Some(lyrics_dir.as_path()),
                    providers.audio.as_ref(),
                    providers.text.as_ref(),
                    &chunking,
                )?;
                store.save(&built.snapshot)?;
                Ok(built)
            })
            .await
            .context("Index build task failed")??;

            let manifest = &built.snapshot.manifest;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "snapshot_id": manifest.snapshot_id,
                    "tracks": manifest.tracks,
                    "audio_entries": manifest.audio_entries,
                    "lyrics_entries": manifest.lyrics_entries,
                    "meanSim": built.snapshot.stats.mean_similarity,
                    "stdSim": built.snapshot.stats.std_similarity,
                    "skipped_audio": built.skipped_audio.iter().map(|(p, _)| p.display().to_string()).collect::<Vec<_>>(),
                    "skipped_lyrics": built.skipped_lyrics.iter().map(|(p, _)| p.display().to_string()).collect::<Vec<_>>(),
                }))?
            );
        }

        Command::Check { audio, lyrics, format } => {
            let providers = Providers::baseline(&config);
            let detector = Detector::new(ResourceManager::new(config, paths, providers));
            let result = detector.check(&audio, lyrics.as_deref()).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
                OutputFormat::Text => print!("{}", report::render_text(&result)),
            }
        }

        Command::Stats => {
            let providers = Providers::baseline(&config);
            let resources = ResourceManager::new(config, paths, providers);
            let snapshot = resources.snapshot().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "meanSim": snapshot.stats.mean_similarity,
                    "stdSim": snapshot.stats.std_similarity,
                    "manifest": snapshot.manifest,
                }))?
            );
        }
    }

    Ok(())
}
