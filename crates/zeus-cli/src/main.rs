//! CLI entry point for Zeus: build the index, ask questions, serve the chat endpoint.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use zeus_core::{
    app_data_dir, load_config, open_answerer, open_pipeline, save_config, watch_folders,
    AnswerOrigin, Config, VectorIndex,
};

#[derive(Parser)]
#[command(name = "zeus")]
#[command(about = "Zeus: question answering over your PDFs and spreadsheets")]
struct Cli {
    /// Config file (default: config.toml in the app data directory).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Embed pending PDFs and spreadsheets into the index.
    Ingest,
    /// Answer one question from the command line.
    Ask {
        #[arg(value_name = "QUESTION")]
        question: String,
    },
    /// Serve POST /chat over HTTP.
    Serve {
        #[arg(long, default_value = "127.0.0.1:5000")]
        bind: SocketAddr,
    },
    /// Ingest now, then again whenever the document folders change.
    Watch,
    /// Show index size and ingested file count.
    Status,
    /// Show where Zeus stores its config and index (app data directory).
    DataDir,
    /// Print the resolved configuration with API keys masked.
    Config {
        /// Also write it (without API keys) as the default config file.
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Ingest => ingest(&config).await,
        Commands::Ask { question } => {
            let answerer = open_answerer(&config)?;
            let answer = answerer.ask(&question).await?;
            if answer.origin == AnswerOrigin::Fallback {
                tracing::info!("answered without document context");
            }
            println!("{}", answer.text);
            Ok(())
        }
        Commands::Serve { bind } => {
            let answerer = Arc::new(open_answerer(&config)?);
            zeus_core::server::serve(bind, answerer)
                .await
                .with_context(|| format!("server on {bind} failed"))
        }
        Commands::Watch => watch(&config).await,
        Commands::Status => {
            match VectorIndex::load(&config.paths.index_dir)? {
                Some(index) => {
                    println!("index:      {}", config.paths.index_dir.display());
                    println!("entries:    {}", index.len());
                    println!("dimension:  {}", index.dimension());
                    println!("files:      {}", index.ledger_len());
                }
                None => println!("no index yet at {}", config.paths.index_dir.display()),
            }
            Ok(())
        }
        Commands::DataDir => {
            match app_data_dir() {
                Some(p) => println!("{}", p.display()),
                None => eprintln!("Could not determine app data directory."),
            }
            Ok(())
        }
        Commands::Config { init } => {
            let shown = config.redacted();
            print!("{}", toml::to_string_pretty(&shown)?);
            if init {
                let mut file = config.clone();
                file.embedding.api_key = None;
                file.chat.api_key = None;
                let path = save_config(&file, cli.config.as_deref())?;
                eprintln!("wrote {}", path.display());
            }
            Ok(())
        }
    }
}

async fn ingest(config: &Config) -> anyhow::Result<()> {
    let pipeline = open_pipeline(config)?;
    let report = pipeline.run().await.context("ingestion failed")?;
    println!(
        "embedded {} text(s) in {} batch(es); moved {} file(s); skipped {} unchanged",
        report.units,
        report.batches,
        report.moved.len(),
        report.skipped.len()
    );
    if report.move_failures > 0 {
        eprintln!("{} file(s) could not be moved; see log", report.move_failures);
    }
    Ok(())
}

async fn watch(config: &Config) -> anyhow::Result<()> {
    let pipeline = open_pipeline(config)?;
    std::fs::create_dir_all(&config.paths.pending_dir)
        .with_context(|| format!("cannot create {}", config.paths.pending_dir.display()))?;
    let mut watch = watch_folders(&[
        config.paths.pending_dir.as_path(),
        config.paths.spreadsheet_dir.as_path(),
    ])?;
    loop {
        // A failed run is logged and retried on the next change.
        match pipeline.run().await {
            Ok(report) if report.batches > 0 || !report.moved.is_empty() => {
                tracing::info!(units = report.units, moved = report.moved.len(), "ingested changes")
            }
            Ok(_) => tracing::debug!("nothing new"),
            Err(e) => tracing::error!("ingestion failed: {e}"),
        }
        tokio::select! {
            changed = watch.changed() => {
                if changed.is_none() {
                    return Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}
