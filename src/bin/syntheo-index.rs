//! Thin CLI harness driving [`syntheo_semantics::Engine`]: `index`, `search`,
//! `watch`, `status`. This is the "CLI front-end" `spec.md §1` scopes out of
//! the core as an external collaborator — it exists only to exercise the
//! library from a terminal, not as a product surface.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use syntheo_semantics::{Engine, SearchOptions};

#[derive(Parser)]
#[command(name = "syntheo-index", about = "Local-first semantic code search engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest (or re-ingest) a workspace into its `.syntheo/semantics/` index.
    Index {
        /// Workspace root to index.
        path: String,
        /// Re-ingest every file regardless of the change-detection cache.
        #[arg(long)]
        force: bool,
    },
    /// Run a hybrid search against an already-indexed workspace.
    Search {
        /// Workspace root previously indexed.
        path: String,
        /// Natural-language or identifier-like query.
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long = "type")]
        block_type: Option<String>,
        #[arg(long)]
        min_score: Option<f32>,
        #[arg(long)]
        semantic_only: bool,
        #[arg(long)]
        keyword_only: bool,
        #[arg(long)]
        no_rerank: bool,
    },
    /// Index once, then watch for further changes until interrupted.
    Watch {
        path: String,
    },
    /// Print block/file counts for an already-indexed workspace.
    Status {
        path: String,
    },
}

fn install_panic_hook() {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_default();
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        error!(target: "syntheo_index::panic", location = %location, payload = %payload, "PANIC: thread panicked");
        default_panic(info);
    }));
}

fn init_tracing() {
    let log_dir = std::env::var("SYNTHEO_LOG_DIR").unwrap_or_else(|_| ".syntheo/logs".to_string());
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&log_dir, "syntheo-index.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
    // Leaked so the non-blocking writer keeps flushing for the process
    // lifetime of a one-shot CLI invocation.
    std::mem::forget(guard);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "syntheo_semantics=info,syntheo_index=info".into());

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).compact();
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(non_blocking_writer)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    install_panic_hook();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> syntheo_semantics::Result<()> {
    match command {
        Command::Index { path, force } => {
            let engine = Engine::open(path).await?;
            engine.index(force).await?;
            info!(
                total_files = engine.total_files()?,
                total_blocks = engine.total_blocks()?,
                "index complete"
            );
            Ok(())
        }
        Command::Search {
            path,
            query,
            limit,
            language,
            block_type,
            min_score,
            semantic_only,
            keyword_only,
            no_rerank,
        } => {
            let engine = Engine::open(path).await?;
            let mut options = engine.default_search_options();
            if let Some(limit) = limit {
                options.limit = limit;
            }
            options.language = language;
            options.block_type = block_type;
            if let Some(min_score) = min_score {
                options.min_score = Some(min_score);
            }
            options.semantic_only = semantic_only;
            options.keyword_only = keyword_only;
            if no_rerank {
                options.rerank = false;
            }

            let hits = engine.search(&query, &options).await?;
            print_hits(&hits);
            Ok(())
        }
        Command::Watch { path } => {
            let engine = Engine::open(path).await?;
            engine.index(false).await?;
            let _watcher = engine.watch(None)?;
            info!("watching for changes, press Ctrl+C to stop");
            tokio::signal::ctrl_c().await.ok();
            info!("shutting down, persisting stores");
            engine.persist()?;
            Ok(())
        }
        Command::Status { path } => {
            let engine = Engine::open(path).await?;
            println!(
                "totalFiles={} totalBlocks={}",
                engine.total_files()?,
                engine.total_blocks()?
            );
            Ok(())
        }
    }
}

fn print_hits(hits: &[syntheo_semantics::SearchHit]) {
    if hits.is_empty() {
        println!("no results");
        return;
    }
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{:>2}. {:.4}  {}:{}-{}  [{}/{}]  {}",
            i + 1,
            hit.score,
            hit.file_path,
            hit.start_line,
            hit.end_line,
            hit.language,
            hit.block_type,
            hit.symbol_name.as_deref().unwrap_or("-"),
        );
    }
}
