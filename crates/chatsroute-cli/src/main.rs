//! CLI entry point for chatsroute.
//!
//! This binary provides the `chatsroute` command: it loads a routes file,
//! builds an intent-routing engine from it and routes utterances given on
//! the command line or typed into a REPL.

mod config;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use chatsroute_kernel::{Engine, RunOutcome, Strategy};

use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// chatsroute: route utterances to handlers by semantic similarity.
#[derive(Parser)]
#[command(
    name = "chatsroute",
    version,
    about = "Intent router: match utterances to trigger phrases and extract parameters"
)]
struct Cli {
    /// Routes file.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route one utterance and print the handler output.
    Match {
        /// The utterance; multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        utterance: Vec<String>,

        /// `nearest` or `hybrid` (`hnswlib` and `bm25_hybrid` also work).
        #[arg(short, long)]
        strategy: Option<Strategy>,
    },

    /// Route utterances read line by line until `quit` or `exit`.
    Repl {
        #[arg(short, long)]
        strategy: Option<Strategy>,
    },

    /// Load the routes file, build the index and report what was loaded.
    Check,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    init_tracing(if cli.verbose { "debug" } else { "info" });

    let engine = AppConfig::load(&cli.config)?.build_engine()?;

    match cli.command {
        Commands::Match {
            utterance,
            strategy,
        } => cmd_match(&engine, &utterance.join(" "), strategy).await,
        Commands::Repl { strategy } => cmd_repl(&engine, strategy).await,
        Commands::Check => cmd_check(&engine).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn cmd_match(engine: &Engine, utterance: &str, strategy: Option<Strategy>) -> Result<()> {
    let outcome = engine
        .run(utterance, strategy)
        .await
        .context("failed to route utterance")?;
    print_outcome(&outcome)
}

async fn cmd_repl(engine: &Engine, strategy: Option<Strategy>) -> Result<()> {
    let strategy = strategy.unwrap_or(engine.config().default_strategy);
    info!(strategy = %strategy, routes = engine.registry().len(), "starting repl");

    println!();
    println!("  chatsroute v{}", env!("CARGO_PKG_VERSION"));
    println!("  Type an utterance, or 'quit' to exit.");
    println!();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        io::stdout().flush().context("failed to flush stdout")?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("failed to read input")?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "quit" || trimmed == "exit" {
            info!("user requested exit");
            break;
        }

        // A failing utterance is reported, not fatal.
        match engine.run(trimmed, Some(strategy)).await {
            Ok(outcome) => print_outcome(&outcome)?,
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}

async fn cmd_check(engine: &Engine) -> Result<()> {
    let registry = engine.registry();
    let pending = registry.pending_count();
    let fields: usize = registry.routes().iter().map(|r| r.fields.len()).sum();

    let snapshot = engine.build_index().await.context("failed to build index")?;

    println!("routes:            {}", snapshot.len());
    println!("extraction fields: {fields}");
    println!("built at:          {}", snapshot.built_at.to_rfc3339());
    if pending > 0 {
        println!("warning: {pending} schema(s) declared for handlers without a route");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn print_outcome(outcome: &RunOutcome) -> Result<()> {
    match outcome {
        RunOutcome::Handled { output, .. } => {
            let text = serde_json::to_string_pretty(output).context("failed to render output")?;
            println!("{text}");
        }
        RunOutcome::NoMatch { best_score } => {
            info!(best_score = ?best_score, "no route above threshold");
            println!("No relevant match found.");
        }
    }
    Ok(())
}

/// Initialize the tracing subscriber with the given default level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(io::stderr)
        .init();
}
