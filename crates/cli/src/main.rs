//! Wireup CLI - validate and resolve dependency manifests.

mod manifest;

use anyhow::Result;
use clap::{Parser, Subcommand};
use manifest::{render, Manifest};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "wireup")]
#[command(about = "Resolve named producers in dependency order", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a manifest and print the execution order
    Check {
        /// Manifest path
        manifest: PathBuf,
        /// Completion parameter name
        #[arg(long)]
        done_name: Option<String>,
    },
    /// Resolve a manifest and print the result as JSON
    Resolve {
        /// Manifest path
        manifest: PathBuf,
        /// Completion parameter name
        #[arg(long)]
        done_name: Option<String>,
        /// Async deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Check { manifest, done_name } => {
            let loaded = Manifest::load(&manifest)?;
            let config = loaded.config(done_name, None);
            let tree = loaded.into_tree(config)?;
            let plan = tree.plan()?;

            println!("Execution order ({})", plan.graph().len());
            for (step, name) in plan.order().into_iter().enumerate() {
                println!("  {:>3}. {}", step + 1, name);
            }
        }
        Commands::Resolve { manifest, done_name, timeout_ms } => {
            let loaded = Manifest::load(&manifest)?;
            let config = loaded.config(done_name, timeout_ms);
            let tree = loaded.into_tree(config)?;

            let resolved = tree.resolve()?.await?;
            info!("Resolved {} names", resolved.len());
            println!("{}", serde_json::to_string_pretty(&render(&resolved))?);
        }
    }

    Ok(())
}
