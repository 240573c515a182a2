//! Tasksync MCP Server - Main Entry Point
//!
//! This is the main entry point for the tasksync MCP server application.
//! The actual implementation is in the `tasksync_mcp` library.

use anyhow::Result;
use clap::{CommandFactory, Parser};
use mcp_attr::server::serve_stdio;
use std::path::PathBuf;
use tasksync_mcp::{Config, SyncServerHandler};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Tasksync MCP Server - multi-source work item synchronization via Model Context Protocol
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the sync data file
    file: String,

    /// Path to the account and source configuration
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is not set (e.g. "debug", "tasksync_mcp=trace")
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Check if no arguments were provided (except the program name)
    if std::env::args().len() == 1 {
        // No arguments provided, show help and exit with error code
        let mut cmd = Args::command();
        cmd.print_help().ok();
        println!(); // Add a newline after help
        std::process::exit(2);
    }

    let args = Args::parse();

    // stdout carries the MCP protocol, so logs go to stderr
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(args.config.as_deref())?;
    info!(
        file = %args.file,
        accounts = config.accounts.len(),
        "starting tasksync server"
    );
    let handler = SyncServerHandler::new(&args.file, &config)?;
    serve_stdio(handler).await?;
    Ok(())
}
