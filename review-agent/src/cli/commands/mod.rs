//! Command definitions and dispatch

pub mod analysis;
pub mod catalog;
pub mod reply;
pub mod reviews;
pub mod serve;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

use crate::context::AppContext;

#[derive(Parser)]
#[command(name = "review-agent")]
#[command(about = "Sync, cache and analyze Google Business Profile reviews")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve,
    /// Pull a user's business accounts and locations
    SyncCatalog(catalog::CatalogArgs),
    /// Sync reviews of one location
    Sync(reviews::SyncArgs),
    /// List cached reviews of one location
    Reviews(reviews::ReviewsArgs),
    /// Analyze a page of stored reviews
    Analyze(analysis::AnalyzeArgs),
    /// Show analysis statistics of one location
    Stats(analysis::StatsArgs),
    /// Post an owner reply to a review
    Reply(reply::ReplyArgs),
}

/// Identifies one location of a user
#[derive(Args, Debug, Clone)]
pub struct LocationArgs {
    /// Internal user id
    #[arg(long)]
    pub user: i64,
    /// Account id, bare or `accounts/{id}`
    #[arg(long)]
    pub account: String,
    /// Location id, bare or as a resource name
    #[arg(long)]
    pub location: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Colored summary
    #[default]
    Human,
    /// Pretty-printed JSON
    Json,
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run(command: Commands, ctx: AppContext) -> Result<()> {
    match command {
        Commands::Serve => serve::handle_serve(ctx).await,
        Commands::SyncCatalog(args) => catalog::handle_sync_catalog(&ctx, args).await,
        Commands::Sync(args) => reviews::handle_sync(&ctx, args).await,
        Commands::Reviews(args) => reviews::handle_reviews(&ctx, args).await,
        Commands::Analyze(args) => analysis::handle_analyze(&ctx, args).await,
        Commands::Stats(args) => analysis::handle_stats(&ctx, args).await,
        Commands::Reply(args) => reply::handle_reply(&ctx, args).await,
    }
}
