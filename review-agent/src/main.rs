mod api;
mod cli;
mod config;
mod context;
mod error;
mod http;
mod services;

use anyhow::Result;
use clap::Parser;

use cli::Cli;
use config::Config;
use context::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = Config::load(cli.config.as_deref())?;
    let ctx = AppContext::initialize(config).await?;

    cli::commands::run(cli.command, ctx).await
}
