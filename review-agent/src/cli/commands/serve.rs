use anyhow::Result;
use colored::*;
use std::sync::Arc;

use crate::context::AppContext;

pub async fn handle_serve(ctx: AppContext) -> Result<()> {
    println!(
        "Starting review-agent on {} ({})",
        ctx.config.server.bind.bright_green().bold(),
        ctx.config.server.environment.cyan()
    );
    if ctx.analysis.is_none() {
        println!("{}", "Review analysis disabled: no API key configured".yellow());
    }
    crate::http::serve(Arc::new(ctx)).await
}
