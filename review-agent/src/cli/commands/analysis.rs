use anyhow::{Context, Result};
use clap::Args;
use colored::*;

use super::{LocationArgs, OutputFormat, print_json};
use crate::config::repository::analysis as analysis_cache;
use crate::context::AppContext;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub target: LocationArgs,

    #[arg(long, default_value_t = 1)]
    pub page: i64,

    #[arg(long, default_value_t = 50)]
    pub limit: i64,

    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct StatsArgs {
    #[command(flatten)]
    pub target: LocationArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,
}

pub async fn handle_analyze(ctx: &AppContext, args: AnalyzeArgs) -> Result<()> {
    let Some(service) = ctx.analysis.as_ref() else {
        anyhow::bail!("Review analysis is disabled; set GEMINI_API_KEY to enable it");
    };
    let target = &args.target;
    let scope = ctx
        .catalog
        .resolve_scope(target.user, &target.account, &target.location)
        .await?
        .sync_scope();

    let reviews: Vec<_> = ctx
        .sync
        .cached_page(&scope, args.page, args.limit)
        .await?
        .reviews
        .into_iter()
        .map(|item| item.review)
        .collect();
    let batch = service.analyze_batch(&reviews).await;

    if args.format == OutputFormat::Json {
        return print_json(&batch);
    }

    println!(
        "Analyzed {} reviews: {} new, {} cached, {} errors",
        batch.stats.total,
        batch.stats.new_analysis.to_string().bright_green().bold(),
        batch.stats.cached,
        if batch.stats.errors > 0 {
            batch.stats.errors.to_string().red().bold()
        } else {
            batch.stats.errors.to_string().normal()
        }
    );
    for error in &batch.errors {
        println!("  {} {}", "✗".red(), error);
    }
    Ok(())
}

pub async fn handle_stats(ctx: &AppContext, args: StatsArgs) -> Result<()> {
    let target = &args.target;
    let scope = ctx
        .catalog
        .resolve_scope(target.user, &target.account, &target.location)
        .await?
        .sync_scope();
    let stats = analysis_cache::stats(&ctx.pool, scope.account_id, scope.location_id)
        .await
        .context("Failed to load analysis stats")?;

    if args.format == OutputFormat::Json {
        return print_json(&stats);
    }

    println!(
        "{} reviews, {} analyzed",
        stats.total_reviews.to_string().bold(),
        stats.total_analyzed
    );
    match stats.avg_rating {
        Some(avg) => println!("Average rating: {:.2}", avg),
        None => println!("Average rating: {}", "n/a".dimmed()),
    }
    println!(
        "Sentiment: {} positive, {} neutral, {} negative",
        stats.positive_count.to_string().green(),
        stats.neutral_count,
        stats.negative_count.to_string().red()
    );
    Ok(())
}
