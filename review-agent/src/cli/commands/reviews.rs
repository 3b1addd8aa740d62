use anyhow::{Context, Result};
use clap::Args;
use colored::*;

use super::{LocationArgs, OutputFormat, print_json};
use crate::context::AppContext;
use crate::services::sync::{ReviewQuery, SyncReport};

#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub target: LocationArgs,

    /// Sync even when the cache is still fresh
    #[arg(long)]
    pub force: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct ReviewsArgs {
    #[command(flatten)]
    pub target: LocationArgs,

    #[arg(long, default_value_t = 1)]
    pub page: i64,

    #[arg(long, default_value_t = 50)]
    pub limit: i64,

    /// Refresh from upstream before listing
    #[arg(long)]
    pub force_refresh: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,
}

fn print_report(report: &SyncReport) {
    println!(
        "Synced {} reviews over {} page(s): {} new, {} changed, {} unchanged",
        report.synced.to_string().bright_green().bold(),
        report.pages_processed,
        report.inserted,
        report.updated,
        report.unchanged
    );
    if report.skipped > 0 {
        println!("  {} skipped {} reviews without an id", "!".yellow(), report.skipped);
    }
    if report.upstream_total > 0 {
        println!(
            "  Upstream reports {} reviews, average rating {:.2}",
            report.upstream_total, report.average_rating
        );
    }
}

pub async fn handle_sync(ctx: &AppContext, args: SyncArgs) -> Result<()> {
    let target = &args.target;
    let scope = ctx
        .catalog
        .resolve_scope(target.user, &target.account, &target.location)
        .await?
        .sync_scope();
    let credential = ctx.credentials.credential_for(target.user).await?;

    let report = if args.force {
        Some(ctx.sync.refresh(&scope, &credential).await.context("Review sync failed")?)
    } else {
        ctx.sync
            .get_reviews(&scope, &credential, ReviewQuery { limit: 1, ..Default::default() })
            .await
            .context("Review sync failed")?
            .sync
    };

    match (args.format, report) {
        (OutputFormat::Json, report) => print_json(&report),
        (OutputFormat::Human, Some(report)) => {
            print_report(&report);
            Ok(())
        }
        (OutputFormat::Human, None) => {
            println!(
                "{}",
                "Cache is fresh; nothing synced (use --force to sync anyway)".dimmed()
            );
            Ok(())
        }
    }
}

pub async fn handle_reviews(ctx: &AppContext, args: ReviewsArgs) -> Result<()> {
    let target = &args.target;
    let scope = ctx
        .catalog
        .resolve_scope(target.user, &target.account, &target.location)
        .await?
        .sync_scope();
    let credential = ctx.credentials.credential_for(target.user).await?;
    let result = ctx
        .sync
        .get_reviews(
            &scope,
            &credential,
            ReviewQuery {
                page: args.page,
                limit: args.limit,
                force_refresh: args.force_refresh,
            },
        )
        .await
        .context("Failed to load reviews")?;

    if args.format == OutputFormat::Json {
        return print_json(&result);
    }

    if let Some(report) = &result.sync {
        print_report(report);
        println!();
    }
    for item in &result.reviews {
        let review = &item.review;
        let stars = "★".repeat(review.rating.clamp(0, 5) as usize);
        println!(
            "{} {} {}",
            stars.yellow(),
            review.reviewer_name.bold(),
            review.review_date.dimmed()
        );
        if !review.review_text.is_empty() {
            println!("  {}", review.review_text);
        }
        if let Some(sentiment) = &item.sentiment {
            let label = match sentiment.as_str() {
                "positive" => sentiment.green(),
                "negative" => sentiment.red(),
                _ => sentiment.normal(),
            };
            println!("  [{}] {}", label, item.summary.as_deref().unwrap_or(""));
        }
        if !review.reply_text.is_empty() {
            println!("  {} {}", "reply:".cyan(), review.reply_text);
        }
    }
    println!(
        "Page {} of {} ({} reviews)",
        result.current_page, result.total_pages, result.total_count
    );
    Ok(())
}
