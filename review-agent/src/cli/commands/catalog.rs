use anyhow::{Context, Result};
use clap::Args;
use colored::*;

use super::{OutputFormat, print_json};
use crate::context::AppContext;

#[derive(Args, Debug)]
pub struct CatalogArgs {
    /// Internal user id
    #[arg(long)]
    pub user: i64,

    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,
}

pub async fn handle_sync_catalog(ctx: &AppContext, args: CatalogArgs) -> Result<()> {
    let credential = ctx.credentials.credential_for(args.user).await?;
    let report = ctx
        .catalog
        .sync_catalog(args.user, &credential)
        .await
        .context("Failed to sync business catalog")?;

    if args.format == OutputFormat::Json {
        return print_json(&report);
    }

    println!(
        "Synced {} accounts and {} locations",
        report.accounts.to_string().bright_green().bold(),
        report.locations.to_string().bright_green().bold()
    );
    for account in &report.failed_accounts {
        println!("  {} could not list locations of account {}", "!".yellow(), account);
    }

    for entry in ctx.catalog.business_locations(args.user).await? {
        println!(
            "{} {}",
            entry.account.account_name.bold(),
            format!("({})", entry.account.google_account_id).dimmed()
        );
        for location in &entry.locations {
            println!(
                "  - {} {}",
                location.location_name,
                format!("({})", location.google_location_id).dimmed()
            );
        }
    }
    Ok(())
}
