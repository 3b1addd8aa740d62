use anyhow::{Context, Result};
use clap::Args;
use colored::*;

use super::{LocationArgs, OutputFormat, print_json};
use crate::context::AppContext;

#[derive(Args, Debug)]
pub struct ReplyArgs {
    #[command(flatten)]
    pub target: LocationArgs,

    /// Review id, bare or as a resource name
    #[arg(long)]
    pub review: String,

    /// Reply text
    #[arg(long)]
    pub text: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,
}

pub async fn handle_reply(ctx: &AppContext, args: ReplyArgs) -> Result<()> {
    let target = &args.target;
    let scope = ctx
        .catalog
        .resolve_scope(target.user, &target.account, &target.location)
        .await?
        .sync_scope();
    let credential = ctx.credentials.credential_for(target.user).await?;
    let ack = ctx
        .sync
        .reply_to_review(&scope, &credential, &args.review, &args.text)
        .await
        .with_context(|| format!("Failed to reply to review {}", args.review))?;

    if args.format == OutputFormat::Json {
        return print_json(&ack);
    }
    println!(
        "{} Reply posted{}",
        "✓".bright_green(),
        ack.update_time
            .map(|t| format!(" at {}", t))
            .unwrap_or_default()
    );
    Ok(())
}
