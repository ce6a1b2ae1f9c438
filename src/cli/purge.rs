use crate::cli::{prompt, CliContext};
use crate::core::flows::{self, PurgeRequest};
use anyhow::{bail, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};

#[derive(Args, Debug)]
pub struct PurgeArgs {
    /// Account name prefix (prompted for when omitted)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Skip the typed confirmation
    #[arg(long)]
    pub yes: bool,
}

pub fn run(ctx: &CliContext, args: PurgeArgs) -> Result<()> {
    let remote = ctx.connect()?;
    println!("Project: {}", remote.project());
    let request = PurgeRequest {
        prefix: prompt::prefix(ctx, args.prefix, "sa-prod")?,
    };

    let _run = ctx.lock_run()?;
    let journal = ctx.journal(remote.project());
    let summary = flows::purge(&remote.session(ctx, &journal), &request, |accounts| {
        println!("\nFound {} matching accounts:", accounts.len());
        for account in accounts {
            println!("  - {}", account);
        }
        println!("\nWARNING: every user-managed key of these accounts will be deleted.");
        println!("This cannot be undone.");
        prompt::confirm_typed(ctx, args.yes, "Delete the keys?")
    })?;

    if summary.accounts.is_empty() {
        println!("No accounts start with '{}'. Nothing to do.", request.prefix);
        return Ok(());
    }
    if !summary.confirmed {
        println!("Aborted. No keys were deleted.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Account").add_attribute(Attribute::Bold),
        Cell::new("Keys deleted").add_attribute(Attribute::Bold),
    ]);
    for (account, n) in &summary.deleted {
        table.add_row(vec![account.email.clone(), n.to_string()]);
    }
    for account in &summary.failed {
        table.add_row(vec![account.email.clone(), "FAILED".to_string()]);
    }
    println!("{}", table);
    println!("\nTotal keys deleted: {}", summary.total_deleted());

    if !summary.failed.is_empty() {
        bail!(
            "{} accounts still failing after {} passes",
            summary.failed.len(),
            summary.passes
        );
    }
    Ok(())
}
