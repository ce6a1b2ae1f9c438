use crate::cli::{prompt, CliContext};
use crate::core::flows::{self, IssueRequest, IssueSummary};
use anyhow::{bail, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct IssueArgs {
    /// Account name prefix (prompted for when omitted)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Directory for key files (default: <root>/accounts)
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

pub fn run(ctx: &CliContext, args: IssueArgs) -> Result<()> {
    let remote = ctx.connect()?;
    println!("Project: {}", remote.project());
    let prefix = prompt::prefix(ctx, args.prefix, "my-sa, dev-runner")?;
    let request = IssueRequest {
        prefix,
        output: args.output.unwrap_or_else(|| ctx.paths.output.clone()),
    };

    let _run = ctx.lock_run()?;
    let journal = ctx.journal(remote.project());
    println!(
        "Issuing one new key for every '{}*' account (existing keys are kept)...",
        request.prefix
    );
    let summary = flows::issue(&remote.session(ctx, &journal), &request)?;

    if summary.accounts.is_empty() {
        println!("No accounts start with '{}'. Nothing to do.", request.prefix);
        return Ok(());
    }
    print_summary(&summary);
    println!("Key files are in {}", request.output.display());

    if !summary.failed.is_empty() {
        bail!(
            "{} accounts still failing after {} passes",
            summary.failed.len(),
            summary.passes
        );
    }
    Ok(())
}

fn print_summary(summary: &IssueSummary) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Account").add_attribute(Attribute::Bold),
        Cell::new("Result").add_attribute(Attribute::Bold),
        Cell::new("File").add_attribute(Attribute::Bold),
    ]);
    for (account, path) in &summary.saved {
        table.add_row(vec![account.email.clone(), "saved".into(), path.display().to_string()]);
    }
    for account in &summary.limit_reached {
        table.add_row(vec![account.email.clone(), "key limit reached".into(), "-".into()]);
    }
    for (account, detail) in &summary.rejected {
        table.add_row(vec![account.email.clone(), format!("rejected: {}", detail), "-".into()]);
    }
    for account in &summary.failed {
        table.add_row(vec![account.email.clone(), "FAILED".into(), "-".into()]);
    }
    println!("{}", table);
    println!(
        "\n{} accounts: {} saved, {} at key limit, {} rejected, {} failed ({} passes)",
        summary.accounts.len(),
        summary.saved.len(),
        summary.limit_reached.len(),
        summary.rejected.len(),
        summary.failed.len(),
        summary.passes
    );
}
