use crate::cli::{prompt, CliContext};
use crate::core::flows::{self, FactoryRequest};
use crate::models::account::factory_name;
use anyhow::{bail, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct FactoryArgs {
    /// Account name prefix (prompted for when omitted)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Target number of accounts, prefix-001..prefix-N (prompted for when omitted)
    #[arg(long)]
    pub count: Option<u32>,

    /// Directory for key files (default: <root>/accounts)
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

pub fn run(ctx: &CliContext, args: FactoryArgs) -> Result<()> {
    let remote = ctx.connect()?;
    println!("Project: {}", remote.project());
    let prefix = prompt::prefix(ctx, args.prefix, "sa")?;
    let count = prompt::count(ctx, args.count, &prefix)?;
    let request = FactoryRequest {
        output: args.output.unwrap_or_else(|| ctx.paths.output.clone()),
        prefix,
        count,
    };

    println!(
        "\nTarget: {} .. {} in project {}",
        factory_name(&request.prefix, 1),
        factory_name(&request.prefix, request.count),
        remote.project()
    );
    println!("Missing accounts are created, every user-managed key is deleted,");
    println!("and one new key per account is written to {}", request.output.display());
    if !prompt::confirm(ctx, args.yes, "Continue?")? {
        println!("Aborted.");
        return Ok(());
    }

    let _run = ctx.lock_run()?;
    let journal = ctx.journal(remote.project());
    let summary = flows::factory(&remote.session(ctx, &journal), &request)?;

    println!(
        "  [PASS] accounts: {} created, {} rounds",
        summary.reconcile.created, summary.reconcile.rounds
    );
    println!("  [PASS] old keys deleted: {}", summary.keys_deleted);

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Account").add_attribute(Attribute::Bold),
        Cell::new("Key file").add_attribute(Attribute::Bold),
    ]);
    for (account, path) in &summary.saved {
        table.add_row(vec![account.email.clone(), path.display().to_string()]);
    }
    for account in &summary.failed {
        table.add_row(vec![account.email.clone(), "FAILED".to_string()]);
    }
    println!("{}", table);

    if !summary.failed.is_empty() {
        for account in &summary.failed {
            println!("  [FAIL] {}", account);
        }
        bail!("{} accounts did not get a fresh key", summary.failed.len());
    }
    println!(
        "\n{} accounts '{}-*' each have exactly one fresh key on disk.",
        request.count, request.prefix
    );
    Ok(())
}
