use crate::cli::{prompt, CliContext};
use crate::core::directory;
use crate::provider::IdentityProvider;
use anyhow::{bail, Context, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};
use serde::Serialize;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only accounts whose name starts with this prefix (default: all)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Also count each account's user-managed keys (one extra call per account)
    #[arg(long)]
    pub keys: bool,

    /// Output format: table|json
    #[arg(long, default_value = "table")]
    pub format: String,
}

#[derive(Debug, Serialize)]
struct ListItem {
    name: String,
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_keys: Option<usize>,
}

pub fn run(ctx: &CliContext, args: ListArgs) -> Result<()> {
    if args.format != "table" && args.format != "json" {
        bail!("invalid format: {} (use table|json)", args.format);
    }
    let prefix = match args.prefix.as_deref() {
        Some(raw) => prompt::normalize_prefix(raw)?,
        None => String::new(),
    };

    let remote = ctx.connect()?;
    let accounts = directory::find_accounts(&remote.client, remote.project(), &prefix)?;

    let mut items = Vec::with_capacity(accounts.len());
    for account in accounts {
        let user_keys = if args.keys {
            let keys = remote
                .client
                .list_user_keys(remote.project(), &account)
                .with_context(|| format!("list keys of {}", account))?;
            Some(keys.len())
        } else {
            None
        };
        items.push(ListItem {
            name: account.name,
            email: account.email,
            user_keys,
        });
    }

    if args.format == "json" {
        let json = serde_json::to_string_pretty(&items).context("serialize list")?;
        println!("{}", json);
        return Ok(());
    }

    if items.is_empty() {
        println!("No service accounts found in project {}", remote.project());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    let mut header = vec![
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Email").add_attribute(Attribute::Bold),
    ];
    if args.keys {
        header.push(Cell::new("User keys").add_attribute(Attribute::Bold));
    }
    table.set_header(header);

    let count = items.len();
    for item in items {
        let mut row = vec![item.name, item.email];
        if let Some(n) = item.user_keys {
            row.push(n.to_string());
        }
        table.add_row(row);
    }

    println!("{}", table);
    println!("\n{} accounts in project {}", count, remote.project());
    Ok(())
}
