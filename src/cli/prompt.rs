use crate::cli::CliContext;
use anyhow::{bail, Context, Result};
use dialoguer::{Confirm, Input};

/// Account ids are lowercase, so the operator's prefix is lowercased and trimmed.
pub fn normalize_prefix(raw: &str) -> Result<String> {
    let prefix = raw.trim().to_lowercase();
    if prefix.is_empty() {
        bail!("prefix cannot be empty");
    }
    if prefix.contains(['@', '/']) {
        bail!("invalid prefix '{}': '@' and '/' are not allowed", prefix);
    }
    Ok(prefix)
}

/// The prefix from `--prefix`, or asked for interactively.
pub fn prefix(ctx: &CliContext, given: Option<String>, example: &str) -> Result<String> {
    let raw = match given {
        Some(p) => p,
        None => {
            if ctx.non_interactive {
                bail!("--non-interactive requires --prefix");
            }
            Input::<String>::new()
                .with_prompt(format!("Account name prefix (e.g. {})", example))
                .interact_text()
                .context("read prefix from prompt")?
        }
    };
    normalize_prefix(&raw)
}

/// The target account count from `--count`, or asked for interactively.
pub fn count(ctx: &CliContext, given: Option<u32>, prefix: &str) -> Result<u32> {
    let count = match given {
        Some(n) => n,
        None => {
            if ctx.non_interactive {
                bail!("--non-interactive requires --count");
            }
            Input::<u32>::new()
                .with_prompt(format!("Total number of '{}-NNN' accounts", prefix))
                .interact_text()
                .context("read count from prompt")?
        }
    };
    if count == 0 {
        bail!("count must be at least 1");
    }
    Ok(count)
}

/// Yes/no confirmation. `--yes` skips it; non-interactive runs must pass `--yes`.
pub fn confirm(ctx: &CliContext, yes: bool, question: &str) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    if ctx.non_interactive {
        bail!("--non-interactive requires --yes for this command");
    }
    Confirm::new()
        .with_prompt(question)
        .default(false)
        .interact()
        .context("read confirmation")
}

/// Confirmation for irreversible deletes: the operator must type `yes`.
pub fn confirm_typed(ctx: &CliContext, yes: bool, question: &str) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    if ctx.non_interactive {
        bail!("--non-interactive requires --yes for this command");
    }
    let answer: String = Input::new()
        .with_prompt(format!("{} Type 'yes' to continue", question))
        .allow_empty(true)
        .interact_text()
        .context("read confirmation")?;
    Ok(is_typed_yes(&answer))
}

fn is_typed_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("  Dev-Runner ").unwrap(), "dev-runner");
        assert!(normalize_prefix("   ").is_err());
        assert!(normalize_prefix("sa@demo").is_err());
    }

    #[test]
    fn test_typed_yes() {
        assert!(is_typed_yes("yes"));
        assert!(is_typed_yes(" YES\n"));
        assert!(!is_typed_yes("y"));
        assert!(!is_typed_yes(""));
    }
}
