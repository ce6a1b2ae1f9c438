//! Account directory: prefix-filtered view of the project's service accounts.

use crate::error::ProviderError;
use crate::models::account::Account;
use crate::provider::IdentityProvider;
use anyhow::{bail, Result};

/// Accounts of `project` whose short name starts with `prefix`, sorted by name.
///
/// Matching is an exact, case-sensitive prefix test. A permission denial is
/// fatal; other provider errors are returned unchanged for the caller to judge.
pub fn find_accounts(
    provider: &dyn IdentityProvider,
    project: &str,
    prefix: &str,
) -> Result<Vec<Account>> {
    let all = match provider.list_accounts(project) {
        Ok(all) => all,
        Err(ProviderError::PermissionDenied(detail)) => bail!(
            "permission denied listing service accounts of '{}': the controller needs \
             'iam.serviceAccounts.list' ({})",
            project,
            detail
        ),
        Err(e) => return Err(e.into()),
    };

    let mut matched: Vec<Account> = all
        .into_iter()
        .filter(|a| a.name.starts_with(prefix))
        .collect();
    matched.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::info!(project, prefix, count = matched.len(), "matched service accounts");
    Ok(matched)
}
