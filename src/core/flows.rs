//! End-to-end runs: discovery issuance, purge, and the account factory.
//!
//! Every run takes an explicit request and a [`Session`]; nothing here reads
//! stdin, so prompts and confirmations stay in the CLI layer.

use crate::core::audit_log::Journal;
use crate::core::batch::BatchDriver;
use crate::core::directory;
use crate::core::keys::{KeyManager, KeyOutcome, LimitPolicy};
use crate::core::output::OutputDir;
use crate::core::pacing::{Pacer, Sleeper};
use crate::core::reconcile::{self, ReconcileReport, Reconciler};
use crate::models::account::{factory_index, Account};
use crate::models::settings::Settings;
use crate::provider::IdentityProvider;
use anyhow::{anyhow, bail, Result};
use std::path::PathBuf;

/// Everything a run needs besides its request.
pub struct Session<'a> {
    pub provider: &'a dyn IdentityProvider,
    pub project: &'a str,
    pub settings: &'a Settings,
    pub sleeper: &'a dyn Sleeper,
    pub journal: Option<&'a Journal>,
}

impl<'a> Session<'a> {
    fn key_manager(&self) -> KeyManager<'a> {
        KeyManager {
            provider: self.provider,
            project: self.project,
            retry: &self.settings.retry,
            delete_pause: self.settings.pacing.delete_pause(),
            sleeper: self.sleeper,
            journal: self.journal,
        }
    }

    /// Batch driver with key pacing.
    fn key_driver(&self, label: &'a str) -> BatchDriver<'a> {
        BatchDriver {
            label,
            pacer: Pacer::new(self.settings.pacing.window, self.settings.pacing.key_cooldown()),
            retry_delay: self.settings.pacing.retry_delay(),
            max_passes: self.settings.retry.max_passes,
            sleeper: self.sleeper,
        }
    }
}

/// Discovery mode: one new key for every account matching `prefix`.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub prefix: String,
    pub output: PathBuf,
}

/// Delete every user-managed key of the accounts matching `prefix`.
#[derive(Debug, Clone)]
pub struct PurgeRequest {
    pub prefix: String,
}

/// Ensure `prefix-001 ..= prefix-count` exist, then give each exactly one fresh key.
#[derive(Debug, Clone)]
pub struct FactoryRequest {
    pub prefix: String,
    pub count: u32,
    pub output: PathBuf,
}

#[derive(Debug, Default)]
pub struct IssueSummary {
    pub accounts: Vec<Account>,
    pub saved: Vec<(Account, PathBuf)>,
    pub limit_reached: Vec<Account>,
    pub rejected: Vec<(Account, String)>,
    pub failed: Vec<Account>,
    pub passes: u32,
}

#[derive(Debug, Default)]
pub struct PurgeSummary {
    pub accounts: Vec<Account>,
    /// Keys deleted per account, in processing order.
    pub deleted: Vec<(Account, usize)>,
    pub failed: Vec<Account>,
    pub passes: u32,
    /// False when the operator declined the confirmation.
    pub confirmed: bool,
}

impl PurgeSummary {
    pub fn total_deleted(&self) -> usize {
        self.deleted.iter().map(|(_, n)| n).sum()
    }
}

#[derive(Debug, Default)]
pub struct FactorySummary {
    pub reconcile: ReconcileReport,
    pub keys_deleted: usize,
    pub saved: Vec<(Account, PathBuf)>,
    /// Accounts whose key reset did not finish (delete or create phase).
    pub failed: Vec<Account>,
}

/// Issue one key per matching account, never touching existing keys.
pub fn issue(session: &Session<'_>, request: &IssueRequest) -> Result<IssueSummary> {
    let accounts = directory::find_accounts(session.provider, session.project, &request.prefix)?;
    let mut summary = IssueSummary {
        accounts: accounts.clone(),
        ..Default::default()
    };
    if accounts.is_empty() {
        return Ok(summary);
    }

    let output = OutputDir::create(&request.output)?;
    let keys = session.key_manager();
    let report = session.key_driver("issue keys").run(accounts, |account| {
        match keys.create_and_save(account, &output, &account.name, LimitPolicy::Tolerate)? {
            KeyOutcome::Saved(path) => summary.saved.push((account.clone(), path)),
            KeyOutcome::LimitReached => summary.limit_reached.push(account.clone()),
            KeyOutcome::Rejected(detail) => summary.rejected.push((account.clone(), detail)),
        }
        Ok(())
    });

    summary.passes = report.passes;
    summary.failed = report.failed;
    Ok(summary)
}

/// Delete all user-managed keys of the matching accounts.
///
/// `confirm` sees the matched accounts before anything is deleted; returning
/// `false` ends the run with nothing changed.
pub fn purge<F>(session: &Session<'_>, request: &PurgeRequest, confirm: F) -> Result<PurgeSummary>
where
    F: FnOnce(&[Account]) -> Result<bool>,
{
    let accounts = directory::find_accounts(session.provider, session.project, &request.prefix)?;
    let mut summary = PurgeSummary {
        accounts: accounts.clone(),
        ..Default::default()
    };
    if accounts.is_empty() {
        return Ok(summary);
    }
    if !confirm(&accounts)? {
        tracing::info!("purge declined, no keys deleted");
        return Ok(summary);
    }
    summary.confirmed = true;

    let keys = session.key_manager();
    let report = session.key_driver("delete keys").run(accounts, |account| {
        let n = keys.delete_user_keys(account)?;
        if n == 0 {
            tracing::info!(account = %account, "no user-managed keys");
        }
        summary.deleted.push((account.clone(), n));
        Ok(())
    });

    summary.passes = report.passes;
    summary.failed = report.failed;
    Ok(summary)
}

/// Reconcile the numbered account set, clear every account's keys, then issue
/// one key each into `<output>/<index>.json`.
pub fn factory(session: &Session<'_>, request: &FactoryRequest) -> Result<FactorySummary> {
    if request.count == 0 {
        bail!("account count must be at least 1");
    }
    let output = OutputDir::create(&request.output)?;
    let pacing = &session.settings.pacing;
    let desired = reconcile::desired_accounts(
        &request.prefix,
        request.count,
        session.project,
        &session.settings.provider.account_domain,
    );

    let reconciler = Reconciler {
        provider: session.provider,
        project: session.project,
        pacer: Pacer::new(pacing.window, pacing.account_cooldown()),
        visibility_pause: pacing.account_visibility_pause(),
        settle_delay: pacing.settle_delay(),
        error_delay: pacing.reconcile_error_delay(),
        max_rounds: session.settings.retry.max_reconcile_rounds,
        sleeper: session.sleeper,
        journal: session.journal,
    };
    let mut summary = FactorySummary {
        reconcile: reconciler.run(&desired)?,
        ..Default::default()
    };

    let keys = session.key_manager();
    let deleted = session.key_driver("delete keys").run(desired.clone(), |account| {
        summary.keys_deleted += keys.delete_user_keys(account)?;
        Ok(())
    });

    // An account whose old keys could not be cleared is not given a new one.
    let ready: Vec<Account> = desired
        .into_iter()
        .filter(|a| !deleted.failed.contains(a))
        .collect();
    summary.failed = deleted.failed;

    let created = session.key_driver("create keys").run(ready, |account| {
        let index = factory_index(&request.prefix, &account.name)
            .ok_or_else(|| anyhow!("{} is not a numbered account of '{}'", account, request.prefix))?;
        if let KeyOutcome::Saved(path) =
            keys.create_and_save(account, &output, &index.to_string(), LimitPolicy::Fail)?
        {
            summary.saved.push((account.clone(), path));
        }
        Ok(())
    });
    summary.failed.extend(created.failed);

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pacing::RecordingSleeper;
    use crate::error::ProviderError;
    use crate::provider::memory::{MemoryProvider, Op};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn session<'a>(
        provider: &'a MemoryProvider,
        settings: &'a Settings,
        sleeper: &'a RecordingSleeper,
    ) -> Session<'a> {
        Session {
            provider,
            project: "demo",
            settings,
            sleeper,
            journal: None,
        }
    }

    #[test]
    fn test_issue_skips_accounts_at_limit() {
        let p = MemoryProvider::new("demo")
            .with_account("sa-a", 10, 0)
            .with_account("sa-b", 1, 0)
            .with_account("other", 0, 0);
        let settings = Settings::default();
        let sleeper = RecordingSleeper::new();
        let dir = TempDir::new().unwrap();
        let req = IssueRequest {
            prefix: "sa".into(),
            output: dir.path().join("accounts"),
        };

        let summary = issue(&session(&p, &settings, &sleeper), &req).unwrap();
        assert_eq!(summary.accounts.len(), 2);
        assert_eq!(summary.limit_reached.len(), 1);
        assert_eq!(summary.limit_reached[0].name, "sa-a");
        assert_eq!(summary.saved.len(), 1);
        assert!(dir.path().join("accounts/sa-b.json").is_file());
        assert!(!dir.path().join("accounts/sa-a.json").exists());
        assert_eq!(summary.passes, 1);
    }

    #[test]
    fn test_issue_with_no_match_creates_nothing() {
        let p = MemoryProvider::new("demo").with_account("other", 0, 0);
        let settings = Settings::default();
        let sleeper = RecordingSleeper::new();
        let dir = TempDir::new().unwrap();
        let req = IssueRequest {
            prefix: "sa".into(),
            output: dir.path().join("accounts"),
        };
        let summary = issue(&session(&p, &settings, &sleeper), &req).unwrap();
        assert!(summary.accounts.is_empty());
        assert_eq!(p.calls(Op::CreateKey), 0);
        assert!(!dir.path().join("accounts").exists());
    }

    #[test]
    fn test_issue_requeues_unknown_failure() {
        let p = MemoryProvider::new("demo").with_account("sa-a", 0, 0);
        p.fail_next(Op::CreateKey, Some("sa-a"), ProviderError::Other("boom".into()));
        let settings = Settings::default();
        let sleeper = RecordingSleeper::new();
        let dir = TempDir::new().unwrap();
        let req = IssueRequest {
            prefix: "sa".into(),
            output: dir.path().to_path_buf(),
        };
        let summary = issue(&session(&p, &settings, &sleeper), &req).unwrap();
        assert_eq!(summary.passes, 2);
        assert!(summary.failed.is_empty());
        assert_eq!(summary.saved.len(), 1);
        assert_eq!(sleeper.count(Duration::from_secs(10)), 1);
    }

    #[test]
    fn test_purge_deletes_all_user_keys() {
        let p = MemoryProvider::new("demo")
            .with_account("sa-a", 3, 1)
            .with_account("sa-b", 0, 1);
        let settings = Settings::default();
        let sleeper = RecordingSleeper::new();
        let summary = purge(
            &session(&p, &settings, &sleeper),
            &PurgeRequest { prefix: "sa".into() },
            |accounts| {
                assert_eq!(accounts.len(), 2);
                Ok(true)
            },
        )
        .unwrap();
        assert!(summary.confirmed);
        assert_eq!(summary.total_deleted(), 3);
        assert_eq!(p.calls(Op::DeleteKey), 3);
        assert_eq!(p.keys_of("sa-a").len(), 1);
    }

    #[test]
    fn test_purge_declined_deletes_nothing() {
        let p = MemoryProvider::new("demo").with_account("sa-a", 3, 0);
        let settings = Settings::default();
        let sleeper = RecordingSleeper::new();
        let summary = purge(
            &session(&p, &settings, &sleeper),
            &PurgeRequest { prefix: "sa".into() },
            |_| Ok(false),
        )
        .unwrap();
        assert!(!summary.confirmed);
        assert_eq!(p.calls(Op::DeleteKey), 0);
        assert_eq!(p.keys_of("sa-a").len(), 3);
    }

    #[test]
    fn test_factory_resets_keys() {
        let p = MemoryProvider::new("demo")
            .with_account("sa-001", 4, 1)
            .with_account("sa-007", 2, 0);
        let settings = Settings::default();
        let sleeper = RecordingSleeper::new();
        let dir = TempDir::new().unwrap();
        let req = FactoryRequest {
            prefix: "sa".into(),
            count: 3,
            output: dir.path().join("accounts"),
        };

        let summary = factory(&session(&p, &settings, &sleeper), &req).unwrap();
        assert_eq!(summary.reconcile.created, 2);
        assert_eq!(summary.keys_deleted, 4);
        assert!(summary.failed.is_empty());
        assert_eq!(summary.saved.len(), 3);
        for n in 1..=3 {
            let path = dir.path().join(format!("accounts/{}.json", n));
            assert!(!fs::read_to_string(path).unwrap().is_empty());
        }
        // one fresh user key each, system key untouched
        assert_eq!(p.keys_of("sa-001").len(), 2);
        assert_eq!(p.keys_of("sa-002").len(), 1);
        // out-of-range account left alone
        assert_eq!(p.keys_of("sa-007").len(), 2);
    }

    #[test]
    fn test_factory_rejects_zero_count() {
        let p = MemoryProvider::new("demo");
        let settings = Settings::default();
        let sleeper = RecordingSleeper::new();
        let req = FactoryRequest {
            prefix: "sa".into(),
            count: 0,
            output: TempDir::new().unwrap().path().to_path_buf(),
        };
        assert!(factory(&session(&p, &settings, &sleeper), &req).is_err());
        assert_eq!(p.calls(Op::ListAccounts), 0);
    }

    #[test]
    fn test_factory_skips_create_when_delete_gives_up() {
        let p = MemoryProvider::new("demo").with_account("sa-001", 1, 0);
        p.fail_next(Op::ListKeys, Some("sa-001"), ProviderError::PermissionDenied("no".into()));
        let mut settings = Settings::default();
        settings.retry.max_passes = Some(1);
        let sleeper = RecordingSleeper::new();
        let dir = TempDir::new().unwrap();
        let req = FactoryRequest {
            prefix: "sa".into(),
            count: 1,
            output: dir.path().to_path_buf(),
        };
        let summary = factory(&session(&p, &settings, &sleeper), &req).unwrap();
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(p.calls(Op::CreateKey), 0);
    }
}
