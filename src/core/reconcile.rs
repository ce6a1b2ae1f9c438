//! Reconciler: make sure a numbered set of accounts exists (factory mode).

use crate::core::audit_log::Journal;
use crate::core::pacing::{Pacer, Sleeper};
use crate::error::ProviderError;
use crate::models::account::{factory_name, Account};
use crate::provider::IdentityProvider;
use anyhow::{bail, Result};
use std::collections::HashSet;
use std::time::Duration;

/// `prefix-001 ..= prefix-count` as accounts of `project`, in index order.
pub fn desired_accounts(prefix: &str, count: u32, project: &str, domain: &str) -> Vec<Account> {
    (1..=count)
        .map(|n| Account::derived(&factory_name(prefix, n), project, domain))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Directory queries made, including the final one that found nothing missing.
    pub rounds: u32,
    /// Create calls issued.
    pub create_calls: usize,
    /// Accounts this run actually created.
    pub created: usize,
}

pub struct Reconciler<'a> {
    pub provider: &'a dyn IdentityProvider,
    pub project: &'a str,
    pub pacer: Pacer,
    /// Pause after each successful create so the account becomes visible.
    pub visibility_pause: Duration,
    /// Wait after a round of creates before re-querying.
    pub settle_delay: Duration,
    /// Wait after an unexpected listing error.
    pub error_delay: Duration,
    /// `None` keeps going until nothing is missing.
    pub max_rounds: Option<u32>,
    pub sleeper: &'a dyn Sleeper,
    pub journal: Option<&'a Journal>,
}

impl Reconciler<'_> {
    /// Create whatever part of `desired` is missing, re-checking until all exist.
    ///
    /// "Already exists" counts as success. Other create errors are logged and
    /// left to the next verification round. A listing permission denial aborts.
    pub fn run(&self, desired: &[Account]) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let mut last_missing: Vec<String> = Vec::new();

        loop {
            if let Some(max) = self.max_rounds {
                if report.rounds >= max {
                    bail!(
                        "accounts still missing after {} rounds: {}",
                        max,
                        last_missing.join(", ")
                    );
                }
            }
            report.rounds += 1;

            let existing: HashSet<String> = match self.provider.list_accounts(self.project) {
                Ok(accounts) => accounts.into_iter().map(|a| a.email).collect(),
                Err(ProviderError::PermissionDenied(detail)) => bail!(
                    "permission denied listing service accounts of '{}': {}",
                    self.project,
                    detail
                ),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        delay_secs = self.error_delay.as_secs_f64(),
                        "listing accounts failed, retrying"
                    );
                    self.sleeper.sleep(self.error_delay);
                    continue;
                }
            };

            let missing: Vec<&Account> = desired
                .iter()
                .filter(|a| !existing.contains(&a.email))
                .collect();
            if missing.is_empty() {
                tracing::info!(accounts = desired.len(), rounds = report.rounds, "all target accounts exist");
                return Ok(report);
            }
            last_missing = missing.iter().map(|a| a.name.clone()).collect();
            tracing::info!(missing = missing.len(), "creating missing accounts");

            let total = missing.len();
            for (i, account) in missing.into_iter().enumerate() {
                report.create_calls += 1;
                match self.provider.create_account(self.project, &account.name) {
                    Ok(_) => {
                        report.created += 1;
                        self.note(account, None);
                        tracing::info!(account = %account, "created account");
                        self.sleeper.sleep(self.visibility_pause);
                    }
                    Err(ProviderError::AlreadyExists(_)) => {
                        tracing::debug!(account = %account, "account already exists");
                    }
                    Err(e) => {
                        self.note(account, Some(&e));
                        tracing::warn!(account = %account, error = %e, "creating account failed");
                    }
                }
                self.pacer.after_item(i + 1, total, self.sleeper);
            }

            tracing::info!(delay_secs = self.settle_delay.as_secs_f64(), "re-verifying accounts");
            self.sleeper.sleep(self.settle_delay);
        }
    }

    fn note(&self, account: &Account, error: Option<&ProviderError>) {
        if let Some(journal) = self.journal {
            journal.record("create-account", account, None, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants;
    use crate::core::pacing::RecordingSleeper;
    use crate::provider::memory::{MemoryProvider, Op};

    fn reconciler<'a>(
        provider: &'a MemoryProvider,
        sleeper: &'a RecordingSleeper,
        max_rounds: Option<u32>,
    ) -> Reconciler<'a> {
        Reconciler {
            provider,
            project: "demo",
            pacer: Pacer::new(4, Duration::from_secs(20)),
            visibility_pause: Duration::from_millis(500),
            settle_delay: Duration::from_secs(5),
            error_delay: Duration::from_secs(10),
            max_rounds,
            sleeper,
            journal: None,
        }
    }

    fn desired(count: u32) -> Vec<Account> {
        desired_accounts("sa", count, "demo", constants::ACCOUNT_DOMAIN)
    }

    #[test]
    fn test_desired_names() {
        let names: Vec<_> = desired(3).into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["sa-001", "sa-002", "sa-003"]);
    }

    #[test]
    fn test_creates_only_missing() {
        let p = MemoryProvider::new("demo")
            .with_account("sa-002", 0, 0)
            .with_account("other", 0, 0);
        let sleeper = RecordingSleeper::new();
        let report = reconciler(&p, &sleeper, None).run(&desired(3)).unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.create_calls, 2);
        assert_eq!(report.rounds, 2);
        assert_eq!(p.calls_for(Op::CreateAccount, "sa-002"), 0);
        assert_eq!(
            p.account_names(),
            vec!["other", "sa-001", "sa-002", "sa-003"]
        );
    }

    #[test]
    fn test_satisfied_set_makes_no_create_calls() {
        let p = MemoryProvider::new("demo");
        let sleeper = RecordingSleeper::new();
        reconciler(&p, &sleeper, None).run(&desired(5)).unwrap();

        let sleeper = RecordingSleeper::new();
        let report = reconciler(&p, &sleeper, None).run(&desired(5)).unwrap();
        assert_eq!(report.create_calls, 0);
        assert_eq!(report.rounds, 1);
        assert_eq!(p.calls(Op::CreateAccount), 5);
        assert!(sleeper.slept().is_empty());
    }

    #[test]
    fn test_account_cooldown_every_fourth() {
        let p = MemoryProvider::new("demo");
        let sleeper = RecordingSleeper::new();
        reconciler(&p, &sleeper, None).run(&desired(9)).unwrap();
        assert_eq!(sleeper.count(Duration::from_secs(20)), 2);
        assert_eq!(sleeper.count(Duration::from_millis(500)), 9);
        assert_eq!(sleeper.count(Duration::from_secs(5)), 1);
    }

    #[test]
    fn test_failed_create_retried_next_round() {
        let p = MemoryProvider::new("demo");
        p.fail_next(Op::CreateAccount, Some("sa-002"), ProviderError::Other("boom".into()));
        let sleeper = RecordingSleeper::new();
        let report = reconciler(&p, &sleeper, None).run(&desired(3)).unwrap();
        assert_eq!(report.rounds, 3);
        assert_eq!(report.created, 3);
        assert_eq!(p.calls_for(Op::CreateAccount, "sa-002"), 2);
    }

    #[test]
    fn test_listing_error_waits_and_retries() {
        let p = MemoryProvider::new("demo");
        p.fail_next(Op::ListAccounts, None, ProviderError::Unavailable("down".into()));
        let sleeper = RecordingSleeper::new();
        let report = reconciler(&p, &sleeper, None).run(&desired(1)).unwrap();
        assert_eq!(sleeper.count(Duration::from_secs(10)), 1);
        assert_eq!(report.created, 1);
    }

    #[test]
    fn test_permission_denied_aborts() {
        let p = MemoryProvider::new("demo");
        p.fail_next(Op::ListAccounts, None, ProviderError::PermissionDenied("no".into()));
        let sleeper = RecordingSleeper::new();
        assert!(reconciler(&p, &sleeper, None).run(&desired(1)).is_err());
        assert_eq!(p.calls(Op::CreateAccount), 0);
    }

    #[test]
    fn test_max_rounds_reports_missing() {
        let p = MemoryProvider::new("demo");
        for _ in 0..5 {
            p.fail_next(Op::CreateAccount, Some("sa-001"), ProviderError::Other("boom".into()));
        }
        let sleeper = RecordingSleeper::new();
        let err = reconciler(&p, &sleeper, Some(2)).run(&desired(1)).unwrap_err();
        assert!(err.to_string().contains("sa-001"));
        assert_eq!(p.calls(Op::CreateAccount), 2);
    }
}
