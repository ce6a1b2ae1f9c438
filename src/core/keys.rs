//! Key manager: per-account key deletion and issuance.

use crate::core::audit_log::Journal;
use crate::core::output::OutputDir;
use crate::core::pacing::Sleeper;
use crate::error::ProviderError;
use crate::models::account::Account;
use crate::models::settings::RetrySection;
use crate::provider::IdentityProvider;
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// How a full key quota is treated when issuing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitPolicy {
    /// Discovery mode: warn and move on. Old keys are never deleted here, so a
    /// full quota is an expected state.
    Tolerate,
    /// Factory mode: keys were just cleared, so a full quota is a failure.
    Fail,
}

/// Terminal outcome of one issuance attempt. Failures are returned as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Key created and written to this file.
    Saved(PathBuf),
    /// The account already holds the maximum number of user-managed keys.
    LimitReached,
    /// The provider rejected the request as invalid; not retried.
    Rejected(String),
}

pub struct KeyManager<'a> {
    pub provider: &'a dyn IdentityProvider,
    pub project: &'a str,
    pub retry: &'a RetrySection,
    /// Pause after every single key deletion.
    pub delete_pause: Duration,
    pub sleeper: &'a dyn Sleeper,
    pub journal: Option<&'a Journal>,
}

impl KeyManager<'_> {
    /// Delete every user-managed key of `account`. Returns how many were deleted.
    ///
    /// The list-and-delete sequence is retried on transient errors with
    /// exponential backoff, up to `retry.delete_attempts` attempts. Any other
    /// error aborts at once.
    pub fn delete_user_keys(&self, account: &Account) -> Result<usize, ProviderError> {
        let attempts = self.retry.delete_attempts.max(1);
        let mut deleted = 0usize;
        let mut last_error = None;

        for attempt in 0..attempts {
            match self.delete_once(account, &mut deleted) {
                Ok(()) => return Ok(deleted),
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        account = %account,
                        attempt = attempt + 1,
                        attempts,
                        error = %e,
                        "transient error deleting keys"
                    );
                    if attempt + 1 < attempts {
                        self.sleeper.sleep(self.retry.backoff(attempt));
                    }
                    last_error = Some(e);
                }
                Err(e) => {
                    tracing::error!(account = %account, error = %e, "deleting keys failed");
                    return Err(e);
                }
            }
        }

        let err = last_error.unwrap_or_else(|| ProviderError::Other("no delete attempt made".into()));
        tracing::error!(account = %account, attempts, error = %err, "giving up deleting keys");
        Err(err)
    }

    fn delete_once(&self, account: &Account, deleted: &mut usize) -> Result<(), ProviderError> {
        let keys = self.provider.list_user_keys(self.project, account)?;
        for key in keys {
            let result = self.provider.delete_key(&key.name);
            if let Some(journal) = self.journal {
                journal.record("delete-key", account, Some(key.id()), result.as_ref().err());
            }
            result?;
            *deleted += 1;
            self.sleeper.sleep(self.delete_pause);
        }
        Ok(())
    }

    /// Issue one new key for `account` and write it to `<output>/<stem>.json`.
    pub fn create_and_save(
        &self,
        account: &Account,
        output: &OutputDir,
        stem: &str,
        policy: LimitPolicy,
    ) -> Result<KeyOutcome> {
        let key = match self.provider.create_key(self.project, account) {
            Ok(key) => key,
            Err(e) => {
                self.note("create-key", account, None, Some(&e));
                return creation_failure(account, e, policy);
            }
        };

        let key_id = key.name.rsplit('/').next().unwrap_or(&key.name).to_string();
        self.note("create-key", account, Some(&key_id), None);

        let saved = std::str::from_utf8(&key.private_key_data)
            .with_context(|| format!("key material for {} is not UTF-8", account))
            .and_then(|text| output.write_key(stem, text));
        match saved {
            Ok(path) => Ok(KeyOutcome::Saved(path)),
            Err(e) => {
                // A key whose material never reached disk is unusable.
                self.discard_key(account, &key.name, &key_id);
                Err(e)
            }
        }
    }

    /// Best-effort delete of a key that was created but could not be saved.
    fn discard_key(&self, account: &Account, key_name: &str, key_id: &str) {
        let result = self.provider.delete_key(key_name);
        self.note("delete-key", account, Some(key_id), result.as_ref().err());
        match result {
            Ok(()) => tracing::warn!(account = %account, key = key_id, "deleted key whose material could not be saved"),
            Err(e) => tracing::error!(
                account = %account,
                key = key_id,
                error = %e,
                "could not delete unsaved key, it remains on the provider"
            ),
        }
    }

    fn note(&self, action: &str, account: &Account, key: Option<&str>, error: Option<&ProviderError>) {
        if let Some(journal) = self.journal {
            journal.record(action, account, key, error);
        }
    }
}

/// Sort a failed create call into an expected outcome or a batch failure.
fn creation_failure(account: &Account, err: ProviderError, policy: LimitPolicy) -> Result<KeyOutcome> {
    match (err, policy) {
        (ProviderError::KeyLimitReached(_), LimitPolicy::Tolerate) => {
            tracing::warn!(account = %account, "key limit reached, no new key created");
            Ok(KeyOutcome::LimitReached)
        }
        (ProviderError::KeyLimitReached(detail), LimitPolicy::Fail) => Err(anyhow!(
            "key limit reached for {} right after clearing its keys: {}",
            account,
            detail
        )),
        (ProviderError::InvalidArgument(detail), LimitPolicy::Tolerate) => {
            tracing::warn!(account = %account, detail = %detail, "key request rejected");
            Ok(KeyOutcome::Rejected(detail))
        }
        (e, _) => Err(anyhow::Error::new(e)).with_context(|| format!("create key for {}", account)),
    }
}
