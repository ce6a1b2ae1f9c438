//! In-memory identity provider with scripted failures.
//!
//! Deterministic stand-in for the IAM API used by the tests. Failures are
//! queued per operation and optional account and are consumed in order, so
//! "fail once, then succeed" scenarios are easy to set up.

use crate::constants;
use crate::error::ProviderError;
use crate::models::account::{Account, IssuedKey, KeyInfo, KeyType};
use crate::provider::IdentityProvider;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use zeroize::Zeroizing;

/// Operation selector for scripted failures and call counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    ListAccounts,
    CreateAccount,
    ListKeys,
    CreateKey,
    DeleteKey,
}

#[derive(Debug, Default)]
struct AccountRecord {
    keys: Vec<KeyInfo>,
}

struct ScriptedFailure {
    op: Op,
    /// Short account name the failure applies to; `None` matches any.
    account: Option<String>,
    error: ProviderError,
}

#[derive(Default)]
struct State {
    accounts: BTreeMap<String, AccountRecord>,
    failures: VecDeque<ScriptedFailure>,
    calls: Vec<(Op, String)>,
    next_key_id: u64,
}

pub struct MemoryProvider {
    project: String,
    domain: String,
    state: Mutex<State>,
}

impl MemoryProvider {
    pub fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            domain: constants::ACCOUNT_DOMAIN.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed an account with `user_keys` user-managed and `system_keys` system-managed keys.
    pub fn with_account(self, name: &str, user_keys: usize, system_keys: usize) -> Self {
        {
            let mut state = self.lock();
            let email = self.email(name);
            let mut record = AccountRecord::default();
            for _ in 0..user_keys {
                let key = next_key(&mut state, &email, &self.project, KeyType::UserManaged);
                record.keys.push(key);
            }
            for _ in 0..system_keys {
                let key = next_key(&mut state, &email, &self.project, KeyType::SystemManaged);
                record.keys.push(key);
            }
            state.accounts.insert(email, record);
        }
        self
    }

    /// Queue a failure for the next matching call.
    pub fn fail_next(&self, op: Op, account: Option<&str>, error: ProviderError) {
        self.lock().failures.push_back(ScriptedFailure {
            op,
            account: account.map(str::to_string),
            error,
        });
    }

    /// Number of calls made for `op`.
    pub fn calls(&self, op: Op) -> usize {
        self.lock().calls.iter().filter(|(o, _)| *o == op).count()
    }

    /// Number of calls made for `op` against account `name`.
    pub fn calls_for(&self, op: Op, name: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|(o, n)| *o == op && n == name)
            .count()
    }

    /// All keys (both types) currently held by account `name`.
    pub fn keys_of(&self, name: &str) -> Vec<KeyInfo> {
        let email = self.email(name);
        self.lock()
            .accounts
            .get(&email)
            .map(|r| r.keys.clone())
            .unwrap_or_default()
    }

    /// Short names of all accounts, sorted.
    pub fn account_names(&self) -> Vec<String> {
        self.lock()
            .accounts
            .keys()
            .map(|e| Account::from_email(e.as_str()).name)
            .collect()
    }

    fn email(&self, name: &str) -> String {
        Account::derived(name, &self.project, &self.domain).email
    }

    /// Record the call and pop a scripted failure if one matches.
    fn enter(&self, state: &mut State, op: Op, name: &str) -> Result<(), ProviderError> {
        state.calls.push((op, name.to_string()));
        let hit = state.failures.iter().position(|f| {
            f.op == op && f.account.as_deref().map_or(true, |a| a == name)
        });
        match hit.and_then(|i| state.failures.remove(i)) {
            Some(failure) => Err(failure.error),
            None => Ok(()),
        }
    }
}

fn next_key(state: &mut State, email: &str, project: &str, key_type: KeyType) -> KeyInfo {
    state.next_key_id += 1;
    KeyInfo {
        name: format!(
            "projects/{}/serviceAccounts/{}/keys/{:016x}",
            project, email, state.next_key_id
        ),
        key_type,
    }
}

impl IdentityProvider for MemoryProvider {
    fn list_accounts(&self, project: &str) -> Result<Vec<Account>, ProviderError> {
        let mut state = self.lock();
        self.enter(&mut state, Op::ListAccounts, project)?;
        Ok(state
            .accounts
            .keys()
            .map(|e| Account::from_email(e.as_str()))
            .collect())
    }

    fn create_account(&self, _project: &str, account_id: &str) -> Result<Account, ProviderError> {
        let mut state = self.lock();
        self.enter(&mut state, Op::CreateAccount, account_id)?;
        let email = self.email(account_id);
        if state.accounts.contains_key(&email) {
            return Err(ProviderError::AlreadyExists(email));
        }
        state.accounts.insert(email.clone(), AccountRecord::default());
        Ok(Account::from_email(email))
    }

    fn list_user_keys(
        &self,
        _project: &str,
        account: &Account,
    ) -> Result<Vec<KeyInfo>, ProviderError> {
        let mut state = self.lock();
        self.enter(&mut state, Op::ListKeys, &account.name)?;
        let record = state
            .accounts
            .get(&account.email)
            .ok_or_else(|| ProviderError::NotFound(account.email.clone()))?;
        Ok(record
            .keys
            .iter()
            .filter(|k| k.key_type == KeyType::UserManaged)
            .cloned()
            .collect())
    }

    fn create_key(&self, project: &str, account: &Account) -> Result<IssuedKey, ProviderError> {
        let mut state = self.lock();
        self.enter(&mut state, Op::CreateKey, &account.name)?;
        let user_keys = state
            .accounts
            .get(&account.email)
            .ok_or_else(|| ProviderError::NotFound(account.email.clone()))?
            .keys
            .iter()
            .filter(|k| k.key_type == KeyType::UserManaged)
            .count();
        if user_keys >= constants::MAX_USER_KEYS {
            return Err(ProviderError::KeyLimitReached(format!(
                "Precondition check failed: key limit reached for {}",
                account.email
            )));
        }

        let key = next_key(&mut state, &account.email, project, KeyType::UserManaged);
        let material = serde_json::json!({
            "type": "service_account",
            "project_id": project,
            "private_key_id": key.id(),
            "client_email": account.email,
        });
        let name = key.name.clone();
        if let Some(record) = state.accounts.get_mut(&account.email) {
            record.keys.push(key);
        }
        Ok(IssuedKey {
            name,
            private_key_data: Zeroizing::new(material.to_string().into_bytes()),
        })
    }

    fn delete_key(&self, key_name: &str) -> Result<(), ProviderError> {
        let mut state = self.lock();
        let owner = key_name
            .split("/serviceAccounts/")
            .nth(1)
            .and_then(|rest| rest.split('/').next())
            .map(str::to_string)
            .unwrap_or_default();
        self.enter(&mut state, Op::DeleteKey, &Account::from_email(owner.as_str()).name)?;
        let record = state
            .accounts
            .get_mut(&owner)
            .ok_or_else(|| ProviderError::NotFound(key_name.to_string()))?;
        let before = record.keys.len();
        record.keys.retain(|k| k.name != key_name);
        if record.keys.len() == before {
            return Err(ProviderError::NotFound(key_name.to_string()));
        }
        Ok(())
    }
}
