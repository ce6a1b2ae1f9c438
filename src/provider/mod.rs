//! Identity provider capability and its implementations.
//!
//! The batch logic only ever talks to [`IdentityProvider`]; the IAM REST
//! client and the in-memory fake both implement it.

use crate::error::ProviderError;
use crate::models::account::{Account, IssuedKey, KeyInfo};

pub mod auth;
pub mod iam;
pub mod memory;

/// The account and key operations consumed from the identity provider.
pub trait IdentityProvider {
    /// All service accounts of `project`.
    fn list_accounts(&self, project: &str) -> Result<Vec<Account>, ProviderError>;

    /// Create account `account_id` in `project`.
    fn create_account(&self, project: &str, account_id: &str) -> Result<Account, ProviderError>;

    /// User-managed keys of `account`. Provider-managed keys are never returned.
    fn list_user_keys(&self, project: &str, account: &Account)
        -> Result<Vec<KeyInfo>, ProviderError>;

    /// Issue a new credentials-file key for `account`, material already decoded.
    fn create_key(&self, project: &str, account: &Account) -> Result<IssuedKey, ProviderError>;

    /// Delete the key with resource name `key_name`.
    fn delete_key(&self, key_name: &str) -> Result<(), ProviderError>;
}
