//! Service accounts and their keys.

use crate::constants;
use std::fmt;
use zeroize::Zeroizing;

/// A service account as seen in the provider's directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Account {
    /// Short name (account id), the part of the address before `@`.
    pub name: String,
    /// Full address, `name@project.domain`.
    pub email: String,
}

impl Account {
    /// Build an account from its address. The short name is everything before `@`.
    pub fn from_email(email: impl Into<String>) -> Self {
        let email = email.into();
        let name = email.split('@').next().unwrap_or_default().to_string();
        Self { name, email }
    }

    /// Derive the address of account `name` inside `project`.
    pub fn derived(name: &str, project: &str, domain: &str) -> Self {
        Self {
            name: name.to_string(),
            email: format!("{}@{}.{}", name, project, domain),
        }
    }

    /// Provider resource name of this account.
    pub fn resource_name(&self, project: &str) -> String {
        format!("projects/{}/serviceAccounts/{}", project, self.email)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.email)
    }
}

/// Ownership class of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    UserManaged,
    SystemManaged,
}

/// An existing key, as returned by a key listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Provider resource name, `.../serviceAccounts/<email>/keys/<id>`.
    pub name: String,
    pub key_type: KeyType,
}

impl KeyInfo {
    /// Trailing key id of the resource name.
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// A freshly issued key together with its decoded credential material.
pub struct IssuedKey {
    pub name: String,
    pub private_key_data: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for IssuedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedKey")
            .field("name", &self.name)
            .field("private_key_data", &"<redacted>")
            .finish()
    }
}

/// Account name for factory index `number`, e.g. `sa-007`.
pub fn factory_name(prefix: &str, number: u32) -> String {
    format!(
        "{}-{:0width$}",
        prefix,
        number,
        width = constants::FACTORY_INDEX_WIDTH
    )
}

/// Inverse of [`factory_name`]: the index encoded in `name`, if it belongs to `prefix`.
pub fn factory_index(prefix: &str, name: &str) -> Option<u32> {
    let digits = name.strip_prefix(prefix)?.strip_prefix('-')?;
    if digits.len() < constants::FACTORY_INDEX_WIDTH || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_email_splits_short_name() {
        let acc = Account::from_email("sa-001@demo.iam.gserviceaccount.com");
        assert_eq!(acc.name, "sa-001");
        assert_eq!(acc.email, "sa-001@demo.iam.gserviceaccount.com");
    }

    #[test]
    fn test_derived_address() {
        let acc = Account::derived("runner", "proj-1", constants::ACCOUNT_DOMAIN);
        assert_eq!(acc.email, "runner@proj-1.iam.gserviceaccount.com");
        assert_eq!(
            acc.resource_name("proj-1"),
            "projects/proj-1/serviceAccounts/runner@proj-1.iam.gserviceaccount.com"
        );
    }

    #[test]
    fn test_factory_name_padding() {
        assert_eq!(factory_name("sa", 1), "sa-001");
        assert_eq!(factory_name("sa", 42), "sa-042");
        assert_eq!(factory_name("sa", 1234), "sa-1234");
    }

    #[test]
    fn test_factory_index() {
        assert_eq!(factory_index("sa", "sa-007"), Some(7));
        assert_eq!(factory_index("sa", "sa-1234"), Some(1234));
        assert_eq!(factory_index("sa", "sa-07"), None);
        assert_eq!(factory_index("sa", "sb-007"), None);
        assert_eq!(factory_index("sa", "sa-00x"), None);
    }

    #[test]
    fn test_key_id() {
        let key = KeyInfo {
            name: "projects/p/serviceAccounts/a@p.iam.gserviceaccount.com/keys/abc123".into(),
            key_type: KeyType::UserManaged,
        };
        assert_eq!(key.id(), "abc123");
    }

    #[test]
    fn test_issued_key_debug_redacts() {
        let key = IssuedKey {
            name: "k".into(),
            private_key_data: Zeroizing::new(b"secret".to_vec()),
        };
        assert!(!format!("{:?}", key).contains("secret"));
    }
}
