//! Run settings, loaded from `keyfleet.toml` when present.

use crate::constants;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub pacing: PacingSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub provider: ProviderSection,
}

/// Sleep-based rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingSection {
    /// Items processed between two cooldowns.
    pub window: usize,
    pub key_cooldown_secs: u64,
    pub account_cooldown_secs: u64,
    pub retry_delay_secs: u64,
    pub settle_delay_secs: u64,
    pub reconcile_error_delay_secs: u64,
    pub account_visibility_pause_ms: u64,
    pub delete_pause_ms: u64,
}

impl Default for PacingSection {
    fn default() -> Self {
        Self {
            window: constants::COOLDOWN_WINDOW,
            key_cooldown_secs: constants::KEY_COOLDOWN_SECS,
            account_cooldown_secs: constants::ACCOUNT_COOLDOWN_SECS,
            retry_delay_secs: constants::RETRY_DELAY_SECS,
            settle_delay_secs: constants::SETTLE_DELAY_SECS,
            reconcile_error_delay_secs: constants::RECONCILE_ERROR_DELAY_SECS,
            account_visibility_pause_ms: constants::ACCOUNT_VISIBILITY_PAUSE_MS,
            delete_pause_ms: constants::DELETE_PAUSE_MS,
        }
    }
}

impl PacingSection {
    pub fn key_cooldown(&self) -> Duration {
        Duration::from_secs(self.key_cooldown_secs)
    }

    pub fn account_cooldown(&self) -> Duration {
        Duration::from_secs(self.account_cooldown_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn reconcile_error_delay(&self) -> Duration {
        Duration::from_secs(self.reconcile_error_delay_secs)
    }

    pub fn account_visibility_pause(&self) -> Duration {
        Duration::from_millis(self.account_visibility_pause_ms)
    }

    pub fn delete_pause(&self) -> Duration {
        Duration::from_millis(self.delete_pause_ms)
    }
}

/// Retry limits. `None` caps mean "retry until done".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub delete_attempts: u32,
    pub backoff_factor: f64,
    pub max_passes: Option<u32>,
    pub max_reconcile_rounds: Option<u32>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            delete_attempts: constants::DELETE_ATTEMPTS,
            backoff_factor: constants::BACKOFF_FACTOR,
            max_passes: None,
            max_reconcile_rounds: None,
        }
    }
}

impl RetrySection {
    /// Sleep before the attempt following failed attempt `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let cap = Duration::from_secs(constants::MAX_BACKOFF_SECS);
        let secs = self.backoff_factor.powi(attempt as i32);
        Duration::try_from_secs_f64(secs.max(0.0))
            .unwrap_or(cap)
            .min(cap)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub endpoint: String,
    pub account_domain: String,
    pub timeout_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            endpoint: constants::DEFAULT_IAM_ENDPOINT.to_string(),
            account_domain: constants::ACCOUNT_DOMAIN.to_string(),
            timeout_secs: constants::HTTP_TIMEOUT_SECS,
        }
    }
}
