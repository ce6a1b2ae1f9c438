//! Centralized constants for pacing, retries, paths, and provider endpoints.

/// Items processed between two cooldown pauses.
pub const COOLDOWN_WINDOW: usize = 4;

/// Cooldown after every window of key creations or deletions (seconds).
pub const KEY_COOLDOWN_SECS: u64 = 10;

/// Cooldown after every window of account creations (seconds).
pub const ACCOUNT_COOLDOWN_SECS: u64 = 20;

/// Delay before reprocessing a queue of failed items (seconds).
pub const RETRY_DELAY_SECS: u64 = 10;

/// Wait after a reconcile round before re-querying the directory (seconds).
pub const SETTLE_DELAY_SECS: u64 = 5;

/// Wait after an unexpected reconcile error (seconds).
pub const RECONCILE_ERROR_DELAY_SECS: u64 = 10;

/// Pause after each account creation so the account becomes visible (millis).
pub const ACCOUNT_VISIBILITY_PAUSE_MS: u64 = 500;

/// Pause after each key deletion (millis).
pub const DELETE_PAUSE_MS: u64 = 100;

/// Attempts for one list-and-delete sequence.
pub const DELETE_ATTEMPTS: u32 = 3;

/// Base of the exponential backoff between delete attempts (seconds).
pub const BACKOFF_FACTOR: f64 = 2.0;
/// Upper bound for a single backoff sleep.
pub const MAX_BACKOFF_SECS: u64 = 300;

/// Provider cap on simultaneously active user-managed keys per account.
pub const MAX_USER_KEYS: usize = 10;

/// Width of the zero-padded index in factory account names.
pub const FACTORY_INDEX_WIDTH: usize = 3;

/// Default IAM REST endpoint.
pub const DEFAULT_IAM_ENDPOINT: &str = "https://iam.googleapis.com/v1";

/// Default OAuth2 token endpoint (used when the credential file has none).
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// OAuth scope requested for the controller identity.
pub const OAUTH_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Domain suffix of service account addresses.
pub const ACCOUNT_DOMAIN: &str = "iam.gserviceaccount.com";

/// Credential format requested for new keys.
pub const PRIVATE_KEY_TYPE: &str = "TYPE_GOOGLE_CREDENTIALS_FILE";

/// HTTP request timeout (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 60;

/// Page size for account listing.
pub const LIST_PAGE_SIZE: u32 = 100;

/// Lifetime requested for the signed JWT assertion (seconds).
pub const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Access tokens are refreshed this long before their expiry (seconds).
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Controller credential file looked up in the workspace root.
pub const CONTROLLER_FILE: &str = "credentials.json";

/// Directory searched for `*.json` controller credentials.
pub const CONTROLLER_DIR: &str = "controller";

/// Directory that receives the issued key files.
pub const OUTPUT_DIR: &str = "accounts";

/// Optional settings file in the workspace root.
pub const SETTINGS_FILE: &str = "keyfleet.toml";

/// Permission mode for the output directory.
pub const OUTPUT_DIR_MODE: u32 = 0o700;

/// Permission mode for issued key files.
pub const KEY_FILE_MODE: u32 = 0o600;

/// Permission mode for the audit log.
pub const AUDIT_LOG_MODE: u32 = 0o640;

/// File extension of issued key files.
pub const KEY_FILE_EXTENSION: &str = ".json";
