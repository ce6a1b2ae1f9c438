//! Blocking client for the IAM v1 REST API.

use crate::constants;
use crate::error::ProviderError;
use crate::models::account::{Account, IssuedKey, KeyInfo, KeyType};
use crate::models::controller::ControllerCredential;
use crate::models::settings::ProviderSection;
use crate::provider::auth::TokenSource;
use crate::provider::IdentityProvider;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use zeroize::Zeroizing;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListAccountsResponse {
    #[serde(default)]
    accounts: Vec<AccountResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct AccountResource {
    email: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateAccountRequest<'a> {
    account_id: &'a str,
    service_account: AccountBody<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountBody<'a> {
    display_name: &'a str,
}

#[derive(Deserialize)]
struct ListKeysResponse {
    #[serde(default)]
    keys: Vec<KeyResource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyResource {
    name: String,
    #[serde(default)]
    key_type: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateKeyRequest<'a> {
    private_key_type: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedKeyResource {
    name: String,
    private_key_data: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// [`IdentityProvider`] backed by `iam.googleapis.com`.
pub struct IamClient {
    http: Client,
    endpoint: String,
    tokens: TokenSource,
}

impl IamClient {
    pub fn new(cred: &ControllerCredential, section: &ProviderSection) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(section.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Other(format!("build HTTP client: {}", e)))?;
        let tokens = TokenSource::new(cred, http.clone())?;
        Ok(Self {
            http,
            endpoint: section.endpoint.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    fn send(&self, request: RequestBuilder) -> Result<reqwest::blocking::Response, ProviderError> {
        let token = self.tokens.token()?;
        let response = request
            .bearer_auth(token.as_str())
            .send()
            .map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(api_error(status.as_u16(), &body))
    }

    fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        self.send(request)?
            .json()
            .map_err(|e| ProviderError::Other(format!("decode response: {}", e)))
    }
}

impl IdentityProvider for IamClient {
    fn list_accounts(&self, project: &str) -> Result<Vec<Account>, ProviderError> {
        let url = self.url(&format!("projects/{}/serviceAccounts", project));
        let mut accounts = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(&url)
                .query(&[("pageSize", constants::LIST_PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let page: ListAccountsResponse = self.send_json(request)?;
            accounts.extend(page.accounts.into_iter().map(|a| Account::from_email(a.email)));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        tracing::debug!(project, count = accounts.len(), "listed service accounts");
        Ok(accounts)
    }

    fn create_account(&self, project: &str, account_id: &str) -> Result<Account, ProviderError> {
        let body = CreateAccountRequest {
            account_id,
            service_account: AccountBody {
                display_name: account_id,
            },
        };
        let request = self
            .http
            .post(self.url(&format!("projects/{}/serviceAccounts", project)))
            .json(&body);
        let created: AccountResource = self.send_json(request)?;
        Ok(Account::from_email(created.email))
    }

    fn list_user_keys(
        &self,
        project: &str,
        account: &Account,
    ) -> Result<Vec<KeyInfo>, ProviderError> {
        let request = self
            .http
            .get(self.url(&format!("{}/keys", account.resource_name(project))))
            .query(&[("keyTypes", "USER_MANAGED")]);
        let listed: ListKeysResponse = self.send_json(request)?;
        Ok(listed
            .keys
            .into_iter()
            .map(|k| KeyInfo {
                key_type: match k.key_type.as_deref() {
                    Some("SYSTEM_MANAGED") => KeyType::SystemManaged,
                    _ => KeyType::UserManaged,
                },
                name: k.name,
            })
            .filter(|k| k.key_type == KeyType::UserManaged)
            .collect())
    }

    fn create_key(&self, project: &str, account: &Account) -> Result<IssuedKey, ProviderError> {
        let request = self
            .http
            .post(self.url(&format!("{}/keys", account.resource_name(project))))
            .json(&CreateKeyRequest {
                private_key_type: constants::PRIVATE_KEY_TYPE,
            });
        let created: CreatedKeyResource = self.send_json(request)?;
        let encoded = Zeroizing::new(created.private_key_data);
        let decoded = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| ProviderError::Other(format!("decode privateKeyData: {}", e)))?;
        Ok(IssuedKey {
            name: created.name,
            private_key_data: Zeroizing::new(decoded),
        })
    }

    fn delete_key(&self, key_name: &str) -> Result<(), ProviderError> {
        self.send(self.http.delete(self.url(key_name)))?;
        Ok(())
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::DeadlineExceeded(e.to_string())
    } else if e.is_connect() {
        ProviderError::Unavailable(e.to_string())
    } else {
        ProviderError::Retryable(e.to_string())
    }
}

/// Map a non-success response to the provider error taxonomy.
fn api_error(http_status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => ProviderError::from_api(
            http_status,
            envelope.error.status.as_deref(),
            &envelope.error.message,
        ),
        Err(_) => ProviderError::from_api(http_status, None, body.trim()),
    }
}
