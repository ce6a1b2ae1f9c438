//! OAuth2 access tokens for a service account (JWT bearer grant, RS256).

use crate::constants;
use crate::error::ProviderError;
use crate::models::controller::ControllerCredential;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use zeroize::Zeroizing;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

struct CachedToken {
    value: Zeroizing<String>,
    expires_at: DateTime<Utc>,
}

/// Mints and caches access tokens for the controller identity.
pub struct TokenSource {
    client_email: String,
    private_key_id: Option<String>,
    signing_key: SigningKey<Sha256>,
    token_uri: String,
    scope: String,
    http: reqwest::blocking::Client,
    cached: RefCell<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(
        cred: &ControllerCredential,
        http: reqwest::blocking::Client,
    ) -> Result<Self, ProviderError> {
        let client_email = cred
            .client_email
            .clone()
            .ok_or_else(|| ProviderError::Auth("credential file has no client_email".into()))?;
        let pem = cred
            .private_key
            .as_ref()
            .ok_or_else(|| ProviderError::Auth("credential file has no private_key".into()))?;
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| ProviderError::Auth(format!("invalid private_key: {}", e)))?;
        Ok(Self {
            client_email,
            private_key_id: cred.private_key_id.clone(),
            signing_key: SigningKey::<Sha256>::new(key),
            token_uri: cred
                .token_uri
                .clone()
                .unwrap_or_else(|| constants::DEFAULT_TOKEN_URI.to_string()),
            scope: constants::OAUTH_SCOPE.to_string(),
            http,
            cached: RefCell::new(None),
        })
    }

    /// A valid access token, fetching a new one when the cached token is near expiry.
    pub fn token(&self) -> Result<Zeroizing<String>, ProviderError> {
        let now = Utc::now();
        if let Some(cached) = self.cached.borrow().as_ref() {
            if cached.expires_at - Duration::seconds(constants::TOKEN_REFRESH_MARGIN_SECS) > now {
                return Ok(cached.value.clone());
            }
        }

        let assertion = self.assertion(now)?;
        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .map_err(|e| ProviderError::Auth(format!("token request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::Auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }
        let token: TokenResponse = response
            .json()
            .map_err(|e| ProviderError::Auth(format!("parse token response: {}", e)))?;

        let lifetime = token.expires_in.unwrap_or(constants::ASSERTION_LIFETIME_SECS);
        let value = Zeroizing::new(token.access_token);
        *self.cached.borrow_mut() = Some(CachedToken {
            value: value.clone(),
            expires_at: now + Duration::seconds(lifetime),
        });
        tracing::debug!(client = %self.client_email, lifetime, "obtained access token");
        Ok(value)
    }

    /// Signed JWT assertion presented to the token endpoint.
    fn assertion(&self, now: DateTime<Utc>) -> Result<String, ProviderError> {
        let mut header = serde_json::json!({ "alg": "RS256", "typ": "JWT" });
        if let Some(kid) = &self.private_key_id {
            header["kid"] = serde_json::Value::String(kid.clone());
        }
        let claims = Claims {
            iss: self.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.token_uri.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + constants::ASSERTION_LIFETIME_SECS,
        };
        let header = serde_json::to_vec(&header)
            .map_err(|e| ProviderError::Auth(format!("encode JWT header: {}", e)))?;
        let claims = serde_json::to_vec(&claims)
            .map_err(|e| ProviderError::Auth(format!("encode JWT claims: {}", e)))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims)
        );
        let signature = self.signing_key.sign(signing_input.as_bytes());
        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};

    fn test_credential() -> ControllerCredential {
        let mut rng = rsa::rand_core::OsRng;
        let key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        ControllerCredential {
            project_id: Some("demo".into()),
            client_email: Some("controller@demo.iam.gserviceaccount.com".into()),
            private_key_id: Some("kid-1".into()),
            private_key: Some(Zeroizing::new(pem.to_string())),
            token_uri: None,
        }
    }

    #[test]
    fn test_assertion_structure() {
        let source = TokenSource::new(&test_credential(), reqwest::blocking::Client::new()).unwrap();
        let now = Utc::now();
        let jwt = source.assertion(now).unwrap();
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);

        let header: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[0]).unwrap()).unwrap();
        assert_eq!(header["alg"], "RS256");
        assert_eq!(header["kid"], "kid-1");

        let claims: Claims =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        assert_eq!(claims.iss, "controller@demo.iam.gserviceaccount.com");
        assert_eq!(claims.aud, constants::DEFAULT_TOKEN_URI);
        assert_eq!(claims.scope, constants::OAUTH_SCOPE);
        assert_eq!(claims.exp - claims.iat, constants::ASSERTION_LIFETIME_SECS);

        // 1024-bit key -> 128-byte signature
        assert_eq!(URL_SAFE_NO_PAD.decode(parts[2]).unwrap().len(), 128);
    }

    #[test]
    fn test_missing_private_key_rejected() {
        let mut cred = test_credential();
        cred.private_key = None;
        let err = TokenSource::new(&cred, reqwest::blocking::Client::new())
            .err()
            .unwrap();
        assert!(matches!(err, ProviderError::Auth(_)));
    }

    #[test]
    fn test_garbage_private_key_rejected() {
        let mut cred = test_credential();
        cred.private_key = Some(Zeroizing::new("not a pem".into()));
        assert!(TokenSource::new(&cred, reqwest::blocking::Client::new()).is_err());
    }
}
