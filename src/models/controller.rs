//! Controller identity file (a service account key in credentials-file format).

use serde::Deserialize;
use std::fmt;
use zeroize::Zeroizing;

#[derive(Deserialize)]
pub struct ControllerCredential {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub private_key: Option<Zeroizing<String>>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<Zeroizing<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.map(Zeroizing::new))
}

impl fmt::Debug for ControllerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerCredential")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("token_uri", &self.token_uri)
            .finish()
    }
}
