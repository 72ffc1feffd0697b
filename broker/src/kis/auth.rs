//! Token issuance (`POST /oauth2/tokenP`).

use chrono::Utc;
use serde_json::json;

use super::client::KisClient;
use super::types::TokenResponse;
use crate::AuthClient;
use crate::error::BrokerError;
use crate::types::Credential;

const TOKEN_PATH: &str = "/oauth2/tokenP";

/// Authentication client issuing bearer tokens from the app key pair.
pub struct KisAuth {
    client: KisClient,
}

impl KisAuth {
    pub fn new(client: KisClient) -> Self {
        Self { client }
    }
}

impl AuthClient for KisAuth {
    fn request_credential(&self) -> Result<Credential, BrokerError> {
        let body = json!({
            "grant_type": "client_credentials",
            "appkey": self.client.app_key(),
            "appsecret": self.client.app_secret(),
        });
        let (status, text) = self
            .client
            .post_plain(TOKEN_PATH, &body)
            .map_err(|e| BrokerError::Auth(e.to_string()))?;
        let parsed: TokenResponse = serde_json::from_str(&text).map_err(|e| {
            BrokerError::Auth(format!("HTTP {status}: unreadable token response: {e}"))
        })?;
        parsed.into_credential(Utc::now())
    }
}
