use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ApiError;

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Claims Google reports for a valid ID token. `email_verified` arrives as
/// the string `"true"` from tokeninfo.
#[derive(Debug, Deserialize)]
pub struct TokenInfo {
    pub aud: String,
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: serde_json::Value,
}

pub struct GoogleVerifier {
    client: reqwest::Client,
    client_id: Option<String>,
}

impl GoogleVerifier {
    pub fn new(client_id: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { client, client_id })
    }

    /// Verifies a Google ID token and returns its verified email.
    pub async fn verify(&self, id_token: &str) -> Result<String, ApiError> {
        let client_id = self.client_id.as_deref().ok_or_else(|| {
            ApiError::Internal(anyhow::anyhow!("GOOGLE_CLIENT_ID is not configured"))
        })?;

        let response = self
            .client
            .get(TOKENINFO_URL)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("tokeninfo request failed: {}", e)))?;

        if !response.status().is_success() {
            warn!("Google rejected ID token: {}", response.status());
            return Err(ApiError::Unauthenticated("Invalid Google token".into()));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("tokeninfo body unreadable: {}", e)))?;
        debug!("Google token issued for audience {}", info.aud);

        check_token_info(&info, client_id)
    }
}

pub fn check_token_info(info: &TokenInfo, client_id: &str) -> Result<String, ApiError> {
    if info.aud != client_id {
        warn!("Google token audience mismatch: {}", info.aud);
        return Err(ApiError::Unauthenticated("Invalid Google token".into()));
    }

    let verified = matches!(&info.email_verified, serde_json::Value::Bool(true))
        || info.email_verified.as_str() == Some("true");

    match &info.email {
        Some(email) if verified => Ok(email.clone()),
        _ => Err(ApiError::Unauthenticated("Google account email is not verified".into())),
    }
}
