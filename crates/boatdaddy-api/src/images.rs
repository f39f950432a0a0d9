use std::collections::BTreeMap;

use sha1::{Digest, Sha1};

use boatdaddy_types::models::ImageSignature;

use crate::error::ApiError;

/// Issues upload signatures for the media host. Holds only the API secret;
/// nothing is sent anywhere.
#[derive(Debug, Clone, Default)]
pub struct ImageSigner {
    api_secret: Option<String>,
}

impl ImageSigner {
    pub fn new(api_secret: Option<String>) -> Self {
        Self { api_secret }
    }

    pub fn sign_now(&self) -> Result<ImageSignature, ApiError> {
        self.sign_at(chrono::Utc::now().timestamp())
    }

    pub fn sign_at(&self, timestamp: i64) -> Result<ImageSignature, ApiError> {
        let secret = self
            .api_secret
            .as_deref()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("CLOUDINARY_SECRET is not configured")))?;

        let mut params = BTreeMap::new();
        params.insert("timestamp", timestamp.to_string());

        Ok(ImageSignature {
            signature: sign_params(&params, secret),
            timestamp,
        })
    }
}

/// Hex SHA-1 of `k1=v1&k2=v2...` (keys in order) followed by the secret.
pub fn sign_params(params: &BTreeMap<&str, String>, secret: &str) -> String {
    let serialized = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(serialized.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}
