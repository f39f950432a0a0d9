use std::path::PathBuf;

use axum::http::HeaderValue;
use thiserror::Error;
use tracing::warn;

/// Signing secret used outside production when `JWT_SECRET` is unset.
pub const DEV_JWT_SECRET: &str = "__tempjwtsecretfordevonly__";

/// Placeholder JWT secrets that MUST NOT be used in production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    DEV_JWT_SECRET,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Default)]
pub struct CloudinaryConfig {
    pub api_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub cors_origin: HeaderValue,
    pub api_url: String,
    pub cloudinary: CloudinaryConfig,
    pub google_client_id: Option<String>,
    pub seed_on_start: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    Missing(&'static str),
    #[error("{0} is still a placeholder; set a random value")]
    Placeholder(&'static str),
    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = match get("BOATDADDY_ENV").as_deref() {
            None | Some("development") | Some("dev") | Some("test") => Environment::Development,
            Some("production") | Some("prod") => Environment::Production,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "BOATDADDY_ENV",
                    value: other.to_string(),
                });
            }
        };

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => {
                if environment == Environment::Production
                    && PLACEHOLDER_SECRETS.contains(&secret.as_str())
                {
                    return Err(ConfigError::Placeholder("JWT_SECRET"));
                }
                secret
            }
            None if environment == Environment::Production => {
                return Err(ConfigError::Missing("JWT_SECRET"));
            }
            None => {
                warn!("Missing env var JWT_SECRET. Using unsafe secret for dev env.");
                DEV_JWT_SECRET.to_string()
            }
        };

        let port = match get("BOATDADDY_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                key: "BOATDADDY_PORT",
                value: raw.clone(),
            })?,
            None => 3000,
        };

        let origin = get("BOATDADDY_CORS_ORIGIN")
            .unwrap_or_else(|| "https://studio.apollographql.com".into());
        let cors_origin = HeaderValue::from_str(&origin).map_err(|_| ConfigError::Invalid {
            key: "BOATDADDY_CORS_ORIGIN",
            value: origin.clone(),
        })?;

        let seed_on_start = match get("BOATDADDY_SEED").as_deref() {
            None | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "BOATDADDY_SEED",
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            environment,
            host: get("BOATDADDY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: get("BOATDADDY_DB_PATH")
                .unwrap_or_else(|| "boatdaddy.db".into())
                .into(),
            jwt_secret,
            cors_origin,
            api_url: get("BOATDADDY_API_URL")
                .unwrap_or_else(|| "http://localhost:3000/api/graphql".into()),
            cloudinary: CloudinaryConfig {
                api_secret: get("CLOUDINARY_SECRET"),
            },
            google_client_id: get("GOOGLE_CLIENT_ID"),
            seed_on_start,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "JWT_SECRET" => Some("test-secret".into()),
        "CLOUDINARY_SECRET" => Some("abcd".into()),
        _ => None,
    })
    .unwrap()
}
