use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use tracing::warn;

use boatdaddy_types::api::{Claims, Session};
use boatdaddy_types::models::Role;

use crate::auth::AppState;
use crate::error::ApiError;

/// The caller behind one request. Anonymous when no valid bearer was sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestSession(pub Option<Session>);

impl RequestSession {
    pub fn anonymous() -> Self {
        Self(None)
    }

    /// Reads `Authorization: Bearer <jwt>`. A bad or expired token is logged
    /// and treated like no token at all.
    pub fn from_headers(headers: &HeaderMap, secret: &str) -> Self {
        let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() else {
            return Self::anonymous();
        };

        match decode_token(bearer.token(), secret) {
            Ok(claims) => Self(Some(claims.into())),
            Err(e) => {
                warn!("Could not verify bearer token: {}", e);
                Self::anonymous()
            }
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        self.0.as_ref().map(|s| s.user_id)
    }

    pub fn is_authorized(&self) -> bool {
        self.user_id().is_some()
    }

    /// The signed-in session, or `UNAUTHENTICATED`.
    pub fn require(&self) -> Result<&Session, ApiError> {
        self.0.as_ref().ok_or_else(ApiError::unauthenticated)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.0.as_ref().is_some_and(|s| s.roles.contains(&role))
    }

    /// Signed in as `owner_id` itself, or as an admin.
    pub fn require_owner(&self, owner_id: i64) -> Result<&Session, ApiError> {
        let session = self.require()?;
        if session.user_id != owner_id && !session.roles.contains(&Role::Admin) {
            return Err(ApiError::forbidden());
        }
        Ok(session)
    }

    pub fn require_role(&self, role: Role) -> Result<&Session, ApiError> {
        let session = self.require()?;
        if !session.roles.contains(&role) {
            return Err(ApiError::forbidden());
        }
        Ok(session)
    }
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(data.claims)
}

impl FromRequestParts<AppState> for RequestSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers, &state.config.jwt_secret))
    }
}
