use async_graphql::ErrorExtensions;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use boatdaddy_types::api::LoginResponse;
use boatdaddy_types::validation::ValidationError;

/// Every failure an API operation can surface. The transport decides how to
/// present each kind: a GraphQL `extensions.code`, or an HTTP status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadUserInput(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn unauthenticated() -> Self {
        Self::Unauthenticated("Must be signed in".into())
    }

    pub fn forbidden() -> Self {
        Self::Forbidden("Not authorized to perform this action".into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadUserInput(_) => "BAD_USER_INPUT",
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadUserInput(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn log_internal(&self) {
        if let Self::Internal(e) = self {
            error!("Internal error: {:#}", e);
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::BadUserInput(e.to_string())
    }
}

impl ErrorExtensions for ApiError {
    fn extend(&self) -> async_graphql::Error {
        self.log_internal();
        let code = self.code();
        async_graphql::Error::new(self.to_string()).extend_with(|_, e| e.set("code", code))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log_internal();
        let body = Json(LoginResponse {
            credentials: None,
            error: Some(self.to_string()),
        });

        (self.status(), body).into_response()
    }
}

/// Converts a service result into a GraphQL result, keeping the error kind.
pub(crate) fn gql<T>(result: Result<T, ApiError>) -> async_graphql::Result<T> {
    result.map_err(|e| e.extend())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_codes_and_statuses() {
        let input = ApiError::from(ValidationError::UsernameStart);
        assert_eq!(input.code(), "BAD_USER_INPUT");
        assert_eq!(input.status(), StatusCode::BAD_REQUEST);
        assert_eq!(input.to_string(), "Username must begin with a letter");

        assert_eq!(ApiError::unauthenticated().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden().code(), "FORBIDDEN");
    }

    #[test]
    fn internal_details_stay_private() {
        let err = ApiError::from(anyhow::anyhow!("disk I/O error at /var/lib/boatdaddy.db"));
        assert_eq!(err.to_string(), "Internal server error");

        let gql_err = err.extend();
        assert_eq!(gql_err.message, "Internal server error");
        let code = gql_err.extensions.unwrap().get("code").cloned();
        assert_eq!(code, Some(async_graphql::Value::from("INTERNAL_SERVER_ERROR")));
    }
}
