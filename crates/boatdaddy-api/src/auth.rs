use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};

use boatdaddy_db::Database;
use boatdaddy_types::api::{Claims, LoginCredentials, LoginRequest, LoginResponse};
use boatdaddy_types::models::{Provider, User};

use crate::config::Config;
use crate::error::ApiError;
use crate::google::GoogleVerifier;
use crate::images::ImageSigner;
use crate::run_blocking;
use crate::schema::{BoatSchema, build_schema};
use crate::users;

const TOKEN_TTL_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub config: Config,
    pub schema: BoatSchema,
    pub google: GoogleVerifier,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, config: Config) -> anyhow::Result<AppState> {
        let signer = ImageSigner::new(config.cloudinary.api_secret.clone());
        let schema = build_schema(db.clone(), signer);
        let google = GoogleVerifier::new(config.google_client_id.clone())?;

        Ok(Arc::new(Self {
            db,
            config,
            schema,
            google,
        }))
    }
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadUserInput(e.body_text()))?;

    let provider = req.provider;
    let user = match provider {
        Provider::Test => test_login(&state, req).await?,
        Provider::Google => {
            let email = state.google.verify(&req.token).await?;
            find_by_email(&state.db, email).await?
        }
    };

    let jwt = create_token(&state.config.jwt_secret, provider, &user)?;
    info!("User {} signed in with {:?}", user.id, provider);

    Ok(Json(LoginResponse {
        credentials: Some(LoginCredentials {
            email: user.email.clone(),
            jwt,
            name: user.display_name().to_string(),
            provider,
        }),
        error: None,
    }))
}

pub fn create_token(secret: &str, provider: Provider, user: &User) -> Result<String, ApiError> {
    let now = chrono::Utc::now();
    let claims = Claims {
        provider,
        user_id: user.id,
        username: user.username.clone(),
        roles: user.roles.clone(),
        iat: now.timestamp() as usize,
        exp: (now + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(e.into()))
}

/// Email (and password, when the account has one) sign-in for local use.
async fn test_login(state: &AppState, req: LoginRequest) -> Result<User, ApiError> {
    if state.config.is_production() {
        warn!("Rejected TEST login in production");
        return Err(ApiError::Forbidden("TEST login is disabled in production".into()));
    }

    let email = req
        .email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| ApiError::BadUserInput("An email is required for TEST login".into()))?;
    let password = req.password;

    run_blocking(&state.db, move |db| {
        let row = db.get_user_by_email(&email)?.ok_or_else(invalid_credentials)?;

        if let Some(hash) = row.password.as_deref() {
            let parsed = PasswordHash::new(hash)
                .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash for user {} unreadable: {}", row.id, e)))?;
            let supplied = password.as_deref().unwrap_or_default();
            Argon2::default()
                .verify_password(supplied.as_bytes(), &parsed)
                .map_err(|_| invalid_credentials())?;
        }

        let actors = db.get_actors_for_user(row.id)?;
        Ok(users::attach_roles(row, &actors))
    })
    .await
}

async fn find_by_email(db: &Arc<Database>, email: String) -> Result<User, ApiError> {
    run_blocking(db, move |db| {
        users::get(db, &users::UserLookup::Email(email))?.ok_or_else(invalid_credentials)
    })
    .await
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthenticated("Invalid credentials".into())
}
