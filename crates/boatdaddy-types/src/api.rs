use async_graphql::{InputObject, SimpleObject};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Provider, Role};

// -- JWT Claims --

/// Payload of the bearer credential issued by the login endpoint and
/// verified on every API request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub provider: Provider,
    pub user_id: i64,
    pub username: String,
    pub roles: Vec<Role>,
    pub iat: usize,
    pub exp: usize,
}

/// Identity of the caller, recomputed from the bearer credential per request.
#[derive(Debug, Clone, PartialEq, Serialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub provider: Provider,
    pub user_id: i64,
    pub username: String,
    pub roles: Vec<Role>,
}

impl From<Claims> for Session {
    fn from(claims: Claims) -> Self {
        Self {
            provider: claims.provider,
            user_id: claims.user_id,
            username: claims.username,
            roles: claims.roles,
        }
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub provider: Provider,
    pub token: String,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub email: String,
    pub jwt: String,
    pub name: String,
    pub provider: Provider,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<LoginCredentials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// -- Users --

#[derive(Debug, Clone, Deserialize, InputObject)]
#[serde(rename_all = "camelCase")]
pub struct UserAddInput {
    pub email: String,
    pub username: String,
    pub name: String,
    pub image: Option<String>,
    pub password: Option<String>,
}

/// Partial update; every `None` field is left untouched.
#[derive(Debug, Clone, Default, Deserialize, InputObject)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdateInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub about_boat: Option<String>,
    pub boat_name: Option<String>,
    pub boat_image: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub is_boat_daddy: Option<bool>,
}

// -- Rides --

#[derive(Debug, Clone, Deserialize, InputObject)]
#[serde(rename_all = "camelCase")]
pub struct RideAddInput {
    pub driver_id: i64,
    pub rider_id: i64,
}
