//! Row and parameter types for the SQLite layer. Timestamps stay as the
//! stored RFC 3339 text; the API crate parses them.

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub image: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub password: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub profile: Option<ProfileRow>,
}

#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub about_boat: Option<String>,
    pub boat_name: Option<String>,
    pub boat_image: Option<String>,
    pub birthday: Option<String>,
    pub is_boat_daddy: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActorRow {
    pub id: i64,
    pub user_id: i64,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct RideRow {
    pub id: i64,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub driver: ActorRow,
    pub rider: ActorRow,
}

/// Values for a user created together with its profile.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub id: Option<i64>,
    pub username: String,
    pub email: String,
    pub image: Option<String>,
    pub password: Option<String>,
    pub profile: NewProfile,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewProfile {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub about_boat: Option<String>,
    pub boat_name: Option<String>,
    pub boat_image: Option<String>,
    pub birthday: Option<String>,
    pub is_boat_daddy: bool,
}

/// Column changes for a partial update. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
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
    pub birthday: Option<String>,
    pub is_boat_daddy: Option<bool>,
}

impl UserChanges {
    pub(crate) fn touches_profile(&self) -> bool {
        self.name.is_some()
            || self.bio.is_some()
            || self.about_boat.is_some()
            || self.boat_name.is_some()
            || self.boat_image.is_some()
            || self.birthday.is_some()
            || self.is_boat_daddy.is_some()
    }
}

/// Inclusive latitude/longitude rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

/// Filters for [`crate::Database::list_users`]. Every `None` disables that filter.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub is_boat_daddy: Option<bool>,
    pub role: Option<String>,
    pub bounds: Option<BoundingBox>,
    pub exclude_user_id: Option<i64>,
    pub limit: Option<u32>,
}

/// A write collided with an existing user's unique column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UniqueConflict {
    #[error("username is already taken")]
    Username,
    #[error("email is already registered")]
    Email,
}
