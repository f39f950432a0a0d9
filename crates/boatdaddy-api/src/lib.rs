pub mod auth;
pub mod config;
pub mod error;
pub mod google;
pub mod images;
pub mod rides;
pub mod router;
pub mod schema;
pub mod session;
pub mod users;

use std::sync::Arc;

use boatdaddy_db::Database;
use tracing::error;

use crate::error::ApiError;

/// Runs a blocking database closure on the blocking pool.
pub(crate) async fn run_blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e))
        })?
}
