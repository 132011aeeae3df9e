use std::sync::Arc;

use axum::http::StatusCode;
use tracing::error;

use courier_db::Database;

/// Run one store call off the async runtime. The REST layer treats every
/// store failure as a 500; details go to the log, not the client.
pub(crate) async fn query<T, F>(db: &Arc<Database>, f: F) -> Result<T, StatusCode>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("store error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
