use std::time::Duration;

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;
use sqlx::PgPool;

use crate::server::app::AppState;

/// How long the probe waits on the database before reporting it down.
const DB_PING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    database: DatabaseHealth,
    connection_pool: PoolStats,
}

#[derive(Serialize)]
pub struct DatabaseHealth {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl DatabaseHealth {
    fn up() -> Self {
        Self {
            status: "ok",
            error: None,
        }
    }

    fn down(message: String) -> Self {
        Self {
            status: "error",
            error: Some(message),
        }
    }

    fn is_up(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Serialize)]
pub struct PoolStats {
    size: u32,
    idle_connections: usize,
    max_connections: u32,
}

/// Readiness probe.
///
/// Pings the database with a short timeout and reports pool utilization.
/// 200 when the ping succeeds, 503 otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let database = ping_database(&state.db_pool).await;

    let connection_pool = PoolStats {
        size: state.db_pool.size(),
        idle_connections: state.db_pool.num_idle(),
        max_connections: state.db_pool.options().get_max_connections(),
    };

    let (status_code, status) = if database.is_up() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status_code,
        Json(HealthResponse {
            status,
            database,
            connection_pool,
        }),
    )
}

async fn ping_database(pool: &PgPool) -> DatabaseHealth {
    let ping = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool);

    match tokio::time::timeout(DB_PING_TIMEOUT, ping).await {
        Ok(Ok(_)) => DatabaseHealth::up(),
        Ok(Err(e)) => DatabaseHealth::down(format!("query failed: {e}")),
        Err(_) => DatabaseHealth::down(format!(
            "query timed out after {}s",
            DB_PING_TIMEOUT.as_secs()
        )),
    }
}
