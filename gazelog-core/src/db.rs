use std::time::Duration;

use crate::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

/// Idempotent DDL for the `session` / `sample` tables.
///
/// Runs as one implicit transaction; the advisory lock serializes concurrent
/// bootstraps (e.g. parallel test binaries) against the same database.
pub const SCHEMA: &str = r#"
SELECT pg_advisory_xact_lock(7431001);

CREATE TABLE IF NOT EXISTS session (
    id UUID NOT NULL,
    device_label VARCHAR(1024) NOT NULL,
    sample_rate DOUBLE PRECISION NOT NULL CHECK (sample_rate > 0),
    duration DOUBLE PRECISION NOT NULL CHECK (duration >= 0),
    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
    PRIMARY KEY (id)
);

CREATE TABLE IF NOT EXISTS sample (
    session_id UUID NOT NULL,
    timestamp TIMESTAMP WITH TIME ZONE NOT NULL,
    pos DOUBLE PRECISION NOT NULL,
    PRIMARY KEY (session_id, timestamp),
    FOREIGN KEY (session_id) REFERENCES session(id) ON DELETE CASCADE
);

-- samples are read oldest first
CREATE INDEX IF NOT EXISTS idx_sample_session_time_asc
    ON sample (session_id, timestamp ASC);

CREATE INDEX IF NOT EXISTS idx_session_created_desc
    ON session (created_at DESC, id DESC);
"#;

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
        .connect(&config.resolve_url())
        .await
}

/// `create_pool` with exponential backoff, for process startup where the
/// database may still be coming up.
pub async fn connect_with_retry(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let retry_strategy = ExponentialBackoff::from_millis(200)
        .max_delay(Duration::from_secs(5))
        .map(jitter)
        .take(config.connect_retries);

    Retry::spawn(retry_strategy, || async {
        create_pool(config).await.map_err(|e| {
            tracing::warn!(error = %e, "Database connection attempt failed");
            e
        })
    })
    .await
}

pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    tracing::debug!("Database schema ensured");
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}
