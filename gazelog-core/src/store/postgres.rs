use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{clamp_limit, SessionStore, StoreTransaction};
use crate::error::StoreError;
use crate::models::{Sample, Session, SessionDetail};

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Wraps a sqlx transaction; sqlx issues the rollback when it is dropped uncommitted.
struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }

    async fn list_sessions(&self, offset: u32, limit: u32) -> Result<Vec<Session>, StoreError> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, device_label, sample_rate, duration, created_at
            FROM session
            ORDER BY created_at DESC, id DESC
            OFFSET $1
            LIMIT $2
            "#,
        )
        .bind(offset as i64)
        .bind(clamp_limit(limit) as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn get_session_with_samples(&self, id: Uuid) -> Result<SessionDetail, StoreError> {
        let mut tx = self.pool.begin().await?;

        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, device_label, sample_rate, duration, created_at
            FROM session
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound(id))?;

        // served by idx_sample_session_time_asc
        let samples = sqlx::query_as::<_, Sample>(
            r#"
            SELECT session_id, timestamp, pos
            FROM sample
            WHERE session_id = $1
            ORDER BY timestamp ASC
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(SessionDetail { session, samples })
    }

    async fn health(&self) -> Result<String, StoreError> {
        Ok(crate::db::health_check(&self.pool).await?)
    }
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn insert_session(&mut self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO session (id, device_label, sample_rate, duration, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session.id)
        .bind(&session.device_label)
        .bind(session.sample_rate)
        .bind(session.duration)
        .bind(session.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_samples(&mut self, samples: &[Sample]) -> Result<(), StoreError> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut session_ids: Vec<Uuid> = Vec::with_capacity(samples.len());
        let mut timestamps: Vec<DateTime<Utc>> = Vec::with_capacity(samples.len());
        let mut positions: Vec<f64> = Vec::with_capacity(samples.len());
        for sample in samples {
            session_ids.push(sample.session_id);
            timestamps.push(sample.timestamp);
            positions.push(sample.pos);
        }

        // Single statement: a key collision anywhere in the batch fails all of it.
        let result = sqlx::query(
            r#"
            INSERT INTO sample (session_id, timestamp, pos)
            SELECT * FROM UNNEST($1::uuid[], $2::timestamptz[], $3::float8[])
            "#,
        )
        .bind(session_ids)
        .bind(timestamps)
        .bind(positions)
        .execute(&mut *self.tx)
        .await?;

        tracing::debug!(rows = result.rows_affected(), "Inserted sample batch");
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
