//! Retrieval subsystem — read-only projections over stored sessions
//!
//! - `list_sessions`: header-only summaries, newest first, paginated
//! - `get_session`: one header plus samples, oldest first
//!
//! `NotFound` is an expected outcome here and stays distinct from storage failures.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use gazelog_core::config::RetrievalConfig;
use gazelog_core::store::clamp_limit;
use gazelog_core::{ServiceError, Session, SessionDetail, SessionStore, StoreError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One page of session summaries.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionPage {
    pub sessions: Vec<Session>,
    pub offset: u32,
    /// Effective page size after defaulting and clamping.
    pub limit: u32,
    pub count: usize,
}

#[derive(Clone)]
pub struct RetrieveService {
    store: Arc<dyn SessionStore>,
    config: RetrievalConfig,
}

impl RetrieveService {
    pub fn new(store: Arc<dyn SessionStore>, config: RetrievalConfig) -> Self {
        Self { store, config }
    }

    /// Summaries ordered by `created_at` descending.
    ///
    /// `limit` defaults to `retrieval.default_limit` and is clamped to `[1, 150]`.
    /// An offset past the end yields an empty page.
    pub async fn list_sessions(
        &self,
        offset: u32,
        limit: Option<u32>,
    ) -> Result<SessionPage, ServiceError> {
        let limit = clamp_limit(limit.unwrap_or(self.config.default_limit));

        let sessions = self
            .with_deadline(self.store.list_sessions(offset, limit))
            .await?;

        tracing::debug!(offset, limit, count = sessions.len(), "Listed sessions");

        Ok(SessionPage {
            count: sessions.len(),
            sessions,
            offset,
            limit,
        })
    }

    /// Header plus samples ordered by `timestamp` ascending, or `NotFound`.
    pub async fn get_session(&self, id: Uuid) -> Result<SessionDetail, ServiceError> {
        self.with_deadline(self.store.get_session_with_samples(id))
            .await
    }

    async fn with_deadline<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, ServiceError> {
        let deadline = Duration::from_millis(self.config.timeout_ms);
        match tokio::time::timeout(deadline, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(StoreError::NotFound(id))) => Err(ServiceError::NotFound(id)),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Session retrieval failed");
                Err(ServiceError::from(e))
            }
            Err(_) => {
                tracing::error!(timeout_ms = self.config.timeout_ms, "Session retrieval timed out");
                Err(ServiceError::StorageUnavailable)
            }
        }
    }
}
