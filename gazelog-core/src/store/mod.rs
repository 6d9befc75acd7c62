//! Storage engine for sessions and their samples.
//!
//! A `SessionStore` hands out `StoreTransaction`s for writes and answers the
//! two read paths directly. Transactions roll back when dropped without
//! `commit`, so every early return or cancelled future leaves nothing behind.
//!
//! Implementations:
//! - **PostgreSQL** (`PgSessionStore`) for deployment
//! - **In-memory** (`MemorySessionStore`) enforcing the same constraints, for tests

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Sample, Session, SessionDetail};

mod memory;
mod postgres;

pub use memory::MemorySessionStore;
pub use postgres::PgSessionStore;

/// Upper bound on a single listing page, whatever the caller asks for.
pub const MAX_LIST_LIMIT: u32 = 150;

/// Clamp a requested page size into `1..=MAX_LIST_LIMIT`.
pub fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_LIST_LIMIT)
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Open a unit of work. Dropping it uncommitted rolls back.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Sessions by `created_at` descending, ties broken by `id` descending.
    async fn list_sessions(&self, offset: u32, limit: u32) -> Result<Vec<Session>, StoreError>;

    /// One session with samples by `timestamp` ascending, or `NotFound`.
    async fn get_session_with_samples(&self, id: Uuid) -> Result<SessionDetail, StoreError>;

    /// Backend description for health reporting.
    async fn health(&self) -> Result<String, StoreError>;
}

#[async_trait]
pub trait StoreTransaction: Send {
    async fn insert_session(&mut self, session: &Session) -> Result<(), StoreError>;

    /// Insert a whole batch or nothing.
    async fn insert_samples(&mut self, samples: &[Sample]) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
