pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod store;

pub use config::GazelogConfig;
pub use error::{ServiceError, StoreError};
pub use models::{Sample, Session, SessionDetail};
pub use store::{MemorySessionStore, PgSessionStore, SessionStore, StoreTransaction, MAX_LIST_LIMIT};
