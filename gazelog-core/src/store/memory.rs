use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{clamp_limit, SessionStore, StoreTransaction};
use crate::error::StoreError;
use crate::models::{Sample, Session, SessionDetail};

/// Mirrors the `device_label VARCHAR(1024)` column.
const MAX_DEVICE_LABEL_CHARS: usize = 1024;

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<Uuid, Session>,
    samples: HashMap<Uuid, BTreeMap<DateTime<Utc>, f64>>,
}

/// Process-local store with the same constraint and visibility rules as the
/// PostgreSQL schema. Writes are staged per transaction and applied under one
/// write lock at commit.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryTransaction {
    state: Arc<RwLock<MemoryState>>,
    sessions: Vec<Session>,
    samples: Vec<Sample>,
}

fn check_session_row(session: &Session) -> Result<(), StoreError> {
    if !(session.sample_rate > 0.0) {
        return Err(StoreError::ConstraintViolation(
            "session_sample_rate_check".to_string(),
        ));
    }
    if !(session.duration >= 0.0) {
        return Err(StoreError::ConstraintViolation(
            "session_duration_check".to_string(),
        ));
    }
    if session.device_label.chars().count() > MAX_DEVICE_LABEL_CHARS {
        return Err(StoreError::ConstraintViolation(
            "device_label exceeds 1024 characters".to_string(),
        ));
    }
    Ok(())
}

fn duplicate_key(session_id: Uuid, timestamp: DateTime<Utc>) -> StoreError {
    StoreError::ConstraintViolation(format!(
        "duplicate key (session_id, timestamp)=({}, {})",
        session_id, timestamp
    ))
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            sessions: Vec::new(),
            samples: Vec::new(),
        }))
    }

    async fn list_sessions(&self, offset: u32, limit: u32) -> Result<Vec<Session>, StoreError> {
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        Ok(sessions
            .into_iter()
            .skip(offset as usize)
            .take(clamp_limit(limit) as usize)
            .collect())
    }

    async fn get_session_with_samples(&self, id: Uuid) -> Result<SessionDetail, StoreError> {
        let state = self.state.read().await;
        let session = state
            .sessions
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))?;

        let samples = state
            .samples
            .get(&id)
            .map(|rows| {
                rows.iter()
                    .map(|(timestamp, pos)| Sample {
                        session_id: id,
                        timestamp: *timestamp,
                        pos: *pos,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(SessionDetail { session, samples })
    }

    async fn health(&self) -> Result<String, StoreError> {
        let state = self.state.read().await;
        Ok(format!("in-memory ({} sessions)", state.sessions.len()))
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert_session(&mut self, session: &Session) -> Result<(), StoreError> {
        check_session_row(session)?;

        let exists = self.sessions.iter().any(|s| s.id == session.id)
            || self.state.read().await.sessions.contains_key(&session.id);
        if exists {
            return Err(StoreError::ConstraintViolation(format!(
                "duplicate key (id)=({})",
                session.id
            )));
        }

        self.sessions.push(session.clone());
        Ok(())
    }

    async fn insert_samples(&mut self, samples: &[Sample]) -> Result<(), StoreError> {
        let state = self.state.read().await;

        let mut seen: HashSet<(Uuid, DateTime<Utc>)> = self
            .samples
            .iter()
            .map(|s| (s.session_id, s.timestamp))
            .collect();

        for sample in samples {
            let staged_parent = self.sessions.iter().any(|s| s.id == sample.session_id);
            if !staged_parent && !state.sessions.contains_key(&sample.session_id) {
                return Err(StoreError::ConstraintViolation(format!(
                    "sample references missing session {}",
                    sample.session_id
                )));
            }

            let committed = state
                .samples
                .get(&sample.session_id)
                .is_some_and(|rows| rows.contains_key(&sample.timestamp));
            if committed || !seen.insert((sample.session_id, sample.timestamp)) {
                return Err(duplicate_key(sample.session_id, sample.timestamp));
            }
        }
        drop(state);

        self.samples.extend_from_slice(samples);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        // Another transaction may have committed since these rows were staged.
        for session in &self.sessions {
            if state.sessions.contains_key(&session.id) {
                return Err(StoreError::ConstraintViolation(format!(
                    "duplicate key (id)=({})",
                    session.id
                )));
            }
        }
        for sample in &self.samples {
            let taken = state
                .samples
                .get(&sample.session_id)
                .is_some_and(|rows| rows.contains_key(&sample.timestamp));
            if taken {
                return Err(duplicate_key(sample.session_id, sample.timestamp));
            }
        }

        for session in &self.sessions {
            state.sessions.insert(session.id, session.clone());
            state.samples.entry(session.id).or_default();
        }
        for sample in &self.samples {
            state
                .samples
                .entry(sample.session_id)
                .or_default()
                .insert(sample.timestamp, sample.pos);
        }

        Ok(())
    }
}
