use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Sample;

/// Session header. Listings return these without samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub device_label: String,
    pub sample_rate: f64,
    pub duration: f64,
    pub created_at: DateTime<Utc>,
}

/// A session with its samples in ascending timestamp order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    pub samples: Vec<Sample>,
}
