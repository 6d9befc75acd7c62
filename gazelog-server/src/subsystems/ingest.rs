//! Ingestion subsystem — atomic create-and-persist of one recorded session
//!
//! `IngestService::create_session`:
//! - Validates the typed payload (no storage access on failure)
//! - Resolves `created_at` from `recorded_at` or the receipt time
//! - Rounds `duration` to 3 decimal places
//! - Writes the header and the full sample batch in one transaction
//!
//! Any storage failure rolls the transaction back and surfaces only
//! `ServiceError::IngestionFailed`; the cause goes to the log.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use gazelog_core::config::IngestConfig;
use gazelog_core::{Sample, ServiceError, Session, SessionStore, StoreError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label stored when the client sends no device descriptor.
pub const UNKNOWN_DEVICE: &str = "Unknown";

/// Matches the `device_label VARCHAR(1024)` column.
pub const MAX_DEVICE_LABEL_CHARS: usize = 1024;

/// Decimal places kept for `duration`.
const DURATION_PRECISION: i32 = 3;

/// Microseconds, the resolution of `TIMESTAMPTZ`.
const TIMESTAMP_SUBSEC_DIGITS: u16 = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleInput {
    pub timestamp: DateTime<Utc>,
    pub pos: f64,
}

/// Upload body for one finished capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(alias = "sampleRate")]
    pub sample_rate: f64,
    pub duration: f64,
    #[serde(default, alias = "recordedAt")]
    pub recorded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub samples: Vec<SampleInput>,
}

#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn SessionStore>,
    config: IngestConfig,
}

impl IngestService {
    pub fn new(store: Arc<dyn SessionStore>, config: IngestConfig) -> Self {
        Self { store, config }
    }

    /// Persist `request` as a new session and return its id.
    ///
    /// `device_label` is the out-of-band descriptor from the boundary layer;
    /// `None` or blank stores `"Unknown"`.
    pub async fn create_session(
        &self,
        request: CreateSessionRequest,
        device_label: Option<&str>,
    ) -> Result<Uuid, ServiceError> {
        let device_label = resolve_device_label(device_label);
        validate(&request, &device_label, self.config.max_samples)?;

        let created_at = request
            .recorded_at
            .unwrap_or_else(Utc::now)
            .trunc_subsecs(TIMESTAMP_SUBSEC_DIGITS);
        let id = Uuid::new_v4();

        let session = Session {
            id,
            device_label,
            sample_rate: request.sample_rate,
            duration: round_duration(request.duration),
            created_at,
        };
        let samples: Vec<Sample> = request
            .samples
            .into_iter()
            .map(|s| Sample {
                session_id: id,
                timestamp: s.timestamp.trunc_subsecs(TIMESTAMP_SUBSEC_DIGITS),
                pos: s.pos,
            })
            .collect();

        let deadline = Duration::from_millis(self.config.timeout_ms);
        let result = tokio::time::timeout(deadline, self.persist(&session, &samples)).await;

        match result {
            Ok(Ok(())) => {
                tracing::info!(
                    session_id = %id,
                    samples = samples.len(),
                    "Session ingested"
                );
                Ok(id)
            }
            Ok(Err(e)) => {
                tracing::error!(session_id = %id, error = %e, "Session ingestion rolled back");
                Err(ServiceError::IngestionFailed)
            }
            Err(_) => {
                // The dropped future released its transaction uncommitted.
                tracing::error!(
                    session_id = %id,
                    timeout_ms = self.config.timeout_ms,
                    "Session ingestion timed out and was rolled back"
                );
                Err(ServiceError::IngestionFailed)
            }
        }
    }

    async fn persist(&self, session: &Session, samples: &[Sample]) -> Result<(), StoreError> {
        let mut tx = self.store.begin().await?;
        tx.insert_session(session).await?;
        tx.insert_samples(samples).await?;
        tx.commit().await
    }
}

/// Trimmed label, or `"Unknown"` when absent or blank.
pub fn resolve_device_label(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(label) if !label.is_empty() => label.to_string(),
        _ => UNKNOWN_DEVICE.to_string(),
    }
}

pub fn round_duration(duration: f64) -> f64 {
    let factor = 10f64.powi(DURATION_PRECISION);
    (duration * factor).round() / factor
}

/// Field-level checks run before any transaction is opened.
pub fn validate(
    request: &CreateSessionRequest,
    device_label: &str,
    max_samples: usize,
) -> Result<(), ServiceError> {
    if !request.sample_rate.is_finite() || request.sample_rate <= 0.0 {
        return Err(ServiceError::InvalidInput(
            "sample_rate must be greater than 0".to_string(),
        ));
    }
    if !request.duration.is_finite() || request.duration < 0.0 {
        return Err(ServiceError::InvalidInput(
            "duration must be non-negative".to_string(),
        ));
    }
    // Scaling by 10^3 overflows near f64::MAX.
    if !round_duration(request.duration).is_finite() {
        return Err(ServiceError::InvalidInput(
            "duration is out of range".to_string(),
        ));
    }
    if device_label.chars().count() > MAX_DEVICE_LABEL_CHARS {
        return Err(ServiceError::InvalidInput(format!(
            "device label exceeds {} characters",
            MAX_DEVICE_LABEL_CHARS
        )));
    }
    if request.samples.len() > max_samples {
        return Err(ServiceError::InvalidInput(format!(
            "too many samples: {} (max {})",
            request.samples.len(),
            max_samples
        )));
    }
    if let Some(index) = request.samples.iter().position(|s| !s.pos.is_finite()) {
        return Err(ServiceError::InvalidInput(format!(
            "samples[{}].pos must be a finite number",
            index
        )));
    }
    Ok(())
}
