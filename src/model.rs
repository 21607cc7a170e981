/// Core data types for the flood alert service.
///
/// This module defines the shared domain model imported by all other modules:
/// samples, predictor features, persistence rows, status tiers, and the error
/// types each external collaborator can report. It contains no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Status labels
// ---------------------------------------------------------------------------

/// Status reported when the predictor could not produce a classification.
pub const PREDICTION_ERROR_STATUS: &str = "prediction_error";

/// Countdown reported when the predictor could not produce an estimate.
pub const PREDICTION_UNAVAILABLE_SECS: f64 = -1.0;

/// Flood status tiers, in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FloodStatus {
    Normal,
    Watch,
    HighWatch,
    Danger,
}

impl FloodStatus {
    /// Canonical label used by this crate (simulator annotations, notifications).
    pub fn label(self) -> &'static str {
        match self {
            FloodStatus::Normal => "Normal",
            FloodStatus::Watch => "Warning!",
            FloodStatus::HighWatch => "High Warning!",
            FloodStatus::Danger => "Danger!",
        }
    }

    /// Parses a predictor label.
    ///
    /// Accepts the crate's own labels and the labels the trained model emits
    /// (it was trained on Vietnamese-labelled data). Returns `None` for
    /// anything else, including the prediction error sentinel.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Normal" | "Bình thường" => Some(FloodStatus::Normal),
            "Warning!" | "Cảnh báo!" => Some(FloodStatus::Watch),
            "High Warning!" | "Cảnh báo Cao!" => Some(FloodStatus::HighWatch),
            "Danger!" | "Nguy hiểm!" => Some(FloodStatus::Danger),
            _ => None,
        }
    }

    pub fn is_most_severe(self) -> bool {
        self == FloodStatus::Danger
    }
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// One validated observation, as accepted by the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSample {
    pub level_a_cm: f64,
    pub level_b_cm: f64,
    pub flow_m3s: f64,
    pub is_raining: bool,
}

/// Opaque annotations carried from the simulator into persistence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    pub status: String,
    pub message: String,
    pub time_until_a_danger_secs: Option<f64>,
}

/// A validated `/update` request.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorUpdate {
    pub sample: SensorSample,
    pub annotations: Annotations,
}

/// The part of the last accepted sample the rate computation needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviousSample {
    pub level_b_cm: f64,
    pub flow_m3s: f64,
    pub timestamp_ms: i64,
}

// ---------------------------------------------------------------------------
// Predictor payload
// ---------------------------------------------------------------------------

/// Feature vector sent to both predictor endpoints.
///
/// Field names on the wire match the model API's training columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Features {
    #[serde(rename = "mucNuocA")]
    pub level_a_cm: f64,
    #[serde(rename = "mucNuocB")]
    pub level_b_cm: f64,
    #[serde(rename = "luuLuong")]
    pub flow_m3s: f64,
    pub is_raining_now: u8,
    pub b_rate_of_change: f64,
    pub flow_rate_of_change: f64,
    pub ab_diff: f64,
}

impl Features {
    pub fn new(sample: &SensorSample, b_rate: f64, flow_rate: f64) -> Self {
        Features {
            level_a_cm: sample.level_a_cm,
            level_b_cm: sample.level_b_cm,
            flow_m3s: sample.flow_m3s,
            is_raining_now: u8::from(sample.is_raining),
            b_rate_of_change: b_rate,
            flow_rate_of_change: flow_rate,
            ab_diff: sample.level_b_cm - sample.level_a_cm,
        }
    }
}

/// Predictor output after degradation: always populated.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub status: String,
    pub seconds: f64,
}

impl Prediction {
    pub fn unavailable() -> Self {
        Prediction {
            status: PREDICTION_ERROR_STATUS.to_string(),
            seconds: PREDICTION_UNAVAILABLE_SECS,
        }
    }

    pub fn flood_status(&self) -> Option<FloodStatus> {
        FloodStatus::from_label(&self.status)
    }
}

// ---------------------------------------------------------------------------
// Persistence rows
// ---------------------------------------------------------------------------

/// One flattened row per accepted sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingRecord {
    pub level_a_cm: f64,
    pub level_b_cm: f64,
    pub flow_m3s: f64,
    pub is_raining: bool,
    pub sim_status: String,
    pub sim_message: String,
    pub predicted_status: String,
    /// Human-readable countdown, `None` when no countdown applies.
    pub countdown_text: Option<String>,
    pub predicted_seconds: f64,
}

/// A row read back from a store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredReading {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: ReadingRecord,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Rejections at the ingress boundary. Terminal: no side effects, no retry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("field {field} is not a finite number: {value}")]
    NotANumber { field: &'static str, value: String },

    #[error("field {field} is not a boolean: {value}")]
    NotABoolean { field: &'static str, value: String },

    #[error("malformed body: {0}")]
    MalformedBody(String),
}

/// Failures talking to the external predictor.
#[derive(Error, Debug)]
pub enum PredictError {
    #[error("predictor request timed out: {0}")]
    Timeout(String),

    #[error("predictor HTTP error: {0}")]
    Http(u16),

    #[error("predictor connection failed: {0}")]
    Transport(String),

    #[error("predictor response malformed: {0}")]
    Malformed(String),
}

/// Failures writing to or reading from the reading store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] postgres::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failures delivering a push notification.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// The destination token is no longer valid and should be forgotten.
    #[error("device token rejected: {0}")]
    InvalidToken(String),

    #[error("push HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("push connection failed: {0}")]
    Transport(String),
}

impl NotifyError {
    pub fn is_invalid_destination(&self) -> bool {
        matches!(self, NotifyError::InvalidToken(_))
    }
}
