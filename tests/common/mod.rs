//! In-process fakes for the evaluator's external collaborators.
#![allow(dead_code)]

use flood_alert_service::model::{
    Annotations, Features, NotifyError, PredictError, ReadingRecord, SensorSample, SensorUpdate,
    StoreError, StoredReading,
};
use flood_alert_service::notify::Notifier;
use flood_alert_service::predictor::Predictor;
use flood_alert_service::store::ReadingStore;
use chrono::NaiveDate;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Predictor
// ---------------------------------------------------------------------------

/// Returns a settable status and countdown; `None` means the call fails.
pub struct ScriptedPredictor {
    status: Mutex<Option<String>>,
    seconds: Mutex<Option<f64>>,
}

impl ScriptedPredictor {
    pub fn new(status: &str, seconds: f64) -> Self {
        ScriptedPredictor {
            status: Mutex::new(Some(status.to_string())),
            seconds: Mutex::new(Some(seconds)),
        }
    }

    /// Both endpoints time out.
    pub fn timing_out() -> Self {
        ScriptedPredictor {
            status: Mutex::new(None),
            seconds: Mutex::new(None),
        }
    }

    pub fn set_status(&self, status: &str) {
        *self.status.lock().unwrap() = Some(status.to_string());
    }
}

impl Predictor for ScriptedPredictor {
    fn classify(&self, _: &Features) -> Result<String, PredictError> {
        self.status
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PredictError::Timeout("operation timed out after 6s".into()))
    }

    fn estimate_time(&self, _: &Features) -> Result<f64, PredictError> {
        self.seconds
            .lock()
            .unwrap()
            .ok_or_else(|| PredictError::Timeout("operation timed out after 6s".into()))
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub token: String,
    pub title: String,
    pub body: String,
}

/// Records every send. Optionally rejects the token as unregistered.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<SentNotification>>,
    reject_token: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn rejecting() -> Self {
        RecordingNotifier {
            sent: Mutex::new(Vec::new()),
            reject_token: Mutex::new(true),
        }
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn titles(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|n| n.title.clone()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, token: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(SentNotification {
            token: token.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        });
        if *self.reject_token.lock().unwrap() {
            Err(NotifyError::InvalidToken("Requested entity was not found.".into()))
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Store whose every call fails, as if the database were down.
pub struct DownStore;

impl ReadingStore for DownStore {
    fn append(&self, _: &ReadingRecord) -> Result<StoredReading, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    fn latest(&self) -> Result<Option<StoredReading>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    fn recent(&self, _: usize) -> Result<Vec<StoredReading>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    fn on_date(&self, _: NaiveDate) -> Result<Vec<StoredReading>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

pub fn sample(level_b: f64) -> SensorUpdate {
    SensorUpdate {
        sample: SensorSample {
            level_a_cm: 5.0,
            level_b_cm: level_b,
            flow_m3s: 2.0,
            is_raining: false,
        },
        annotations: Annotations {
            status: "Normal".into(),
            message: "Safe".into(),
            time_until_a_danger_secs: None,
        },
    }
}

pub const TOKEN: &str = "fcm-device-token-0123456789";
