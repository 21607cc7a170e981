/// Forwarding outbox for the remote mirror.
///
/// When a sync URL is configured, every accepted reading is posted to a
/// second deployment of this service (its `/update` route). Readings the
/// mirror does not acknowledge are appended to a JSON file and retried on the
/// next flush, which runs on a timer and on `/admin/force_sync`. The file is
/// removed once everything in it has been delivered.

use crate::logging::{self, Component};
use crate::model::StoredReading;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Timeout for the immediate forward of a fresh reading.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(7);
/// Timeout per entry when draining the outbox.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("mirror returned HTTP {0}")]
    Http(u16),

    #[error("mirror connection failed: {0}")]
    Transport(String),

    #[error("outbox file error: {0}")]
    Io(#[from] io::Error),

    #[error("outbox file could not be parsed: {0}")]
    Malformed(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// What the mirror receives. Field names are the mirror's `/update` names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorPayload {
    #[serde(rename = "mucNuocA")]
    pub level_a_cm: f64,
    #[serde(rename = "mucNuocB")]
    pub level_b_cm: f64,
    #[serde(rename = "luuLuong")]
    pub flow_m3s: f64,
    #[serde(rename = "isRaining")]
    pub is_raining: bool,
    #[serde(rename = "trangThai")]
    pub sim_status: String,
    #[serde(rename = "thongBao")]
    pub sim_message: String,
    /// Predicted seconds until point A reaches danger (-1 when unknown).
    pub time_until_a_danger: f64,
    #[serde(rename = "predicted_trangthai")]
    pub predicted_status: String,
    pub created_at: String,
}

impl MirrorPayload {
    pub fn from_stored(row: &StoredReading) -> Self {
        Self::new(&row.record, row.created_at)
    }

    pub fn new(record: &crate::model::ReadingRecord, created_at: DateTime<Utc>) -> Self {
        MirrorPayload {
            level_a_cm: record.level_a_cm,
            level_b_cm: record.level_b_cm,
            flow_m3s: record.flow_m3s,
            is_raining: record.is_raining,
            sim_status: record.sim_status.clone(),
            sim_message: record.sim_message.clone(),
            time_until_a_danger: record.predicted_seconds,
            predicted_status: record.predicted_status.clone(),
            created_at: created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

pub trait Mirror: Send + Sync {
    fn post(&self, payload: &MirrorPayload, timeout: Duration) -> Result<(), SyncError>;
}

pub struct HttpMirror {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpMirror {
    pub fn new(url: &str) -> Result<Self, SyncError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        Ok(HttpMirror {
            client,
            url: url.to_string(),
        })
    }
}

impl Mirror for HttpMirror {
    fn post(&self, payload: &MirrorPayload, timeout: Duration) -> Result<(), SyncError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(timeout)
            .json(payload)
            .send()
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SyncError::Http(response.status().as_u16()))
        }
    }
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// No mirror configured.
    Disabled,
    Delivered,
    /// Not delivered; written to the outbox file.
    Queued,
    /// Not delivered and the outbox file could not be written.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    pub total: usize,
    pub delivered: usize,
    pub kept: usize,
}

pub struct SyncOutbox {
    mirror: Option<Box<dyn Mirror>>,
    path: PathBuf,
    /// Serialises every read-modify-write of the outbox file.
    file_lock: Mutex<()>,
}

impl SyncOutbox {
    pub fn new(mirror: Option<Box<dyn Mirror>>, path: impl Into<PathBuf>) -> Self {
        SyncOutbox {
            mirror,
            path: path.into(),
            file_lock: Mutex::new(()),
        }
    }

    /// Builds an HTTP-backed outbox, or a disabled one when `url` is unset.
    pub fn from_url(url: Option<&str>, path: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let mirror = match url.filter(|u| !u.trim().is_empty()) {
            Some(url) => Some(Box::new(HttpMirror::new(url)?) as Box<dyn Mirror>),
            None => None,
        };
        Ok(Self::new(mirror, path))
    }

    pub fn is_enabled(&self) -> bool {
        self.mirror.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Posts one reading now; queues it on failure.
    pub fn forward(&self, payload: &MirrorPayload) -> ForwardOutcome {
        let Some(mirror) = &self.mirror else {
            return ForwardOutcome::Disabled;
        };

        match mirror.post(payload, FORWARD_TIMEOUT) {
            Ok(()) => {
                logging::debug(Component::Sync, Some(&payload.created_at), "forwarded to mirror");
                ForwardOutcome::Delivered
            }
            Err(err) => {
                logging::warn(
                    Component::Sync,
                    Some(&payload.created_at),
                    &format!("forward failed, queueing: {}", err),
                );
                match self.enqueue(payload) {
                    Ok(()) => ForwardOutcome::Queued,
                    Err(err) => {
                        logging::error(
                            Component::Sync,
                            Some(&payload.created_at),
                            &format!("could not queue reading: {}", err),
                        );
                        ForwardOutcome::Dropped
                    }
                }
            }
        }
    }

    /// Appends one payload to the outbox file.
    pub fn enqueue(&self, payload: &MirrorPayload) -> Result<(), SyncError> {
        let _guard = self.lock();
        let mut pending = load_pending(&self.path)?;
        pending.push(payload.clone());
        save_pending(&self.path, &pending)
    }

    /// Payloads currently waiting in the outbox file.
    pub fn pending(&self) -> Result<Vec<MirrorPayload>, SyncError> {
        let _guard = self.lock();
        load_pending(&self.path)
    }

    /// Retries every queued payload once, in order, and rewrites the file
    /// with whatever is still undelivered.
    pub fn flush(&self) -> Result<FlushReport, SyncError> {
        let Some(mirror) = &self.mirror else {
            return Ok(FlushReport::default());
        };

        let _guard = self.lock();
        let pending = load_pending(&self.path)?;
        if pending.is_empty() {
            remove_if_present(&self.path)?;
            return Ok(FlushReport::default());
        }

        let total = pending.len();
        let mut kept = Vec::new();
        for payload in pending {
            if let Err(err) = mirror.post(&payload, FLUSH_TIMEOUT) {
                logging::debug(
                    Component::Sync,
                    Some(&payload.created_at),
                    &format!("retry failed: {}", err),
                );
                kept.push(payload);
            }
        }

        if kept.is_empty() {
            remove_if_present(&self.path)?;
        } else {
            save_pending(&self.path, &kept)?;
        }

        let report = FlushReport {
            total,
            delivered: total - kept.len(),
            kept: kept.len(),
        };
        logging::log_flush_summary(report.total, report.delivered, report.kept);
        Ok(report)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guarded data is `()`, so a poisoned lock carries no bad state.
        self.file_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

/// Reads the outbox file; a missing file is an empty outbox.
pub fn load_pending(path: &Path) -> Result<Vec<MirrorPayload>, SyncError> {
    match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(Vec::new()),
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Replaces the outbox file contents via a temp file and rename.
pub fn save_pending(path: &Path, pending: &[MirrorPayload]) -> Result<(), SyncError> {
    let text = serde_json::to_string_pretty(pending)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, text)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<(), SyncError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
