/// Push notification transport.
///
/// Production sends through the FCM HTTP v1 API with a pre-issued access
/// token. Deployments without FCM credentials use `LogNotifier`, which only
/// writes the notification to the log.
///
/// Callers only care about two outcomes beyond logging: delivered or not, and
/// whether the destination token has been invalidated (so it can be dropped
/// until the device registers again).

use crate::logging::{self, Component};
use crate::model::NotifyError;
use serde_json::json;
use std::time::Duration;

const FCM_ENDPOINT: &str = "https://fcm.googleapis.com/v1/projects";
const ANDROID_CHANNEL_ID: &str = "FloodWarningChannel";

pub trait Notifier: Send + Sync {
    fn send(&self, token: &str, title: &str, body: &str) -> Result<(), NotifyError>;
}

// ---------------------------------------------------------------------------
// Log-only transport
// ---------------------------------------------------------------------------

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, token: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        logging::info(
            Component::Notify,
            Some(token_prefix(token)),
            &format!("(not delivered, FCM not configured) {} - {}", title, body),
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FCM HTTP v1
// ---------------------------------------------------------------------------

pub struct FcmNotifier {
    client: reqwest::blocking::Client,
    project_id: String,
    access_token: String,
}

impl FcmNotifier {
    pub fn new(project_id: &str, access_token: &str) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(FcmNotifier {
            client,
            project_id: project_id.to_string(),
            access_token: access_token.to_string(),
        })
    }

    fn send_url(&self) -> String {
        format!("{}/{}/messages:send", FCM_ENDPOINT, self.project_id)
    }
}

/// Builds the FCM v1 message body for one device.
pub fn build_message(token: &str, title: &str, body: &str) -> serde_json::Value {
    json!({
        "message": {
            "token": token,
            "notification": { "title": title, "body": body },
            "android": {
                "priority": "high",
                "notification": { "sound": "default", "channel_id": ANDROID_CHANNEL_ID }
            },
            "apns": {
                "headers": { "apns-priority": "10" },
                "payload": { "aps": { "sound": "default", "alert": { "title": title, "body": body } } }
            }
        }
    })
}

/// Maps an FCM error response to a `NotifyError`.
///
/// `UNREGISTERED`, and `INVALID_ARGUMENT` complaints about the registration
/// token, mean the token is dead.
pub fn classify_fcm_error(status: u16, body: &str) -> NotifyError {
    let parsed: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
    let error = &parsed["error"];

    let error_codes: Vec<&str> = error["details"]
        .as_array()
        .map(|details| {
            details
                .iter()
                .filter_map(|d| d["errorCode"].as_str())
                .collect()
        })
        .unwrap_or_default();
    let message = error["message"].as_str().unwrap_or_default();

    let unregistered = error_codes.contains(&"UNREGISTERED");
    let bad_token = (error_codes.contains(&"INVALID_ARGUMENT")
        || error["status"].as_str() == Some("INVALID_ARGUMENT"))
        && message.to_ascii_lowercase().contains("registration token");

    if unregistered || bad_token {
        NotifyError::InvalidToken(if message.is_empty() {
            "UNREGISTERED".to_string()
        } else {
            message.to_string()
        })
    } else {
        NotifyError::Http {
            status,
            body: body.chars().take(200).collect(),
        }
    }
}

impl Notifier for FcmNotifier {
    fn send(&self, token: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.send_url())
            .bearer_auth(&self.access_token)
            .json(&build_message(token, title, body))
            .send()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            logging::info(Component::Notify, Some(token_prefix(token)), &format!("sent: {}", title));
            return Ok(());
        }

        let text = response.text().unwrap_or_default();
        Err(classify_fcm_error(status.as_u16(), &text))
    }
}

/// First characters of a token, for log context without leaking it whole.
pub fn token_prefix(token: &str) -> &str {
    match token.char_indices().nth(10) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}
