/// `/update` request decoding.
///
/// The simulator (and older field units) post one JSON object per sample.
/// Numbers may arrive as JSON numbers or as numeric strings (older senders
/// format levels with a fixed number of decimals), and the rain flag may be
/// a boolean or the strings "true"/"false". Anything else is rejected here,
/// before any state is touched.

use crate::model::{Annotations, SensorSample, SensorUpdate, ValidationError};
use serde::Deserialize;
use serde_json::Value;

// ============================================================================
// Wire format
// ============================================================================

/// Raw request body. Field aliases accept the original sender's names.
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePayload {
    #[serde(default, alias = "mucNuocA")]
    pub level_a: Option<Value>,
    #[serde(default, alias = "mucNuocB")]
    pub level_b: Option<Value>,
    #[serde(default, alias = "luuLuong")]
    pub flow: Option<Value>,
    #[serde(default, alias = "isRaining")]
    pub is_raining: Option<Value>,
    #[serde(default, alias = "trangThai")]
    pub status: Option<Value>,
    #[serde(default, alias = "thongBao")]
    pub message: Option<Value>,
    #[serde(default)]
    pub time_until_a_danger: Option<Value>,
}

// ============================================================================
// Decoders
// ============================================================================

/// Decodes a required finite number from a JSON number or numeric string.
pub fn decode_number(field: &'static str, value: Option<&Value>) -> Result<f64, ValidationError> {
    let value = value.ok_or(ValidationError::MissingField(field))?;

    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed
        .filter(|x| x.is_finite())
        .ok_or_else(|| ValidationError::NotANumber {
            field,
            value: value.to_string(),
        })
}

/// Decodes a required boolean from `true`/`false` or `"true"`/`"false"`.
///
/// Any other shape is an explicit error rather than a silent `false`.
pub fn decode_bool(field: &'static str, value: Option<&Value>) -> Result<bool, ValidationError> {
    let value = value.ok_or(ValidationError::MissingField(field))?;

    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Ok(false),
        other => Err(ValidationError::NotABoolean {
            field,
            value: other.to_string(),
        }),
    }
}

/// Opaque text annotation; non-string values are rendered as JSON.
fn decode_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Optional countdown; anything unparseable is treated as absent.
fn decode_optional_seconds(value: Option<&Value>) -> Option<f64> {
    decode_number("time_until_a_danger", value).ok()
}

// ============================================================================
// Entry point
// ============================================================================

/// Validates a request body into a `SensorUpdate`.
pub fn parse_update(body: &Value) -> Result<SensorUpdate, ValidationError> {
    if !body.is_object() {
        return Err(ValidationError::MalformedBody(
            "expected a JSON object".to_string(),
        ));
    }

    let payload: UpdatePayload = serde_json::from_value(body.clone())
        .map_err(|e| ValidationError::MalformedBody(e.to_string()))?;

    let sample = SensorSample {
        level_a_cm: decode_number("level_a", payload.level_a.as_ref())?,
        level_b_cm: decode_number("level_b", payload.level_b.as_ref())?,
        flow_m3s: decode_number("flow", payload.flow.as_ref())?,
        is_raining: decode_bool("is_raining", payload.is_raining.as_ref())?,
    };

    let annotations = Annotations {
        status: decode_text(payload.status.as_ref()),
        message: decode_text(payload.message.as_ref()),
        time_until_a_danger_secs: decode_optional_seconds(payload.time_until_a_danger.as_ref()),
    };

    Ok(SensorUpdate {
        sample,
        annotations,
    })
}

// ============================================================================
// Tests
// ============================================================================
