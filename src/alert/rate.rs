//! Rate of change between consecutive samples.
//!
//! # Clock injection
//! The current time is passed in rather than read from the system clock, so
//! the computation is deterministic in tests and replays.

use crate::model::{PreviousSample, SensorSample};

/// First differences of the upstream level and flow.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RateOfChange {
    /// cm/s; 0 when there is no usable previous sample.
    pub level_b_per_sec: f64,
    /// m³/s per second; 0 when there is no usable previous sample.
    pub flow_per_sec: f64,
    /// Raw single-step change in level B (cm); 0 for the first sample.
    pub level_b_delta_cm: f64,
}

/// Computes rates against the previous accepted sample.
///
/// Non-positive elapsed time means the rate is unknown and reported as 0,
/// never NaN or infinite.
pub fn rate_of_change(
    previous: Option<&PreviousSample>,
    sample: &SensorSample,
    now_ms: i64,
) -> RateOfChange {
    let Some(prev) = previous else {
        return RateOfChange::default();
    };

    let delta_b = sample.level_b_cm - prev.level_b_cm;
    let delta_flow = sample.flow_m3s - prev.flow_m3s;
    let elapsed_secs = (now_ms - prev.timestamp_ms) as f64 / 1000.0;

    let (level_rate, flow_rate) = if elapsed_secs > 0.0 {
        (delta_b / elapsed_secs, delta_flow / elapsed_secs)
    } else {
        (0.0, 0.0)
    };

    RateOfChange {
        level_b_per_sec: finite_or_zero(level_rate),
        flow_per_sec: finite_or_zero(flow_rate),
        level_b_delta_cm: finite_or_zero(delta_b),
    }
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}
