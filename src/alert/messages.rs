//! Notification text for every alert kind.

use crate::model::FloodStatus;

/// Countdown below which the status body adds an evacuation instruction.
const URGENT_COUNTDOWN_SECS: f64 = 300.0;

/// Renders a countdown as `"M min S s"` or `"S s"`.
///
/// Returns `None` for negative or non-finite input (the predictor's
/// "unavailable" sentinel is -1).
pub fn format_countdown(seconds: f64) -> Option<String> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let total = seconds.round() as u64;
    let minutes = total / 60;
    let secs = total % 60;
    if minutes > 0 {
        Some(format!("{} min {} s", minutes, secs))
    } else {
        Some(format!("{} s", secs))
    }
}

pub fn status_title(status_label: &str) -> String {
    match FloodStatus::from_label(status_label) {
        Some(FloodStatus::Normal) => "✅ Situation stable".to_string(),
        Some(FloodStatus::Watch) => "⚠️ Flood warning".to_string(),
        Some(FloodStatus::HighWatch) => "🔶 High flood warning".to_string(),
        Some(FloodStatus::Danger) => "🚨 FLOOD DANGER".to_string(),
        None => format!("Flood alert: {}", status_label),
    }
}

pub fn status_body(status_label: &str, countdown_secs: f64) -> String {
    let status = FloodStatus::from_label(status_label);
    let mut body = match status {
        Some(FloodStatus::Normal) => {
            "Flood conditions are stable. Keep monitoring.".to_string()
        }
        Some(FloodStatus::Watch) => {
            "Water level is rising. Get preventive measures ready.".to_string()
        }
        Some(FloodStatus::HighWatch) => {
            "Water level is rising fast. Be ready to evacuate if needed.".to_string()
        }
        Some(FloodStatus::Danger) => {
            "FLOOD AT DANGEROUS LEVEL! EVACUATE IMMEDIATELY!".to_string()
        }
        None => format!("Status: {}", status_label),
    };

    if status != Some(FloodStatus::Normal) {
        if let Some(formatted) = format_countdown(countdown_secs) {
            body.push_str(&format!(
                " Flood expected at point A in about {}.",
                formatted
            ));
            if countdown_secs < URGENT_COUNTDOWN_SECS {
                body.push_str(" MOVE TO SAFETY NOW!");
            }
        }
    }
    body
}

pub fn rapid_rise_text(rate_cm_per_sec: f64, danger: bool) -> (String, String) {
    let title = if danger {
        "🌊 Danger: water rising very fast!"
    } else {
        "🌊 Warning: water rising fast!"
    };
    (
        title.to_string(),
        format!(
            "Level B is rising rapidly ({:.2} cm/s).",
            rate_cm_per_sec
        ),
    )
}

pub fn jump_text(delta_cm: f64) -> (String, String) {
    (
        "📈 Sudden water level jump".to_string(),
        format!("Level B jumped {:.1} cm since the previous reading.", delta_cm),
    )
}

pub fn high_level_text(level_cm: f64, critical: bool, cutoff_cm: f64) -> (String, String) {
    let title = if critical {
        "🟥 Critical water level"
    } else {
        "🟧 High water level"
    };
    (
        title.to_string(),
        format!(
            "Level B is at {:.1} cm, above the {:.0} cm mark.",
            level_cm, cutoff_cm
        ),
    )
}
