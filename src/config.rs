//! Service and simulator configuration.
//!
//! Values come from three layers, later ones winning:
//!   1. built-in defaults (the tuning the demo was calibrated with),
//!   2. `flood_alert.toml` (or the file named by `FLOOD_ALERT_CONFIG`),
//!   3. environment variables, including a `.env` file loaded via `dotenv`.
//!
//! Every TOML field is optional; a missing file is not an error.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "./flood_alert.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Alert tuning
// ---------------------------------------------------------------------------

/// Thresholds, cooldowns and escalation margins for every alert kind.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// cm/s above which level B is rising rapidly.
    pub rapid_rise_threshold: f64,
    /// cm/s sub-tier that overrides the rapid-rise cooldown.
    pub rapid_rise_danger_rate: f64,
    /// Rapid-rise re-arms once the rate drops below this fraction of the threshold.
    pub rapid_rise_clear_fraction: f64,
    pub rapid_rise_cooldown_secs: u64,

    /// Single-step level B change (cm) that counts as a jump.
    pub jump_threshold_cm: f64,
    pub jump_clear_cm: f64,
    /// A jump this much larger than the last reported one overrides the cooldown.
    pub jump_escalation_cm: f64,
    pub jump_cooldown_secs: u64,

    pub high_level_warning_cm: f64,
    pub high_level_critical_cm: f64,
    /// Both high-level alerts re-arm this far below the warning cutoff.
    pub high_level_clear_margin_cm: f64,
    pub high_level_escalation_cm: f64,
    pub high_level_cooldown_secs: u64,

    /// Re-notify period while the predicted status stays at the most severe tier.
    pub danger_reminder_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        AlertConfig {
            rapid_rise_threshold: 0.5,
            rapid_rise_danger_rate: 1.0,
            rapid_rise_clear_fraction: 0.3,
            rapid_rise_cooldown_secs: 300,
            jump_threshold_cm: 2.0,
            jump_clear_cm: 0.5,
            jump_escalation_cm: 1.0,
            jump_cooldown_secs: 300,
            high_level_warning_cm: 20.0,
            high_level_critical_cm: 25.0,
            high_level_clear_margin_cm: 2.0,
            high_level_escalation_cm: 2.0,
            high_level_cooldown_secs: 600,
            danger_reminder_secs: 120,
        }
    }
}

impl AlertConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("rapid_rise_threshold", self.rapid_rise_threshold),
            ("jump_threshold_cm", self.jump_threshold_cm),
            ("high_level_warning_cm", self.high_level_warning_cm),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if self.rapid_rise_danger_rate <= self.rapid_rise_threshold {
            return Err(ConfigError::Invalid(
                "rapid_rise_danger_rate must exceed rapid_rise_threshold".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.rapid_rise_clear_fraction) {
            return Err(ConfigError::Invalid(format!(
                "rapid_rise_clear_fraction must be in [0, 1), got {}",
                self.rapid_rise_clear_fraction
            )));
        }
        if self.jump_clear_cm > self.jump_threshold_cm {
            return Err(ConfigError::Invalid(
                "jump_clear_cm must not exceed jump_threshold_cm".to_string(),
            ));
        }
        if self.high_level_critical_cm <= self.high_level_warning_cm {
            return Err(ConfigError::Invalid(
                "high_level_critical_cm must exceed high_level_warning_cm".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Simulator tuning
// ---------------------------------------------------------------------------

/// Waveform shape and phase budgets for the synthetic sensor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub base_level_a_cm: f64,
    pub base_level_b_cm: f64,
    pub base_flow_m3s: f64,
    pub peak_level_a_cm: f64,
    pub peak_level_b_cm: f64,
    pub peak_flow_m3s: f64,
    pub danger_level_a_cm: f64,
    pub danger_level_b_cm: f64,
    pub danger_level_b_peak_cm: f64,
    pub rain_duration_steps: u32,
    pub rise_steps: u32,
    pub peak_steps: u32,
    pub fall_steps: u32,
    pub a_lag_steps: usize,
    pub update_interval_ms: u64,
    pub rain_probability: f64,
    pub rain_clear_epsilon_cm: f64,
    pub server_url: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            base_level_a_cm: 5.0,
            base_level_b_cm: 4.0,
            base_flow_m3s: 2.0,
            peak_level_a_cm: 30.0,
            peak_level_b_cm: 28.0,
            peak_flow_m3s: 15.0,
            danger_level_a_cm: 28.0,
            danger_level_b_cm: 25.0,
            danger_level_b_peak_cm: 28.0,
            rain_duration_steps: 10,
            rise_steps: 30,
            peak_steps: 15,
            fall_steps: 30,
            a_lag_steps: 15,
            update_interval_ms: 2000,
            rain_probability: 0.001,
            rain_clear_epsilon_cm: 0.5,
            server_url: "http://localhost:3000/update".to_string(),
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rain_duration_steps == 0
            || self.rise_steps == 0
            || self.peak_steps == 0
            || self.fall_steps == 0
        {
            return Err(ConfigError::Invalid(
                "phase budgets must be at least one tick".to_string(),
            ));
        }
        if self.peak_level_b_cm <= self.base_level_b_cm {
            return Err(ConfigError::Invalid(
                "peak_level_b_cm must exceed base_level_b_cm".to_string(),
            ));
        }
        if self.peak_level_b_cm > self.peak_level_a_cm {
            // A replays B verbatim, so B's ceiling must fit under A's.
            return Err(ConfigError::Invalid(
                "peak_level_b_cm must not exceed peak_level_a_cm".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rain_probability) {
            return Err(ConfigError::Invalid(format!(
                "rain_probability must be in [0, 1], got {}",
                self.rain_probability
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Service wiring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub port: u16,
    pub predictor_url: String,
    pub predictor_timeout_secs: u64,
    pub database_url: Option<String>,
    pub sync_url: Option<String>,
    pub sync_interval_ms: u64,
    pub outbox_path: String,
    pub fcm_project_id: Option<String>,
    pub fcm_access_token: Option<String>,
    /// Rows kept by the in-memory store when no database is reachable.
    pub memory_store_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            port: 3000,
            predictor_url: "http://localhost:5001".to_string(),
            predictor_timeout_secs: 6,
            database_url: None,
            sync_url: None,
            sync_interval_ms: 30_000,
            outbox_path: "./unsynced_data.json".to_string(),
            fcm_project_id: None,
            fcm_access_token: None,
            memory_store_capacity: 5_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FloodConfig {
    pub alerts: AlertConfig,
    pub simulator: SimulatorConfig,
    pub service: ServiceConfig,
}

impl FloodConfig {
    /// Parses a TOML document. Missing sections and fields take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads the file if it exists, otherwise returns defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(FloodConfig::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Full load: `.env`, config file, environment overrides, validation.
    pub fn load(path_override: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let path = match path_override {
            Some(p) => p.to_path_buf(),
            None => std::env::var("FLOOD_ALERT_CONFIG")
                .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
                .into(),
        };

        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.alerts.validate()?;
        config.simulator.validate()?;
        Ok(config)
    }

    /// Applies environment-style overrides through `lookup`, so tests can
    /// supply a map instead of touching the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.service.port = parse_env("PORT", &port)?;
        }
        if let Some(url) = get("PREDICTOR_URL").or_else(|| get("PYTHON_SERVER_URL")) {
            self.service.predictor_url = url;
        }
        if let Some(threshold) = get("RAPID_RISE_THRESHOLD") {
            self.alerts.rapid_rise_threshold = parse_env("RAPID_RISE_THRESHOLD", &threshold)?;
        }
        if let Some(url) = get("SYNC_URL").or_else(|| get("RAILWAY_SYNC_URL")) {
            self.service.sync_url = Some(url);
        }
        if let Some(interval) = get("SYNC_INTERVAL_MS") {
            self.service.sync_interval_ms = parse_env("SYNC_INTERVAL_MS", &interval)?;
        }
        if let Some(project) = get("FCM_PROJECT_ID") {
            self.service.fcm_project_id = Some(project);
        }
        if let Some(token) = get("FCM_ACCESS_TOKEN") {
            self.service.fcm_access_token = Some(token);
        }
        if let Some(server) = get("SIMULATOR_SERVER_URL") {
            self.simulator.server_url = server;
        }

        if let Some(url) = get("DATABASE_URL") {
            self.service.database_url = Some(url);
        } else if let Some(host) = get("DB_HOST") {
            let user = get("DB_USER").unwrap_or_else(|| "postgres".to_string());
            let pass = get("DB_PASS").unwrap_or_default();
            let name = get("DB_NAME").unwrap_or_else(|| "flood_alert_db".to_string());
            let port = get("DB_PORT").unwrap_or_else(|| "5432".to_string());
            self.service.database_url = Some(format!(
                "host={} port={} user={} password={} dbname={}",
                host, port, user, pass, name
            ));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} has an invalid value: {}", key, value)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = FloodConfig::default();
        config.alerts.validate().expect("default alert config should validate");
        config.simulator.validate().expect("default simulator config should validate");
        assert_eq!(config.service.port, 3000);
        assert_eq!(config.alerts.rapid_rise_threshold, 0.5);
        assert_eq!(config.simulator.a_lag_steps, 15);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = FloodConfig::from_toml_str(
            r#"
            [alerts]
            rapid_rise_threshold = 0.8

            [simulator]
            rain_duration_steps = 4
            "#,
        )
        .expect("partial TOML should parse");

        assert_eq!(config.alerts.rapid_rise_threshold, 0.8);
        assert_eq!(config.alerts.jump_threshold_cm, 2.0);
        assert_eq!(config.simulator.rain_duration_steps, 4);
        assert_eq!(config.simulator.rise_steps, 30);
        assert_eq!(config.service, ServiceConfig::default());
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let result = FloodConfig::from_toml_str("[alerts\nrapid_rise_threshold = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = FloodConfig::from_file(Path::new("/nonexistent/flood_alert.toml"))
            .expect("missing file is not an error");
        assert_eq!(config, FloodConfig::default());
    }

    #[test]
    fn test_env_overrides_win_over_file_values() {
        let mut config = FloodConfig::default();
        config
            .apply_overrides(lookup_from(&[
                ("PORT", "8080"),
                ("PYTHON_SERVER_URL", "http://model:5001"),
                ("RAPID_RISE_THRESHOLD", "0.75"),
                ("SYNC_URL", "https://mirror.example/update"),
            ]))
            .expect("valid overrides");

        assert_eq!(config.service.port, 8080);
        assert_eq!(config.service.predictor_url, "http://model:5001");
        assert_eq!(config.alerts.rapid_rise_threshold, 0.75);
        assert_eq!(
            config.service.sync_url.as_deref(),
            Some("https://mirror.example/update")
        );
    }

    #[test]
    fn test_predictor_url_prefers_primary_name() {
        let mut config = FloodConfig::default();
        config
            .apply_overrides(lookup_from(&[
                ("PREDICTOR_URL", "http://primary"),
                ("PYTHON_SERVER_URL", "http://legacy"),
            ]))
            .unwrap();
        assert_eq!(config.service.predictor_url, "http://primary");
    }

    #[test]
    fn test_database_url_composed_from_parts() {
        let mut config = FloodConfig::default();
        config
            .apply_overrides(lookup_from(&[("DB_HOST", "db.local"), ("DB_PASS", "secret")]))
            .unwrap();
        let url = config.service.database_url.expect("DB_HOST should produce a URL");
        assert!(url.contains("host=db.local"));
        assert!(url.contains("password=secret"));
        assert!(url.contains("dbname=flood_alert_db"));
    }

    #[test]
    fn test_invalid_numeric_override_is_rejected() {
        let mut config = FloodConfig::default();
        let result = config.apply_overrides(lookup_from(&[("PORT", "three thousand")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_alert_validation_rejects_inverted_cutoffs() {
        let alerts = AlertConfig {
            high_level_warning_cm: 25.0,
            high_level_critical_cm: 20.0,
            ..AlertConfig::default()
        };
        assert!(alerts.validate().is_err());
    }

    #[test]
    fn test_simulator_validation_rejects_zero_budget() {
        let sim = SimulatorConfig {
            peak_steps: 0,
            ..SimulatorConfig::default()
        };
        assert!(sim.validate().is_err());
    }
}
