/// Wire format the simulator posts to the server's `/update` route.

use crate::simulator::generator::SimulatedReading;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReport {
    pub level_a: f64,
    pub level_b: f64,
    pub flow: f64,
    pub is_raining: bool,
    pub status: String,
    pub message: String,
    pub time_until_a_danger: Option<f64>,
}

impl From<&SimulatedReading> for SensorReport {
    fn from(reading: &SimulatedReading) -> Self {
        SensorReport {
            level_a: reading.level_a_cm,
            level_b: reading.level_b_cm,
            flow: reading.flow_m3s,
            is_raining: reading.is_raining,
            status: reading.tier_a.label().to_string(),
            message: reading.message.clone(),
            time_until_a_danger: reading.time_until_a_danger_secs,
        }
    }
}

/// Posts one report. Non-2xx responses count as failures.
pub struct ReportSender {
    client: reqwest::blocking::Client,
    url: String,
}

impl ReportSender {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(ReportSender {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn send(&self, report: &SensorReport) -> Result<(), reqwest::Error> {
        self.client
            .post(&self.url)
            .json(report)
            .send()?
            .error_for_status()?;
        Ok(())
    }
}
