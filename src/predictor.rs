/// Client for the external flood prediction service.
///
/// The service exposes two endpoints that take the same feature vector:
///   POST {base}/predict       -> {"prediction": "<status label>"}
///   POST {base}/predict_time  -> {"predicted_seconds": <number>}
///
/// Both are called concurrently for every sample; either may fail on its own.
/// Failures degrade to the "prediction unavailable" sentinels and never block
/// the rest of the update.

use crate::degrade;
use crate::logging::{self, Component};
use crate::model::{Features, PredictError, Prediction, PREDICTION_ERROR_STATUS, PREDICTION_UNAVAILABLE_SECS};
use serde::Deserialize;
use std::time::Duration;

pub trait Predictor: Send + Sync {
    /// Returns the predicted status label.
    fn classify(&self, features: &Features) -> Result<String, PredictError>;

    /// Returns the predicted seconds until point A reaches danger.
    fn estimate_time(&self, features: &Features) -> Result<f64, PredictError>;
}

/// Calls both endpoints concurrently and waits for both.
pub fn predict(predictor: &dyn Predictor, features: &Features) -> Prediction {
    let (status, seconds) = std::thread::scope(|scope| {
        let status = scope.spawn(|| predictor.classify(features));
        let seconds = scope.spawn(|| predictor.estimate_time(features));
        (
            status.join().unwrap_or_else(|_| Err(panicked("classify"))),
            seconds.join().unwrap_or_else(|_| Err(panicked("estimate_time"))),
        )
    });

    let prediction = Prediction {
        status: degrade::or_fallback(
            status,
            Component::Predictor,
            "classify",
            PREDICTION_ERROR_STATUS.to_string(),
        ),
        seconds: degrade::or_fallback(
            seconds,
            Component::Predictor,
            "estimate_time",
            PREDICTION_UNAVAILABLE_SECS,
        ),
    };

    logging::debug(
        Component::Predictor,
        None,
        &format!("{}, time: {}s", prediction.status, prediction.seconds),
    );
    prediction
}

fn panicked(operation: &str) -> PredictError {
    PredictError::Transport(format!("{} worker panicked", operation))
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    prediction: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EstimateResponse {
    predicted_seconds: Option<f64>,
}

pub struct HttpPredictor {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpPredictor {
    /// Builds a client whose requests give up after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PredictError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PredictError::Transport(e.to_string()))?;
        Ok(HttpPredictor {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        features: &Features,
    ) -> Result<T, PredictError> {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .json(features)
            .send()
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(PredictError::Http(response.status().as_u16()));
        }

        response
            .json::<T>()
            .map_err(|e| PredictError::Malformed(e.to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> PredictError {
    if err.is_timeout() {
        PredictError::Timeout(err.to_string())
    } else {
        PredictError::Transport(err.to_string())
    }
}

impl Predictor for HttpPredictor {
    fn classify(&self, features: &Features) -> Result<String, PredictError> {
        let body: ClassifyResponse = self.post("predict", features)?;
        body.prediction
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| PredictError::Malformed("missing 'prediction'".to_string()))
    }

    fn estimate_time(&self, features: &Features) -> Result<f64, PredictError> {
        let body: EstimateResponse = self.post("predict_time", features)?;
        body.predicted_seconds
            .filter(|s| s.is_finite())
            .ok_or_else(|| PredictError::Malformed("missing 'predicted_seconds'".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
