/// `/update` handling through the service state, with in-process fakes.
///
/// Run with: cargo test --test service_updates

mod common;

use common::{RecordingNotifier, ScriptedPredictor, TOKEN};
use flood_alert_service::alert::evaluator::EvaluatorState;
use flood_alert_service::config::AlertConfig;
use flood_alert_service::model::{Features, PredictError, ValidationError, PREDICTION_ERROR_STATUS};
use flood_alert_service::predictor::Predictor;
use flood_alert_service::server::{self, AppState};
use flood_alert_service::store::MemoryStore;
use flood_alert_service::sync::{Mirror, MirrorPayload, SyncError, SyncOutbox};
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Mirror that records what it receives, or refuses everything.
#[derive(Clone, Default)]
struct SharedMirror {
    received: Arc<Mutex<Vec<MirrorPayload>>>,
    down: bool,
}

impl Mirror for SharedMirror {
    fn post(&self, payload: &MirrorPayload, _: Duration) -> Result<(), SyncError> {
        if self.down {
            return Err(SyncError::Transport("connection refused".into()));
        }
        self.received.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// Predictor that takes `delay` to answer each endpoint.
struct SlowPredictor {
    delay: Duration,
}

impl Predictor for SlowPredictor {
    fn classify(&self, _: &Features) -> Result<String, PredictError> {
        std::thread::sleep(self.delay);
        Ok("Normal".to_string())
    }

    fn estimate_time(&self, _: &Features) -> Result<f64, PredictError> {
        std::thread::sleep(self.delay);
        Ok(0.0)
    }
}

fn service(predictor: ScriptedPredictor, outbox: SyncOutbox, clock: Arc<AtomicI64>) -> AppState {
    AppState::new(
        EvaluatorState::new(AlertConfig::default()),
        Box::new(predictor),
        Box::new(MemoryStore::new(100)),
        Box::new(RecordingNotifier::default()),
        outbox,
    )
    .with_clock(Box::new(move || clock.load(Ordering::SeqCst)))
}

fn body(level_b: f64) -> serde_json::Value {
    json!({
        "level_a": 5.0,
        "level_b": level_b,
        "flow": 2.0,
        "is_raining": false,
        "status": "Normal",
        "message": "Safe",
        "time_until_a_danger": null
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_update_returns_prediction_and_persists() {
    let clock = Arc::new(AtomicI64::new(0));
    let state = service(
        ScriptedPredictor::new("Normal", 480.0),
        SyncOutbox::new(None, "unused.json"),
        clock,
    );

    let response = state.handle_update(&body(4.0)).expect("valid update");
    assert_eq!(response.prediction_status, "Normal");
    assert_eq!(response.prediction_time, 480.0);

    let row = state.store().latest().unwrap().expect("persisted");
    assert_eq!(row.record.level_b_cm, 4.0);
    assert_eq!(row.record.countdown_text.as_deref(), Some("8 min 0 s"));
}

#[test]
fn test_invalid_update_has_no_side_effects() {
    let clock = Arc::new(AtomicI64::new(0));
    let state = service(
        ScriptedPredictor::new("Normal", 0.0),
        SyncOutbox::new(None, "unused.json"),
        clock,
    );

    let err = state
        .handle_update(&json!({"level_a": 1, "level_b": 2, "flow": 3, "is_raining": "yes"}))
        .unwrap_err();
    assert!(matches!(err, ValidationError::NotABoolean { field: "is_raining", .. }));
    assert!(state.store().latest().unwrap().is_none());
}

#[test]
fn test_predictor_timeout_still_succeeds() {
    let clock = Arc::new(AtomicI64::new(0));
    let state = service(
        ScriptedPredictor::timing_out(),
        SyncOutbox::new(None, "unused.json"),
        clock,
    );

    let response = state.handle_update(&body(4.0)).expect("degraded, not failed");
    assert_eq!(response.prediction_status, PREDICTION_ERROR_STATUS);
    assert_eq!(response.prediction_time, -1.0);
    assert!(state.store().latest().unwrap().is_some());
}

#[test]
fn test_register_token_requires_token() {
    let clock = Arc::new(AtomicI64::new(0));
    let state = service(
        ScriptedPredictor::new("Normal", 0.0),
        SyncOutbox::new(None, "unused.json"),
        clock,
    );

    assert_eq!(
        state.register_token(&json!({})),
        Err(ValidationError::MissingField("token"))
    );
    assert_eq!(
        state.register_token(&json!({"token": "  "})),
        Err(ValidationError::MissingField("token"))
    );
    assert!(state.device_token().is_none());

    state.register_token(&json!({ "token": TOKEN })).unwrap();
    assert_eq!(state.device_token().as_deref(), Some(TOKEN));
}

#[test]
fn test_accepted_readings_are_forwarded_to_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let mirror = SharedMirror::default();
    let outbox = SyncOutbox::new(
        Some(Box::new(mirror.clone())),
        dir.path().join("unsynced_data.json"),
    );
    let clock = Arc::new(AtomicI64::new(0));
    let state = service(ScriptedPredictor::new("Cảnh báo!", 120.0), outbox, clock.clone());

    state.handle_update(&body(4.0)).unwrap();
    clock.store(2_000, Ordering::SeqCst);
    state.handle_update(&body(4.5)).unwrap();

    let received = mirror.received.lock().unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(received[1].level_b_cm, 4.5);
    assert_eq!(received[1].predicted_status, "Cảnh báo!");
    assert_eq!(received[1].time_until_a_danger, 120.0);
    assert!(!state.outbox().path().exists());
}

#[test]
fn test_unreachable_mirror_queues_then_force_sync_reports() {
    let dir = tempfile::tempdir().unwrap();
    let outbox = SyncOutbox::new(
        Some(Box::new(SharedMirror { down: true, ..SharedMirror::default() })),
        dir.path().join("unsynced_data.json"),
    );
    let clock = Arc::new(AtomicI64::new(0));
    let state = service(ScriptedPredictor::new("Normal", 0.0), outbox, clock);

    state.handle_update(&body(4.0)).unwrap();
    state.handle_update(&body(4.1)).unwrap();
    assert_eq!(state.outbox().pending().unwrap().len(), 2);

    let report = state.force_sync();
    assert_eq!(report.total, 2);
    assert_eq!(report.delivered, 0);
    assert_eq!(report.kept, 2);
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

/// With a single runtime worker, a token registration queued behind a slow
/// `/update` must wait off the runtime so other requests keep being served.
#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_token_registration_behind_slow_update_keeps_runtime_free() {
    let state = Arc::new(AppState::new(
        EvaluatorState::new(AlertConfig::default()),
        Box::new(SlowPredictor {
            delay: Duration::from_millis(2_000),
        }),
        Box::new(MemoryStore::new(10)),
        Box::new(RecordingNotifier::default()),
        SyncOutbox::new(None, "unused.json"),
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = server::router(Arc::clone(&state));
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let client = reqwest::Client::new();

    let update = tokio::spawn({
        let (client, url) = (client.clone(), format!("{}/update", base));
        async move { client.post(url).json(&body(4.0)).send().await.unwrap().status() }
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    let register = tokio::spawn({
        let (client, url) = (client.clone(), format!("{}/api/register_fcm_token", base));
        async move {
            client
                .post(url)
                .json(&json!({ "token": TOKEN }))
                .send()
                .await
                .unwrap()
                .status()
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let health = client.get(&base).send().await.unwrap();
    assert!(health.status().is_success());
    assert!(
        started.elapsed() < Duration::from_millis(800),
        "health check waited {:?} behind the evaluator lock",
        started.elapsed()
    );
    assert!(!update.is_finished(), "update should still be evaluating");

    assert_eq!(update.await.unwrap(), reqwest::StatusCode::OK);
    assert_eq!(register.await.unwrap(), reqwest::StatusCode::OK);
    assert_eq!(state.device_token().as_deref(), Some(TOKEN));
}
