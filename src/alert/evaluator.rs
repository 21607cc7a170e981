//! Per-sample alert evaluation.
//!
//! `EvaluatorState` owns everything that survives between samples: the last
//! accepted sample, one `Trigger` per threshold alert, the last status that
//! was pushed to the device, the danger reminder timer and the registered
//! device token. `process` runs one validated sample through the pipeline:
//!
//! 1. rate of change against the previous sample
//! 2. rapid-rise, jump and high-level triggers
//! 3. predictor (both endpoints, degraded independently)
//! 4. status-change notification and danger reminder
//! 5. persistence
//! 6. previous-sample update
//!
//! No step can fail the sample. External failures are logged and replaced
//! by defaults, so the caller always gets an `UpdateOutcome`.

use crate::alert::debounce::{Escalation, FireReason, Trigger, TriggerPolicy};
use crate::alert::messages;
use crate::alert::rate::{rate_of_change, RateOfChange};
use crate::config::AlertConfig;
use crate::degrade;
use crate::logging::{self, Component};
use crate::model::{
    Features, FloodStatus, Prediction, PreviousSample, ReadingRecord, SensorUpdate,
    StoredReading, PREDICTION_ERROR_STATUS,
};
use crate::notify::{self, Notifier};
use crate::predictor::{self, Predictor};
use crate::store::ReadingStore;

/// External collaborators for one `process` call.
#[derive(Clone, Copy)]
pub struct Dependencies<'a> {
    pub predictor: &'a dyn Predictor,
    pub store: &'a dyn ReadingStore,
    pub notifier: &'a dyn Notifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    RapidRise,
    Jump,
    HighLevelWarning,
    HighLevelCritical,
    StatusChange,
    DangerReminder,
}

impl AlertKind {
    fn tag(self) -> &'static str {
        match self {
            AlertKind::RapidRise => "rapid-rise",
            AlertKind::Jump => "jump",
            AlertKind::HighLevelWarning => "high-warning",
            AlertKind::HighLevelCritical => "high-critical",
            AlertKind::StatusChange => "status",
            AlertKind::DangerReminder => "danger-reminder",
        }
    }
}

/// One alert decided for this sample.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub kind: AlertKind,
    /// Why a threshold trigger fired; `None` for status notifications.
    pub reason: Option<FireReason>,
    pub title: String,
    pub body: String,
    /// False when no token was registered or the transport failed.
    pub delivered: bool,
}

/// Everything `process` decided about one sample.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub rate: RateOfChange,
    pub prediction: Prediction,
    pub alerts: Vec<AlertEvent>,
    pub record: ReadingRecord,
    /// `None` when the store rejected the row.
    pub stored: Option<StoredReading>,
}

impl UpdateOutcome {
    pub fn alerts_of(&self, kind: AlertKind) -> impl Iterator<Item = &AlertEvent> {
        self.alerts.iter().filter(move |a| a.kind == kind)
    }
}

pub struct EvaluatorState {
    config: AlertConfig,
    previous: Option<PreviousSample>,
    rapid_rise: Trigger,
    jump: Trigger,
    high_warning: Trigger,
    high_critical: Trigger,
    last_notified_status: String,
    last_danger_reminder_at: Option<i64>,
    device_token: Option<String>,
}

impl EvaluatorState {
    pub fn new(config: AlertConfig) -> Self {
        let high_clear = config.high_level_warning_cm - config.high_level_clear_margin_cm;

        let rapid_rise = Trigger::new(TriggerPolicy {
            threshold: config.rapid_rise_threshold,
            clear_below: config.rapid_rise_threshold * config.rapid_rise_clear_fraction,
            cooldown_ms: secs_to_ms(config.rapid_rise_cooldown_secs),
            escalation: Escalation::Tier(config.rapid_rise_danger_rate),
        });
        let jump = Trigger::new(TriggerPolicy {
            threshold: config.jump_threshold_cm,
            clear_below: config.jump_clear_cm,
            cooldown_ms: secs_to_ms(config.jump_cooldown_secs),
            escalation: Escalation::Margin(config.jump_escalation_cm),
        });
        let high_warning = Trigger::new(TriggerPolicy {
            threshold: config.high_level_warning_cm,
            clear_below: high_clear,
            cooldown_ms: secs_to_ms(config.high_level_cooldown_secs),
            escalation: Escalation::Margin(config.high_level_escalation_cm),
        });
        let high_critical = Trigger::new(TriggerPolicy {
            threshold: config.high_level_critical_cm,
            clear_below: high_clear,
            cooldown_ms: secs_to_ms(config.high_level_cooldown_secs),
            escalation: Escalation::Margin(config.high_level_escalation_cm),
        });

        EvaluatorState {
            config,
            previous: None,
            rapid_rise,
            jump,
            high_warning,
            high_critical,
            last_notified_status: FloodStatus::Normal.label().to_string(),
            last_danger_reminder_at: None,
            device_token: None,
        }
    }

    // ---------------------------------------------------------------------
    // Device token
    // ---------------------------------------------------------------------

    /// Replaces the destination for all future notifications.
    pub fn register_token(&mut self, token: &str) {
        logging::info(
            Component::Notify,
            Some(notify::token_prefix(token)),
            "device token registered",
        );
        self.device_token = Some(token.to_string());
    }

    pub fn forget_token(&mut self) {
        self.device_token = None;
    }

    pub fn device_token(&self) -> Option<&str> {
        self.device_token.as_deref()
    }

    pub fn previous(&self) -> Option<&PreviousSample> {
        self.previous.as_ref()
    }

    pub fn last_notified_status(&self) -> &str {
        &self.last_notified_status
    }

    // ---------------------------------------------------------------------
    // Pipeline
    // ---------------------------------------------------------------------

    /// Evaluates one validated sample observed at `now_ms`.
    pub fn process(
        &mut self,
        update: &SensorUpdate,
        now_ms: i64,
        deps: &Dependencies<'_>,
    ) -> UpdateOutcome {
        let sample = &update.sample;
        let rate = rate_of_change(self.previous.as_ref(), sample, now_ms);
        let mut alerts = Vec::new();

        self.check_rapid_rise(rate.level_b_per_sec, now_ms, deps.notifier, &mut alerts);
        self.check_jump(rate.level_b_delta_cm, now_ms, deps.notifier, &mut alerts);
        self.check_high_level(sample.level_b_cm, now_ms, deps.notifier, &mut alerts);

        let features = Features::new(sample, rate.level_b_per_sec, rate.flow_per_sec);
        let prediction = predictor::predict(deps.predictor, &features);

        self.check_status(&prediction, now_ms, deps.notifier, &mut alerts);

        let countdown_source = update
            .annotations
            .time_until_a_danger_secs
            .unwrap_or(prediction.seconds);
        let record = ReadingRecord {
            level_a_cm: sample.level_a_cm,
            level_b_cm: sample.level_b_cm,
            flow_m3s: sample.flow_m3s,
            is_raining: sample.is_raining,
            sim_status: update.annotations.status.clone(),
            sim_message: update.annotations.message.clone(),
            predicted_status: prediction.status.clone(),
            countdown_text: messages::format_countdown(countdown_source),
            predicted_seconds: prediction.seconds,
        };

        let stored = degrade::or_fallback(
            deps.store.append(&record).map(Some),
            Component::Database,
            "append reading",
            None,
        );
        if let Some(row) = &stored {
            logging::debug(
                Component::Database,
                Some(row.id.to_string().as_str()),
                &format!("saved A:{:.2} B:{:.2}", record.level_a_cm, record.level_b_cm),
            );
        }

        self.previous = Some(PreviousSample {
            level_b_cm: sample.level_b_cm,
            flow_m3s: sample.flow_m3s,
            timestamp_ms: now_ms,
        });

        UpdateOutcome {
            rate,
            prediction,
            alerts,
            record,
            stored,
        }
    }

    fn check_rapid_rise(
        &mut self,
        rate: f64,
        now_ms: i64,
        notifier: &dyn Notifier,
        alerts: &mut Vec<AlertEvent>,
    ) {
        if let Some(reason) = self.rapid_rise.evaluate(rate, now_ms).fired() {
            let danger = rate >= self.config.rapid_rise_danger_rate;
            let (title, body) = messages::rapid_rise_text(rate, danger);
            logging::warn(
                Component::Evaluator,
                Some(AlertKind::RapidRise.tag()),
                &format!("level B rising at {:.2} cm/s ({:?})", rate, reason),
            );
            alerts.push(self.deliver(AlertKind::RapidRise, Some(reason), title, body, notifier));
        }
    }

    fn check_jump(
        &mut self,
        delta_cm: f64,
        now_ms: i64,
        notifier: &dyn Notifier,
        alerts: &mut Vec<AlertEvent>,
    ) {
        if let Some(reason) = self.jump.evaluate(delta_cm, now_ms).fired() {
            let (title, body) = messages::jump_text(delta_cm);
            logging::warn(
                Component::Evaluator,
                Some(AlertKind::Jump.tag()),
                &format!("level B jumped {:.2} cm ({:?})", delta_cm, reason),
            );
            alerts.push(self.deliver(AlertKind::Jump, Some(reason), title, body, notifier));
        }
    }

    /// Critical is checked first; when it fires, the warning trigger is
    /// marked fired too so falling back into the warning band stays quiet.
    fn check_high_level(
        &mut self,
        level_cm: f64,
        now_ms: i64,
        notifier: &dyn Notifier,
        alerts: &mut Vec<AlertEvent>,
    ) {
        if let Some(reason) = self.high_critical.evaluate(level_cm, now_ms).fired() {
            self.high_warning.mark_fired(level_cm, now_ms);
            let (title, body) =
                messages::high_level_text(level_cm, true, self.config.high_level_critical_cm);
            logging::warn(
                Component::Evaluator,
                Some(AlertKind::HighLevelCritical.tag()),
                &format!("level B at {:.2} cm ({:?})", level_cm, reason),
            );
            alerts.push(self.deliver(
                AlertKind::HighLevelCritical,
                Some(reason),
                title,
                body,
                notifier,
            ));
            return;
        }

        if let Some(reason) = self.high_warning.evaluate(level_cm, now_ms).fired() {
            let (title, body) =
                messages::high_level_text(level_cm, false, self.config.high_level_warning_cm);
            logging::warn(
                Component::Evaluator,
                Some(AlertKind::HighLevelWarning.tag()),
                &format!("level B at {:.2} cm ({:?})", level_cm, reason),
            );
            alerts.push(self.deliver(
                AlertKind::HighLevelWarning,
                Some(reason),
                title,
                body,
                notifier,
            ));
        }
    }

    /// Status-change notification plus the periodic danger reminder.
    ///
    /// Only runs while a device is registered: without one the last notified
    /// status is left alone, so the change is pushed once a device appears.
    fn check_status(
        &mut self,
        prediction: &Prediction,
        now_ms: i64,
        notifier: &dyn Notifier,
        alerts: &mut Vec<AlertEvent>,
    ) {
        let status = prediction.status.as_str();
        if status == PREDICTION_ERROR_STATUS || self.device_token.is_none() {
            return;
        }

        let is_danger = prediction.flood_status().is_some_and(FloodStatus::is_most_severe);
        if !is_danger {
            self.last_danger_reminder_at = None;
        }

        let title = messages::status_title(status);
        let body = messages::status_body(status, prediction.seconds);

        if status != self.last_notified_status {
            logging::info(
                Component::Evaluator,
                Some(AlertKind::StatusChange.tag()),
                &format!("{} -> {}", self.last_notified_status, status),
            );
            self.last_notified_status = status.to_string();
            if is_danger {
                self.last_danger_reminder_at = Some(now_ms);
            }
            alerts.push(self.deliver(AlertKind::StatusChange, None, title, body, notifier));
            return;
        }

        if is_danger {
            let interval_ms = secs_to_ms(self.config.danger_reminder_secs);
            let due = self
                .last_danger_reminder_at
                .map_or(true, |at| now_ms - at >= interval_ms);
            if due {
                self.last_danger_reminder_at = Some(now_ms);
                alerts.push(self.deliver(AlertKind::DangerReminder, None, title, body, notifier));
            }
        }
    }

    /// Sends to the registered device, if any. An invalid-token failure
    /// forgets the token until the device registers again.
    fn deliver(
        &mut self,
        kind: AlertKind,
        reason: Option<FireReason>,
        title: String,
        body: String,
        notifier: &dyn Notifier,
    ) -> AlertEvent {
        let delivered = match self.device_token.clone() {
            None => {
                logging::debug(
                    Component::Notify,
                    Some(kind.tag()),
                    "no device token registered, notification skipped",
                );
                false
            }
            Some(token) => match notifier.send(&token, &title, &body) {
                Ok(()) => true,
                Err(err) if err.is_invalid_destination() => {
                    logging::warn(
                        Component::Notify,
                        Some(notify::token_prefix(&token)),
                        &format!("token rejected, forgetting it: {}", err),
                    );
                    self.forget_token();
                    false
                }
                Err(err) => degrade::succeeded::<(), _>(Err(err), Component::Notify, kind.tag()),
            },
        };

        AlertEvent {
            kind,
            reason,
            title,
            body,
            delivered,
        }
    }
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
