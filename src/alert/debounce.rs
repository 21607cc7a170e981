//! Debounced, hysteresis-gated alert trigger.
//!
//! One primitive shared by every threshold alert. A trigger watches a single
//! scalar (rate, jump size, level) and decides, per sample, whether an alert
//! fires, is suppressed by its cooldown, or re-arms.
//!
//! ```text
//!                 value > threshold                 value < clear_below
//!   Armed ─────────────────────────► Active ─────────────────────────► Armed
//!   (fires: NewEpisode)               │  ▲
//!                                     │  │ value > threshold and
//!                                     └──┘ (escalated or cooldown elapsed)
//!                                          fires: Escalated / Reminder
//! ```
//!
//! All times are caller-supplied milliseconds, so replaying the same sample
//! stream yields the same decisions.

/// Rule that lets an active trigger fire again before its cooldown expires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Escalation {
    None,
    /// Value exceeds the last fired value by more than this margin.
    Margin(f64),
    /// Value reaches this tier while the last fired value was below it.
    Tier(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerPolicy {
    /// Fires when the value is strictly above this.
    pub threshold: f64,
    /// Re-arms when the value drops strictly below this.
    pub clear_below: f64,
    pub cooldown_ms: i64,
    pub escalation: Escalation,
}

/// Per-alert bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertState {
    pub active: bool,
    pub last_fired_at: Option<i64>,
    pub last_value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireReason {
    /// First crossing since the trigger was armed.
    NewEpisode,
    /// Still active, but severity escalated past the last report.
    Escalated,
    /// Still active and the cooldown has run out.
    Reminder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Below threshold and armed.
    Idle,
    Fired(FireReason),
    /// Above threshold but inside the cooldown window.
    Suppressed,
    /// Below threshold but not yet under the clear level.
    Holding,
    /// Dropped under the clear level; the trigger is armed again.
    Cleared,
}

impl TriggerOutcome {
    pub fn fired(self) -> Option<FireReason> {
        match self {
            TriggerOutcome::Fired(reason) => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Trigger {
    policy: TriggerPolicy,
    state: AlertState,
}

impl Trigger {
    pub fn new(policy: TriggerPolicy) -> Self {
        Trigger {
            policy,
            state: AlertState::default(),
        }
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    /// Feeds one observation and returns what happened.
    pub fn evaluate(&mut self, value: f64, now_ms: i64) -> TriggerOutcome {
        if value > self.policy.threshold {
            if !self.state.active {
                self.mark_fired(value, now_ms);
                return TriggerOutcome::Fired(FireReason::NewEpisode);
            }
            if self.is_escalation(value) {
                self.mark_fired(value, now_ms);
                return TriggerOutcome::Fired(FireReason::Escalated);
            }
            if self.cooldown_elapsed(now_ms) {
                self.mark_fired(value, now_ms);
                return TriggerOutcome::Fired(FireReason::Reminder);
            }
            return TriggerOutcome::Suppressed;
        }

        if !self.state.active {
            TriggerOutcome::Idle
        } else if value < self.policy.clear_below {
            self.state.active = false;
            TriggerOutcome::Cleared
        } else {
            TriggerOutcome::Holding
        }
    }

    /// Records a firing without evaluating, e.g. when a more severe sibling
    /// alert already covered this sample.
    pub fn mark_fired(&mut self, value: f64, now_ms: i64) {
        self.state.active = true;
        self.state.last_fired_at = Some(now_ms);
        self.state.last_value = Some(value);
    }

    fn cooldown_elapsed(&self, now_ms: i64) -> bool {
        self.state
            .last_fired_at
            .map_or(true, |at| now_ms - at >= self.policy.cooldown_ms)
    }

    fn is_escalation(&self, value: f64) -> bool {
        match self.policy.escalation {
            Escalation::None => false,
            Escalation::Margin(margin) => self
                .state
                .last_value
                .is_some_and(|last| value - last > margin),
            Escalation::Tier(tier) => {
                value >= tier && self.state.last_value.map_or(true, |last| last < tier)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
