//! Multi-phase flood waveform generator.
//!
//! ```text
//!   Normal ──(p per tick, or start_flood)──► Raining ──rain budget──► Rising
//!     ▲                                                                 │
//!     └──────fall budget────── Falling ◄──────peak budget────── Peak ◄──┘
//! ```
//!
//! Upstream level B is driven by the phase machine. Downstream level A
//! replays B through a fixed-depth lag queue once the queue has filled, and
//! random-walks around its own baseline before that.
//!
//! The random source is a seedable `StdRng`, so a given seed always yields
//! the same series.

use crate::alert::thresholds::{classify_level, TierCutoffs, TierWatch};
use crate::config::SimulatorConfig;
use crate::logging::{self, Component};
use crate::model::FloodStatus;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::fmt;

/// Lowest non-normal cutoff for both gauges.
const WATCH_CUTOFF_CM: f64 = 20.0;
/// A's high-watch cutoff.
const HIGH_WATCH_A_CM: f64 = 25.0;

const NORMAL_LEVEL_NOISE: f64 = 0.5;
const NORMAL_FLOW_NOISE: f64 = 0.2;
const PEAK_LEVEL_NOISE: f64 = 2.0;
const PEAK_FLOW_NOISE: f64 = 3.0;
/// Fraction of the deviation from baseline removed each Normal tick.
const MEAN_REVERSION: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Normal,
    Raining,
    Rising,
    Peak,
    Falling,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Normal => "NORMAL",
            Phase::Raining => "RAINING",
            Phase::Rising => "RISING",
            Phase::Peak => "PEAK",
            Phase::Falling => "FALLING",
        };
        write!(f, "{}", name)
    }
}

/// One generated sample plus the simulator's own annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedReading {
    pub tick: u64,
    /// Phase after this tick's transitions.
    pub phase: Phase,
    pub level_a_cm: f64,
    pub level_b_cm: f64,
    pub flow_m3s: f64,
    pub is_raining: bool,
    pub tier_a: FloodStatus,
    pub tier_b: FloodStatus,
    pub message: String,
    /// Estimated seconds until A reaches danger; `None` while Normal.
    pub time_until_a_danger_secs: Option<f64>,
}

pub struct Generator {
    config: SimulatorConfig,
    rng: StdRng,
    phase: Phase,
    steps_in_phase: u32,
    danger_countdown: f64,
    level_a: f64,
    level_b: f64,
    flow: f64,
    is_raining: bool,
    b_history: VecDeque<f64>,
    cutoffs_a: TierCutoffs,
    cutoffs_b: TierCutoffs,
    watch_a: TierWatch,
    watch_b: TierWatch,
    tick: u64,
}

impl Generator {
    /// New generator at baseline. `seed = None` seeds from OS entropy.
    pub fn new(config: SimulatorConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let cutoffs_a = TierCutoffs {
            watch_cm: WATCH_CUTOFF_CM,
            high_watch_cm: HIGH_WATCH_A_CM,
            danger_cm: config.danger_level_a_cm,
            danger_inclusive: false,
        };
        let cutoffs_b = TierCutoffs {
            watch_cm: WATCH_CUTOFF_CM,
            high_watch_cm: config.danger_level_b_cm,
            danger_cm: config.danger_level_b_peak_cm,
            danger_inclusive: true,
        };

        Generator {
            rng,
            phase: Phase::Normal,
            steps_in_phase: 0,
            danger_countdown: 0.0,
            level_a: config.base_level_a_cm,
            level_b: config.base_level_b_cm,
            flow: config.base_flow_m3s,
            is_raining: false,
            b_history: VecDeque::with_capacity(config.a_lag_steps + 1),
            cutoffs_a,
            cutoffs_b,
            watch_a: TierWatch::default(),
            watch_b: TierWatch::default(),
            tick: 0,
            config,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn steps_in_phase(&self) -> u32 {
        self.steps_in_phase
    }

    pub fn is_raining(&self) -> bool {
        self.is_raining
    }

    /// Ticks from the start of rain until A is expected to reach danger.
    pub fn steps_to_a_danger(&self) -> f64 {
        let c = &self.config;
        let b_rise_per_step = (c.peak_level_b_cm - c.base_level_b_cm) / c.rise_steps as f64;
        let b_steps_to_danger = (c.danger_level_b_cm - c.base_level_b_cm) / b_rise_per_step;
        c.rain_duration_steps as f64 + b_steps_to_danger + c.a_lag_steps as f64
    }

    /// Forces the Raining phase with the countdown armed.
    pub fn start_flood(&mut self) {
        self.enter(Phase::Raining);
        self.is_raining = true;
        self.danger_countdown = self.steps_to_a_danger();
        logging::warn(
            Component::Simulator,
            Some("RAINING"),
            &format!(
                "rain started, A expected to reach danger in {:.0} ticks",
                self.danger_countdown
            ),
        );
    }

    /// Advances one tick.
    pub fn tick(&mut self) -> SimulatedReading {
        self.tick += 1;

        if self.phase == Phase::Normal && self.rng.r#gen::<f64>() < self.config.rain_probability {
            self.start_flood();
        }

        self.step_phase();

        self.level_b = self.level_b.clamp(0.0, self.config.peak_level_b_cm);
        self.flow = self.flow.max(0.0);
        self.step_level_a();
        self.level_a = self.level_a.clamp(0.0, self.config.peak_level_a_cm);

        let time_until_a_danger_secs = if self.phase == Phase::Normal {
            None
        } else {
            self.danger_countdown -= 1.0;
            let interval_secs = self.config.update_interval_ms as f64 / 1000.0;
            Some((self.danger_countdown * interval_secs).max(0.0))
        };

        let tier_a = classify_level(self.level_a, &self.cutoffs_a);
        let tier_b = classify_level(self.level_b, &self.cutoffs_b);
        self.log_tier_edges(tier_a, tier_b);

        SimulatedReading {
            tick: self.tick,
            phase: self.phase,
            level_a_cm: self.level_a,
            level_b_cm: self.level_b,
            flow_m3s: self.flow,
            is_raining: self.is_raining,
            tier_a,
            tier_b,
            message: self.a_message(tier_a),
            time_until_a_danger_secs,
        }
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.steps_in_phase = 0;
    }

    fn noise(&mut self, amplitude: f64) -> f64 {
        (self.rng.r#gen::<f64>() - 0.5) * amplitude
    }

    fn step_phase(&mut self) {
        let c = self.config.clone();
        match self.phase {
            Phase::Normal => {
                self.level_b += self.noise(NORMAL_LEVEL_NOISE);
                self.level_b -= (self.level_b - c.base_level_b_cm) * MEAN_REVERSION;
                self.flow += self.noise(NORMAL_FLOW_NOISE);
                self.flow -= (self.flow - c.base_flow_m3s) * MEAN_REVERSION;
                self.is_raining = false;
            }
            Phase::Raining => {
                self.steps_in_phase += 1;
                if self.steps_in_phase >= c.rain_duration_steps {
                    self.enter(Phase::Rising);
                    logging::warn(Component::Simulator, Some("RISING"), "water starting to rise");
                }
            }
            Phase::Rising => {
                let remaining = c.rise_steps.saturating_sub(self.steps_in_phase);
                if remaining > 0 {
                    self.level_b += (c.peak_level_b_cm - self.level_b) / remaining as f64;
                    self.flow += (c.peak_flow_m3s - self.flow) / remaining as f64;
                }
                self.steps_in_phase += 1;
                if self.steps_in_phase >= c.rise_steps {
                    self.enter(Phase::Peak);
                }
            }
            Phase::Peak => {
                self.level_b = c.peak_level_b_cm + self.noise(PEAK_LEVEL_NOISE);
                self.flow = c.peak_flow_m3s + self.noise(PEAK_FLOW_NOISE);
                self.steps_in_phase += 1;
                if self.steps_in_phase >= c.peak_steps {
                    self.enter(Phase::Falling);
                }
            }
            Phase::Falling => {
                let remaining = c.fall_steps.saturating_sub(self.steps_in_phase);
                if remaining > 0 {
                    self.level_b -= (self.level_b - c.base_level_b_cm) / remaining as f64;
                    self.flow -= (self.flow - c.base_flow_m3s) / remaining as f64;
                }
                if (self.level_b - c.base_level_b_cm).abs() < c.rain_clear_epsilon_cm {
                    self.is_raining = false;
                }
                self.steps_in_phase += 1;
                if self.steps_in_phase >= c.fall_steps {
                    self.enter(Phase::Normal);
                    self.danger_countdown = 0.0;
                    self.is_raining = false;
                    logging::info(Component::Simulator, Some("NORMAL"), "flood cycle finished");
                }
            }
        }
    }

    /// Pushes this tick's B; A takes the value from `a_lag_steps` ticks ago
    /// once that much history exists.
    fn step_level_a(&mut self) {
        self.b_history.push_back(self.level_b);
        if self.b_history.len() > self.config.a_lag_steps {
            if let Some(lagged) = self.b_history.pop_front() {
                self.level_a = lagged;
                return;
            }
        }
        let base_a = self.config.base_level_a_cm;
        self.level_a += self.noise(NORMAL_LEVEL_NOISE);
        self.level_a -= (self.level_a - base_a) * MEAN_REVERSION;
    }

    fn a_message(&self, tier: FloodStatus) -> String {
        match tier {
            FloodStatus::Normal => "Safe".to_string(),
            FloodStatus::Watch => format!("Level A above {:.0}cm!", self.cutoffs_a.watch_cm),
            FloodStatus::HighWatch => {
                format!("Level A above {:.0}cm!", self.cutoffs_a.high_watch_cm)
            }
            FloodStatus::Danger => {
                format!("Level A ABOVE THRESHOLD {:.0}cm!", self.cutoffs_a.danger_cm)
            }
        }
    }

    fn log_tier_edges(&mut self, tier_a: FloodStatus, tier_b: FloodStatus) {
        if let Some(change) = self.watch_a.observe(tier_a) {
            let message = if change.is_recovery() {
                format!("level A back down to {:.1}cm", self.level_a)
            } else {
                format!("{} (level {:.1}cm)", self.a_message(tier_a), self.level_a)
            };
            log_edge("A", change.to, &message);
        }

        if let Some(change) = self.watch_b.observe(tier_b) {
            let message = match change.to {
                FloodStatus::Normal => "level B has receded".to_string(),
                FloodStatus::Danger => format!(
                    "level B at peak {:.0}cm (level {:.1}cm)",
                    self.cutoffs_b.danger_cm, self.level_b
                ),
                FloodStatus::HighWatch => format!(
                    "level B above {:.0}cm (level {:.1}cm)",
                    self.cutoffs_b.high_watch_cm, self.level_b
                ),
                FloodStatus::Watch => format!(
                    "level B above {:.0}cm (level {:.1}cm)",
                    self.cutoffs_b.watch_cm, self.level_b
                ),
            };
            log_edge("B", change.to, &message);
        }
    }
}

fn log_edge(gauge: &str, tier: FloodStatus, message: &str) {
    match tier {
        FloodStatus::Normal => logging::info(Component::Simulator, Some(gauge), message),
        FloodStatus::Watch | FloodStatus::HighWatch => {
            logging::warn(Component::Simulator, Some(gauge), message)
        }
        FloodStatus::Danger => logging::error(Component::Simulator, Some(gauge), message),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
