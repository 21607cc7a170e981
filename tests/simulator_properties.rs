/// Properties of the synthetic flood waveform.
///
/// Run with: cargo test --test simulator_properties

use flood_alert_service::config::SimulatorConfig;
use flood_alert_service::model::FloodStatus;
use flood_alert_service::simulator::{Generator, Phase, SimulatedReading};

fn no_random_rain() -> SimulatorConfig {
    SimulatorConfig {
        rain_probability: 0.0,
        ..SimulatorConfig::default()
    }
}

fn run(generator: &mut Generator, ticks: usize) -> Vec<SimulatedReading> {
    (0..ticks).map(|_| generator.tick()).collect()
}

// ---------------------------------------------------------------------------
// Phase budgets
// ---------------------------------------------------------------------------

#[test]
fn test_raining_lasts_exactly_rain_duration_steps() {
    let config = no_random_rain();
    for seed in [1, 2, 3, 99, 12345] {
        let mut g = Generator::new(config.clone(), Some(seed));
        g.start_flood();
        let readings = run(&mut g, config.rain_duration_steps as usize);

        let (last, before) = readings.split_last().unwrap();
        assert!(before.iter().all(|r| r.phase == Phase::Raining), "seed {}", seed);
        assert_eq!(last.phase, Phase::Rising, "seed {}", seed);
        assert!(readings.iter().all(|r| r.is_raining));
    }
}

#[test]
fn test_phase_sequence_and_budgets() {
    let c = no_random_rain();
    let mut g = Generator::new(c.clone(), Some(8));
    g.start_flood();
    let total = (c.rain_duration_steps + c.rise_steps + c.peak_steps + c.fall_steps) as usize;
    let readings = run(&mut g, total);

    // Phase after each tick; a phase's last tick reports the next phase.
    let count = |p: Phase| readings.iter().filter(|r| r.phase == p).count();
    assert_eq!(count(Phase::Raining), c.rain_duration_steps as usize - 1);
    assert_eq!(count(Phase::Rising), c.rise_steps as usize);
    assert_eq!(count(Phase::Peak), c.peak_steps as usize);
    assert_eq!(count(Phase::Falling), c.fall_steps as usize);
    assert_eq!(count(Phase::Normal), 1);
    assert_eq!(readings.last().unwrap().phase, Phase::Normal);
}

#[test]
fn test_rain_flag_clears_while_falling() {
    let c = no_random_rain();
    let mut g = Generator::new(c.clone(), Some(17));
    g.start_flood();
    let total = (c.rain_duration_steps + c.rise_steps + c.peak_steps + c.fall_steps) as usize;
    let readings = run(&mut g, total);

    let falling: Vec<&SimulatedReading> =
        readings.iter().filter(|r| r.phase == Phase::Falling).collect();
    assert!(falling.first().unwrap().is_raining);
    assert!(!readings.last().unwrap().is_raining);
}

// ---------------------------------------------------------------------------
// Lag queue
// ---------------------------------------------------------------------------

#[test]
fn test_level_a_replays_level_b_after_lag() {
    let c = no_random_rain();
    let lag = c.a_lag_steps;
    let mut g = Generator::new(c, Some(4242));
    g.start_flood();
    let readings = run(&mut g, 150);

    for t in lag..readings.len() {
        assert_eq!(
            readings[t].level_a_cm.to_bits(),
            readings[t - lag].level_b_cm.to_bits(),
            "tick {}",
            t
        );
    }
}

#[test]
fn test_level_a_walks_near_base_before_queue_fills() {
    let c = no_random_rain();
    let mut g = Generator::new(c.clone(), Some(5));
    let readings = run(&mut g, c.a_lag_steps);
    for r in &readings {
        assert!((r.level_a_cm - c.base_level_a_cm).abs() < 2.0);
    }
}

// ---------------------------------------------------------------------------
// Clamping and countdown
// ---------------------------------------------------------------------------

#[test]
fn test_levels_stay_within_bounds() {
    let config = SimulatorConfig {
        // Frequent floods so every phase is exercised many times.
        rain_probability: 0.2,
        ..SimulatorConfig::default()
    };
    let mut g = Generator::new(config.clone(), Some(2024));
    for r in run(&mut g, 5_000) {
        assert!((0.0..=config.peak_level_b_cm).contains(&r.level_b_cm));
        assert!((0.0..=config.peak_level_a_cm).contains(&r.level_a_cm));
        assert!(r.flow_m3s >= 0.0);
    }
}

#[test]
fn test_countdown_only_outside_normal() {
    let mut g = Generator::new(no_random_rain(), Some(6));
    assert!(run(&mut g, 20).iter().all(|r| r.time_until_a_danger_secs.is_none()));

    g.start_flood();
    let flood = run(&mut g, 10);
    assert!(flood.iter().all(|r| r.time_until_a_danger_secs.is_some()));
}

// ---------------------------------------------------------------------------
// Tier classification
// ---------------------------------------------------------------------------

#[test]
fn test_high_watch_reaches_b_then_a_after_lag() {
    let c = no_random_rain();
    let mut g = Generator::new(c.clone(), Some(31));
    g.start_flood();
    let readings = run(&mut g, 100);

    let first_b_high = readings
        .iter()
        .position(|r| r.tier_b >= FloodStatus::HighWatch)
        .expect("B reaches high watch during the rise");
    let first_a_high = readings
        .iter()
        .position(|r| r.tier_a >= FloodStatus::HighWatch)
        .expect("A follows B");
    assert_eq!(first_a_high, first_b_high + c.a_lag_steps);
}
