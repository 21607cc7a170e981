use clap::Parser;
use flood_alert_service::config::FloodConfig;
use flood_alert_service::logging::{self, Component};
use flood_alert_service::simulator::{Generator, ReportSender, SensorReport};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Synthetic water-level sensor. Posts one reading per tick to the server.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Start in the raining phase instead of waiting for random rain
    #[arg(long)]
    flood: bool,

    /// `/update` endpoint to post to
    #[arg(long)]
    server_url: Option<String>,

    /// Tick period in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// PRNG seed for a reproducible series
    #[arg(long)]
    seed: Option<u64>,

    /// Config file (defaults to $FLOOD_ALERT_CONFIG or ./flood_alert.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many ticks
    #[arg(long)]
    ticks: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init_from_env();

    let mut config = FloodConfig::load(args.config.as_deref())?.simulator;
    if let Some(url) = args.server_url {
        config.server_url = url;
    }
    if let Some(interval) = args.interval_ms {
        config.update_interval_ms = interval;
    }
    let interval = Duration::from_millis(config.update_interval_ms);

    let sender = ReportSender::new(&config.server_url, interval.max(Duration::from_secs(1)))?;
    let mut generator = Generator::new(config, args.seed);
    if args.flood {
        generator.start_flood();
    }

    logging::info(
        Component::Simulator,
        None,
        &format!("posting to {} every {:?}", sender.url(), interval),
    );

    let mut sent = 0u64;
    loop {
        let started = Instant::now();
        let reading = generator.tick();
        let report = SensorReport::from(&reading);

        match sender.send(&report) {
            Ok(()) => {
                let countdown = report
                    .time_until_a_danger
                    .map(|s| format!("{:.0}s", s))
                    .unwrap_or_else(|| "N/A".to_string());
                logging::info(
                    Component::Simulator,
                    Some(&reading.phase.to_string()),
                    &format!(
                        "sent A:{:.1} B:{:.1} rain:{} flow:{:.2} countdown:{}",
                        report.level_a,
                        report.level_b,
                        if report.is_raining { "yes" } else { "no" },
                        report.flow,
                        countdown
                    ),
                );
            }
            Err(e) => logging::log_dependency_failure(Component::Http, "post reading", &e),
        }

        sent += 1;
        if args.ticks.is_some_and(|limit| sent >= limit) {
            return Ok(());
        }
        std::thread::sleep(interval.saturating_sub(started.elapsed()));
    }
}
