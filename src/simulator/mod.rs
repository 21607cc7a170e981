pub mod generator;
pub mod report;

pub use generator::{Generator, Phase, SimulatedReading};
pub use report::{ReportSender, SensorReport};
