//! Flood alert service: the `/update` alert evaluator, its HTTP shell and
//! the synthetic sensor that feeds it.

pub mod alert;
pub mod config;
pub mod db;
pub mod degrade;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod notify;
pub mod predictor;
pub mod server;
pub mod simulator;
pub mod store;
pub mod sync;
