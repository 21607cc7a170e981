pub mod debounce;
pub mod evaluator;
pub mod messages;
pub mod rate;
pub mod thresholds;
