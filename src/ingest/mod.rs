pub mod update;

pub use update::{parse_update, UpdatePayload};
