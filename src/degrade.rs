/// Graceful degradation for calls to external collaborators.
///
/// Predictor, store, notifier and sync-mirror failures never fail a request.
/// Every such call goes through `or_fallback`, which logs the failure at the
/// level its classification calls for and substitutes a default.

use crate::logging::{self, Component};

/// Returns the success value, or logs the error and returns `fallback`.
pub fn or_fallback<T, E>(result: Result<T, E>, component: Component, operation: &str, fallback: T) -> T
where
    E: std::error::Error,
{
    match result {
        Ok(value) => value,
        Err(err) => {
            logging::log_dependency_failure(component, operation, &err);
            fallback
        }
    }
}

/// Like `or_fallback`, for calls whose success value is not needed.
/// Returns whether the call succeeded.
pub fn succeeded<T, E>(result: Result<T, E>, component: Component, operation: &str) -> bool
where
    E: std::error::Error,
{
    or_fallback(result.map(|_| true), component, operation, false)
}
