//! Best-effort execution of non-critical side operations.

use std::fmt::Display;

/// Runs the policy for non-critical operations in one place: log the
/// failure and continue.
///
/// Used for session-close-on-dispose, flag updates, and notification
/// sends, where losing one write degrades accuracy but must never crash
/// the host process.
pub fn best_effort<T, E: Display>(operation: &'static str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(operation, error = %error, "non-critical operation failed");
            None
        }
    }
}
