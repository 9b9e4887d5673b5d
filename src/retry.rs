//! Retry logic for transient replication failures.
//!
//! Wraps an operation that yields `(return_code, error_message, result)`
//! and retries retryable failures with exponential backoff. All outcomes
//! flow through [`RetryResult`]; the driver never panics.

use std::thread;
use std::time::Duration;

use crate::observability::Logger;

/// rsync exit codes that are considered retryable (transient failures).
pub const RETRYABLE_ERROR_CODES: [i32; 6] = [
    10, // Error in socket I/O
    11, // Error in file I/O
    12, // Error in rsync protocol data stream
    23, // Partial transfer due to error
    24, // Partial transfer due to vanished source files
    30, // Timeout in data send/receive
];

/// Check if a replicator return code is transient and should be retried.
pub fn is_retryable_error(return_code: i32) -> bool {
    RETRYABLE_ERROR_CODES.contains(&return_code)
}

/// Calculate the exponential backoff delay for a retry attempt.
///
/// Uses `base_delay * 2^(attempt-1)`, capped at `max_delay`.
/// `attempt` is 1-based.
pub fn calculate_backoff_delay(attempt: u32, base_delay: f64, max_delay: f64) -> f64 {
    let delay = base_delay * 2f64.powi(attempt.saturating_sub(1) as i32);
    delay.min(max_delay)
}

/// Information about a single retry attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    pub attempt_number: u32,
    pub error_code: i32,
    pub error_message: String,
    pub delay_seconds: f64,
}

/// Result of a retried operation.
#[derive(Debug, Clone, Default)]
pub struct RetryResult {
    pub success: bool,
    pub final_return_code: i32,
    pub final_error_message: Option<String>,
    pub attempts: Vec<RetryAttempt>,
    pub total_attempts: u32,
}

impl RetryResult {
    /// Format the retry history as a human-readable string.
    pub fn retry_history(&self) -> String {
        if self.attempts.is_empty() {
            return "No retries attempted".to_string();
        }

        let mut lines = vec![format!("Retry history ({} attempts):", self.attempts.len())];
        for attempt in &self.attempts {
            lines.push(format!(
                "  Attempt {}: error code {} - {} (waited {:.1}s)",
                attempt.attempt_number,
                attempt.error_code,
                attempt.error_message,
                attempt.delay_seconds
            ));
        }
        lines.join("\n")
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub base_delay_seconds: f64,
    /// Maximum delay between retries
    pub max_delay_seconds: f64,
    /// Wall-clock timeout for a single replicator run
    pub rsync_timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_seconds: 5.0,
            max_delay_seconds: 300.0,
            rsync_timeout_seconds: 3600,
        }
    }
}

/// Execute an operation with retry logic and exponential backoff.
///
/// The operation returns `(return_code, error_message, result)`:
/// code 0 is success and returns immediately; a non-retryable code fails
/// immediately with zero retry records; a retryable code sleeps for the
/// backoff delay and tries again until `max_retries` retries have been
/// spent. `on_retry` is invoked before each sleep.
///
/// Returns the [`RetryResult`] and the last operation result.
pub fn retry_with_backoff<T, F, C>(
    mut operation: F,
    max_retries: u32,
    base_delay: f64,
    max_delay: f64,
    mut on_retry: C,
) -> (RetryResult, Option<T>)
where
    F: FnMut() -> (i32, String, T),
    C: FnMut(&RetryAttempt),
{
    let mut attempts: Vec<RetryAttempt> = Vec::new();

    // +1 because the first attempt is not a retry
    for attempt in 1..=max_retries + 1 {
        let (return_code, error_message, result) = operation();

        if return_code == 0 {
            return (
                RetryResult {
                    success: true,
                    final_return_code: 0,
                    final_error_message: None,
                    attempts,
                    total_attempts: attempt,
                },
                Some(result),
            );
        }

        if !is_retryable_error(return_code) {
            Logger::debug(
                "RETRY_NOT_RETRYABLE",
                &[
                    ("code", &return_code.to_string()),
                    ("message", &error_message),
                ],
            );
            return (
                RetryResult {
                    success: false,
                    final_return_code: return_code,
                    final_error_message: Some(error_message),
                    attempts,
                    total_attempts: attempt,
                },
                Some(result),
            );
        }

        if attempt > max_retries {
            Logger::error(
                "RETRY_EXHAUSTED",
                &[
                    ("retries", &max_retries.to_string()),
                    ("code", &return_code.to_string()),
                    ("message", &error_message),
                ],
            );
            return (
                RetryResult {
                    success: false,
                    final_return_code: return_code,
                    final_error_message: Some(error_message),
                    attempts,
                    total_attempts: attempt,
                },
                Some(result),
            );
        }

        let delay = calculate_backoff_delay(attempt, base_delay, max_delay);
        let retry_attempt = RetryAttempt {
            attempt_number: attempt,
            error_code: return_code,
            error_message: error_message.clone(),
            delay_seconds: delay,
        };
        attempts.push(retry_attempt.clone());

        Logger::warn(
            "RETRY_ATTEMPT",
            &[
                ("attempt", &attempt.to_string()),
                ("max_retries", &max_retries.to_string()),
                ("code", &return_code.to_string()),
                ("message", &error_message),
                ("delay_seconds", &format!("{:.1}", delay)),
            ],
        );

        on_retry(&retry_attempt);

        thread::sleep(Duration::from_secs_f64(delay));
    }

    // Unreachable: every loop iteration returns or continues, and the
    // final iteration always returns.
    (
        RetryResult {
            success: false,
            final_return_code: -1,
            final_error_message: Some("Unexpected retry loop exit".to_string()),
            attempts,
            total_attempts: max_retries + 1,
        },
        None,
    )
}
