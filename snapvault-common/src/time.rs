//! Timestamp and timeout utilities

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Start of the rolling 24-hour window ending at `at`
pub fn day_window_start(at: DateTime<Utc>) -> DateTime<Utc> {
    at - ChronoDuration::hours(24)
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Returned when an operation did not finish within its budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Operation timed out after {0}ms")]
pub struct TimedOut(pub u64);

/// Race `future` against a timer of `millis` milliseconds.
///
/// `millis == 0` disables the timer and simply awaits the future.
/// The future is dropped (cancelled) when the timer wins.
pub async fn with_timeout<F>(millis: u64, future: F) -> Result<F::Output, TimedOut>
where
    F: Future,
{
    if millis == 0 {
        return Ok(future.await);
    }

    tokio::time::timeout(millis_to_duration(millis), future)
        .await
        .map_err(|_| TimedOut(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_day_window_start_is_24_hours_back() {
        let at = now();
        let start = day_window_start(at);
        assert_eq!((at - start).num_hours(), 24);
    }

    #[test]
    fn test_millis_to_duration_one_second() {
        let duration = millis_to_duration(1000);
        assert_eq!(duration, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_with_timeout_returns_output_when_fast() {
        let result = with_timeout(500, async { 42 }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_with_timeout_zero_disables_timer() {
        let result = with_timeout(0, async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            "done"
        })
        .await;
        assert_eq!(result, Ok("done"));
    }

    #[tokio::test]
    async fn test_with_timeout_expires_on_slow_future() {
        let result = with_timeout(10, async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            "late"
        })
        .await;
        assert_eq!(result, Err(TimedOut(10)));
    }

    #[test]
    fn test_timed_out_message_names_budget() {
        assert_eq!(TimedOut(7000).to_string(), "Operation timed out after 7000ms");
    }
}
