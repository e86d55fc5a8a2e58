//! Ready-wait polling

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default time between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("timed out after {elapsed:?} waiting for {what}")]
    TimedOut { what: String, elapsed: Duration },
    #[error("timed out after {elapsed:?} waiting for {what}: {last_error}")]
    LastError {
        what: String,
        elapsed: Duration,
        last_error: String,
    },
}

/// Poll `check` every `interval` until it reports `Ok(true)` or `timeout`
/// elapses.
///
/// Errors from `check` do not stop polling. If the deadline passes after at
/// least one error, the most recent error is returned.
pub async fn poll_until<F, Fut, E>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> Result<(), WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: Display,
{
    let start = Instant::now();
    let mut last_error: Option<String> = None;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match check().await {
            Ok(true) => {
                debug!(what, attempt, "wait condition met");
                return Ok(());
            }
            Ok(false) => trace!(what, attempt, "wait condition not yet met"),
            Err(e) => {
                debug!(what, attempt, error = %e, "poll attempt failed");
                last_error = Some(e.to_string());
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            let what = what.to_string();
            return Err(match last_error {
                Some(last_error) => WaitError::LastError {
                    what,
                    elapsed,
                    last_error,
                },
                None => WaitError::TimedOut { what, elapsed },
            });
        }

        tokio::time::sleep(interval.min(timeout - elapsed)).await;
    }
}

/// Parse durations like `15m`, `1h30m`, `30s` or a raw number of seconds
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let invalid = || format!("invalid duration '{}', expected e.g. 1h, 15m, 1h30m, 30s", s);

    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in s.chars() {
        let unit: u64 = match c {
            '0'..='9' => {
                digits.push(c);
                continue;
            }
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(invalid()),
        };
        let n: u64 = digits.parse().map_err(|_| invalid())?;
        total = n
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(invalid)?;
        digits.clear();
    }

    // Empty input or a trailing number without a unit
    if s.is_empty() || !digits.is_empty() {
        return Err(invalid());
    }
    Ok(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("15m"), Ok(Duration::from_secs(900)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration(" 45 "), Ok(Duration::from_secs(45)));
        assert_eq!(parse_duration("0s"), Ok(Duration::ZERO));
        assert!(parse_duration("fifteen minutes").is_err());
        assert!(parse_duration("-1m").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_parse_compound_duration() {
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("1h30m15s"), Ok(Duration::from_secs(5415)));
        assert_eq!(parse_duration("90"), Ok(Duration::from_secs(90)));
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("1h30").is_err());
        assert!(parse_duration("1h 30m").is_err());
    }

    #[test]
    fn test_parse_duration_overflow_is_error() {
        assert!(parse_duration("9999999999999999h").is_err());
        assert!(parse_duration("5124095576030432h").is_err());
        assert!(parse_duration("18446744073709551615s1s").is_err());
        assert!(parse_duration("99999999999999999999").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_succeeds_after_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = poll_until(
            "cluster",
            Duration::from_secs(60),
            Duration::from_secs(10),
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, String>(n >= 3)
            },
        )
        .await;

        assert_eq!(result, Ok(()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_returns_last_error_on_timeout() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = poll_until(
            "cluster",
            Duration::from_secs(30),
            Duration::from_secs(10),
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err::<bool, _>(format!("attempt {} failed", n))
            },
        )
        .await;

        match result {
            Err(WaitError::LastError { last_error, .. }) => {
                assert_eq!(last_error, format!("attempt {} failed", calls.load(Ordering::SeqCst)));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_times_out_without_error() {
        let result = poll_until(
            "management cluster",
            Duration::from_secs(20),
            Duration::from_secs(10),
            || async { Ok::<_, String>(false) },
        )
        .await;

        assert!(matches!(result, Err(WaitError::TimedOut { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_checks_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = poll_until("x", Duration::ZERO, Duration::from_secs(10), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(false)
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
