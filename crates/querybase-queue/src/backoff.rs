//! Exponential backoff between retries (§4.10 "exponential backoff
//! between retries").

use chrono::{DateTime, Duration as ChronoDuration, Utc};

const MAX_DELAY_SECS: i64 = 300;

/// `retry_at = now + min(2^(attempt-1), MAX_DELAY_SECS)` seconds.
#[must_use]
pub fn next_retry_at(attempt: u32) -> DateTime<Utc> {
    let exponent = attempt.saturating_sub(1).min(32);
    let delay_secs = 2_i64.saturating_pow(exponent).min(MAX_DELAY_SECS);
    Utc::now() + ChronoDuration::seconds(delay_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_with_attempt() {
        let now = Utc::now();
        let first = next_retry_at(1) - now;
        let third = next_retry_at(3) - now;
        assert!(third > first);
    }

    #[test]
    fn delay_is_capped() {
        let now = Utc::now();
        let far = next_retry_at(40) - now;
        assert!(far.num_seconds() <= MAX_DELAY_SECS + 1);
    }
}
