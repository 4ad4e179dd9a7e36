//! Backoff engine
//!
//! Computes retry timing for jobs denied by quota. The delay doubles with
//! every denial and is capped, so a blocked job is re-checked at a bounded,
//! predictable cadence.

use chrono::{DateTime, Utc};
use sluice_core::domain::job::{JobRecord, JobState};
use std::time::Duration;

/// Capped exponential backoff policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffEngine {
    base: Duration,
    max_delay: Duration,
}

impl BackoffEngine {
    pub fn new(base: Duration, max_delay: Duration) -> Self {
        Self { base, max_delay }
    }

    /// `min(base * 2^(n-1), max_delay)`; `delay(0)` is zero
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }

    /// Puts a denied job into `Backoff`
    pub fn on_denied(&self, job: &JobRecord, now: DateTime<Utc>, reason: &str) -> JobRecord {
        let mut next = job.clone();
        next.attempt_count = job.attempt_count.saturating_add(1);

        let delay = chrono::Duration::from_std(self.delay(next.attempt_count))
            .unwrap_or(chrono::Duration::MAX);
        let eligible_at = now
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        next.next_eligible_time = Some(eligible_at);
        next.last_error = Some(reason.to_string());
        next.state = JobState::Backoff;
        next
    }

    /// True once the backoff window of `job` has elapsed
    pub fn is_eligible(&self, job: &JobRecord, now: DateTime<Utc>) -> bool {
        match job.next_eligible_time {
            Some(at) => now >= at,
            None => true,
        }
    }

    /// Hands a job over to the cluster
    pub fn on_admitted(&self, job: &JobRecord) -> JobRecord {
        let mut next = job.clone();
        next.next_eligible_time = None;
        next.last_error = None;
        next.state = JobState::Scheduled;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn engine() -> BackoffEngine {
        BackoffEngine::new(Duration::from_secs(5), Duration::from_secs(300))
    }

    #[test]
    fn test_delay_doubles_until_cap() {
        let engine = engine();
        assert_eq!(engine.delay(1), Duration::from_secs(5));
        assert_eq!(engine.delay(2), Duration::from_secs(10));
        assert_eq!(engine.delay(3), Duration::from_secs(20));
        assert_eq!(engine.delay(7), Duration::from_secs(300));
        assert_eq!(engine.delay(8), Duration::from_secs(300));
    }

    #[test]
    fn test_delay_is_monotonic_and_bounded() {
        let engine = engine();
        let mut previous = Duration::ZERO;
        for attempt in 0..=200 {
            let delay = engine.delay(attempt);
            assert!(delay >= previous, "delay shrank at attempt {}", attempt);
            assert!(delay <= Duration::from_secs(300));
            previous = delay;
        }
        assert_eq!(engine.delay(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn test_on_denied_sets_backoff_window() {
        let engine = engine();
        let now = Utc::now();
        let job = JobRecord::new(Uuid::new_v4(), 1, json!({}), now);

        let first = engine.on_denied(&job, now, "no room");
        assert_eq!(first.state, JobState::Backoff);
        assert_eq!(first.attempt_count, 1);
        assert_eq!(first.next_eligible_time, Some(now + chrono::Duration::seconds(5)));
        assert_eq!(first.last_error.as_deref(), Some("no room"));

        let second = engine.on_denied(&first, now, "still no room");
        assert_eq!(second.attempt_count, 2);
        assert_eq!(second.next_eligible_time, Some(now + chrono::Duration::seconds(10)));
    }

    #[test]
    fn test_eligibility_boundary() {
        let engine = engine();
        let now = Utc::now();
        let job = engine.on_denied(&JobRecord::new(Uuid::new_v4(), 1, json!({}), now), now, "x");

        assert!(!engine.is_eligible(&job, now));
        assert!(!engine.is_eligible(&job, now + chrono::Duration::milliseconds(4999)));
        assert!(engine.is_eligible(&job, now + chrono::Duration::seconds(5)));
    }

    #[test]
    fn test_on_admitted_clears_backoff() {
        let engine = engine();
        let now = Utc::now();
        let denied = engine.on_denied(&JobRecord::new(Uuid::new_v4(), 1, json!({}), now), now, "x");

        let admitted = engine.on_admitted(&denied);
        assert_eq!(admitted.state, JobState::Scheduled);
        assert_eq!(admitted.attempt_count, 1);
        assert!(admitted.next_eligible_time.is_none());
        assert!(admitted.last_error.is_none());
    }
}
