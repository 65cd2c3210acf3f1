use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Remembers when each phone was last asked for its status.
#[derive(Debug)]
pub struct RateLimitLedger {
    cooldown: Duration,
    last_requests: HashMap<String, Instant>,
}

impl RateLimitLedger {
    pub fn new(cooldown: Duration) -> Self {
        RateLimitLedger {
            cooldown,
            last_requests: HashMap::new(),
        }
    }

    /// Records a request at `now` if the cooldown for this phone has passed, returns whether it did.
    pub fn try_acquire(&mut self, phone_id: &str, now: Instant) -> bool {
        if self.remaining(phone_id, now).is_some() {
            return false;
        }

        self.last_requests.insert(phone_id.to_string(), now);
        true
    }

    pub fn remaining(&self, phone_id: &str, now: Instant) -> Option<Duration> {
        let last_request = self.last_requests.get(phone_id)?;
        let elapsed = now.saturating_duration_since(*last_request);
        (elapsed < self.cooldown).then(|| self.cooldown - elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const COOLDOWN: Duration = Duration::from_millis(10_000);

    #[test]
    fn try_acquire_allows_the_first_request() {
        let mut ledger = RateLimitLedger::new(COOLDOWN);

        assert!(ledger.try_acquire("A", Instant::now()));
    }

    #[rstest]
    #[case(Duration::ZERO, false)]
    #[case(Duration::from_millis(9_999), false)]
    #[case(Duration::from_millis(10_000), true)]
    #[case(Duration::from_secs(60), true)]
    fn try_acquire_enforces_the_cooldown(#[case] elapsed: Duration, #[case] expected: bool) {
        let mut ledger = RateLimitLedger::new(COOLDOWN);
        let start = Instant::now();
        ledger.try_acquire("A", start);

        assert_eq!(ledger.try_acquire("A", start + elapsed), expected);
    }

    #[test]
    fn try_acquire_tracks_phones_independently() {
        let mut ledger = RateLimitLedger::new(COOLDOWN);
        let now = Instant::now();

        assert!(ledger.try_acquire("A", now));
        assert!(ledger.try_acquire("B", now));
        assert!(!ledger.try_acquire("A", now));
    }

    #[test]
    fn skipped_requests_do_not_extend_the_cooldown() {
        let mut ledger = RateLimitLedger::new(COOLDOWN);
        let start = Instant::now();

        ledger.try_acquire("A", start);
        ledger.try_acquire("A", start + Duration::from_secs(5));

        assert!(ledger.try_acquire("A", start + COOLDOWN));
    }

    #[test]
    fn no_two_requests_are_closer_than_the_cooldown() {
        let mut ledger = RateLimitLedger::new(COOLDOWN);
        let start = Instant::now();

        let granted = (0..100)
            .map(|step| start + Duration::from_millis(step * 1_700))
            .filter(|at| ledger.try_acquire("A", *at))
            .collect::<Vec<_>>();

        assert!(granted.windows(2).all(|pair| pair[1] - pair[0] >= COOLDOWN));
        assert_eq!(granted.len(), 17);
    }

    #[test]
    fn remaining_reports_the_time_left() {
        let mut ledger = RateLimitLedger::new(COOLDOWN);
        let start = Instant::now();
        ledger.try_acquire("A", start);

        assert_eq!(ledger.remaining("A", start + Duration::from_secs(4)), Some(Duration::from_secs(6)));
        assert_eq!(ledger.remaining("B", start), None);
    }
}
