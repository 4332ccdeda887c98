use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-key minimum spacing between admitted requests.
///
/// Each instance owns its own bookkeeping, so two throttles never interfere
/// with one another.
pub struct Throttle<C: Clock> {
    clock: C,
    min_interval: Duration,
    last_admitted: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl<C: Clock> Throttle<C> {
    pub fn new(clock: C, min_interval: Duration) -> Self {
        Self {
            clock,
            min_interval,
            last_admitted: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `key` may go ahead now; otherwise how long it still has to
    /// wait. Does not count as an admission.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        let now = self.clock.now();
        let last = self
            .last_admitted
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        match last.get(key) {
            Some(previous) if now - *previous < self.min_interval => {
                Err(self.min_interval - (now - *previous))
            }
            _ => Ok(()),
        }
    }

    /// Start `key`'s interval from now.
    pub fn record(&self, key: &str) {
        let now = self.clock.now();
        self.last_admitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), now);
    }

    /// Drop entries old enough that they can no longer refuse anything.
    pub fn prune(&self) {
        let now = self.clock.now();
        let min_interval = self.min_interval;
        self.last_admitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, at| now - *at < min_interval);
    }

    pub fn tracked(&self) -> usize {
        self.last_admitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn throttle() -> (ManualClock, Throttle<ManualClock>) {
        let clock = ManualClock::new(Utc::now());
        let throttle = Throttle::new(clock.clone(), Duration::milliseconds(1000));
        (clock, throttle)
    }

    #[test]
    fn refuses_until_interval_elapses() {
        let (clock, throttle) = throttle();

        assert!(throttle.check("u1").is_ok());
        throttle.record("u1");

        clock.advance(Duration::milliseconds(400));
        assert_eq!(throttle.check("u1"), Err(Duration::milliseconds(600)));

        clock.advance(Duration::milliseconds(600));
        assert!(throttle.check("u1").is_ok());
    }

    #[test]
    fn checking_alone_does_not_start_the_interval() {
        let (_clock, throttle) = throttle();

        assert!(throttle.check("u1").is_ok());
        assert!(throttle.check("u1").is_ok());
        assert_eq!(throttle.tracked(), 0);
    }

    #[test]
    fn keys_are_independent() {
        let (_clock, throttle) = throttle();

        throttle.record("u1");
        assert!(throttle.check("u2").is_ok());
        assert!(throttle.check("u1").is_err());
    }

    #[test]
    fn instances_do_not_share_state() {
        let clock = ManualClock::new(Utc::now());
        let a = Throttle::new(clock.clone(), Duration::seconds(1));
        let b = Throttle::new(clock, Duration::seconds(1));

        a.record("u1");
        assert!(a.check("u1").is_err());
        assert!(b.check("u1").is_ok());
    }

    #[test]
    fn prune_forgets_expired_keys() {
        let (clock, throttle) = throttle();
        throttle.record("u1");
        throttle.record("u2");

        clock.advance(Duration::seconds(2));
        throttle.prune();

        assert_eq!(throttle.tracked(), 0);
    }
}
