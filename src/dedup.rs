//! Duplicate-Window Guard
//!
//! Decides whether a new result for a (strategy, entity) pair is too close to
//! the previous one to be worth storing. Stateless: the caller supplies the
//! previous timestamp from durable storage.

use std::time::{Duration, SystemTime};

/// `true` when `prior` lies less than `window` before `now`.
///
/// No prior record never suppresses. A prior timestamp later than `now`
/// (clock skew between writers) is treated as inside the window.
pub fn should_suppress(prior: Option<SystemTime>, now: SystemTime, window: Duration) -> bool {
    let Some(prior) = prior else {
        return false;
    };
    match now.duration_since(prior) {
        Ok(elapsed) => elapsed < window,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_is_not_suppressed() {
        let now = SystemTime::now();
        let window = Duration::from_secs(60);

        assert!(!should_suppress(Some(now - window), now, window));
        assert!(should_suppress(Some(now - window + Duration::from_millis(1)), now, window));
        assert!(!should_suppress(None, now, window));
    }

    #[test]
    fn future_prior_is_suppressed() {
        let now = SystemTime::now();
        assert!(should_suppress(
            Some(now + Duration::from_secs(5)),
            now,
            Duration::from_secs(60)
        ));
    }
}
