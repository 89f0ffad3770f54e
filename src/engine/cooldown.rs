//! Per-symbol attempt cooldowns. A plain attempt uses the default window;
//! when a live position already exists the extended window applies.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct CooldownTracker {
    default_cooldown: Duration,
    position_cooldown: Duration,
    attempts: Mutex<HashMap<String, Instant>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CooldownVerdict {
    Ready,
    /// Rejected; remaining wait.
    Blocked(Duration),
}

impl CooldownTracker {
    pub fn new(default_cooldown: Duration, position_cooldown: Duration) -> Self {
        Self {
            default_cooldown,
            position_cooldown,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Check the window for a symbol. `has_position` selects the extended
    /// window. A blocked check extends the cooldown by restamping.
    pub fn check(&self, coin_symbol: &str, has_position: bool) -> CooldownVerdict {
        let window = if has_position {
            self.position_cooldown
        } else {
            self.default_cooldown
        };
        let mut attempts = self.attempts.lock().expect("cooldown map poisoned");
        let now = Instant::now();
        if let Some(last) = attempts.get(coin_symbol) {
            let elapsed = now.duration_since(*last);
            if elapsed < window {
                attempts.insert(coin_symbol.to_string(), now);
                return CooldownVerdict::Blocked(window - elapsed);
            }
        }
        CooldownVerdict::Ready
    }

    /// Record an attempt (successful or not) for a symbol.
    pub fn stamp(&self, coin_symbol: &str) {
        let mut attempts = self.attempts.lock().expect("cooldown map poisoned");
        attempts.insert(coin_symbol.to_string(), Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_is_ready() {
        let tracker = CooldownTracker::new(Duration::from_secs(300), Duration::from_secs(600));
        assert_eq!(tracker.check("HYPE", false), CooldownVerdict::Ready);
    }

    #[test]
    fn repeat_within_window_is_blocked() {
        let tracker = CooldownTracker::new(Duration::from_secs(300), Duration::from_secs(600));
        tracker.stamp("HYPE");
        assert!(matches!(
            tracker.check("HYPE", false),
            CooldownVerdict::Blocked(_)
        ));
    }

    #[test]
    fn blocked_check_extends_the_window() {
        let tracker = CooldownTracker::new(Duration::from_millis(50), Duration::from_millis(100));
        tracker.stamp("HYPE");
        let CooldownVerdict::Blocked(first_wait) = tracker.check("HYPE", false) else {
            panic!("expected blocked");
        };
        std::thread::sleep(Duration::from_millis(20));
        // Restamped at the failed check, so the remaining wait has reset.
        let CooldownVerdict::Blocked(second_wait) = tracker.check("HYPE", false) else {
            panic!("expected still blocked");
        };
        assert!(second_wait >= first_wait - Duration::from_millis(25));
    }

    #[test]
    fn symbols_are_independent() {
        let tracker = CooldownTracker::new(Duration::from_secs(300), Duration::from_secs(600));
        tracker.stamp("HYPE");
        assert_eq!(tracker.check("SOL", false), CooldownVerdict::Ready);
    }

    #[test]
    fn expired_window_is_ready_again() {
        let tracker = CooldownTracker::new(Duration::from_millis(1), Duration::from_millis(1));
        tracker.stamp("HYPE");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(tracker.check("HYPE", false), CooldownVerdict::Ready);
    }
}
