// SPDX-License-Identifier: MPL-2.0

//! Manual retry throttle

use std::time::Duration;

/// Result of a manual retry request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<R> {
    /// Inside the cooldown window; nothing changed
    Throttled,
    /// Device offline; no request was made
    Offline,
    /// Nothing to retry in the current phase
    NotNeeded,
    /// A fresh load was issued
    Reissued(R),
}

impl<R> RetryOutcome<R> {
    pub fn request(self) -> Option<R> {
        match self {
            RetryOutcome::Reissued(request) => Some(request),
            _ => None,
        }
    }
}

/// Rejects retries closer together than the throttle window
#[derive(Debug, Clone)]
pub struct RetryThrottle {
    window: Duration,
    last: Option<Duration>,
}

impl RetryThrottle {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Record an attempt at `now` if it is outside the window
    pub fn admit(&mut self, now: Duration) -> bool {
        if let Some(last) = self.last
            && now.saturating_sub(last) < self.window
        {
            return false;
        }
        self.last = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_attempt_inside_window_rejected() {
        let mut throttle = RetryThrottle::new(Duration::from_secs(2));
        assert!(throttle.admit(Duration::from_secs(10)));
        assert!(!throttle.admit(Duration::from_millis(11_500)));
        assert!(throttle.admit(Duration::from_secs(12)));
    }
}
