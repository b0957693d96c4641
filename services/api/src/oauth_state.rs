//! CSRF `state` values issued for pending Google OAuth flows.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How long a user has to complete the Google consent screen.
pub const STATE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
pub struct OAuthStates {
    ttl: Duration,
    pending: Mutex<HashMap<String, Instant>>,
}

impl Default for OAuthStates {
    fn default() -> Self {
        Self::new(STATE_TTL)
    }
}

impl OAuthStates {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn remember(&self, state: String) {
        self.remember_at(state, Instant::now());
    }

    pub fn remember_at(&self, state: String, now: Instant) {
        let mut pending = self.pending();
        let ttl = self.ttl;
        pending.retain(|_, issued| now.duration_since(*issued) < ttl);
        pending.insert(state, now);
    }

    /// Consumes `state`; true only if it was issued and has not expired.
    pub fn take(&self, state: &str) -> bool {
        self.take_at(state, Instant::now())
    }

    pub fn take_at(&self, state: &str, now: Instant) -> bool {
        self.pending()
            .remove(state)
            .is_some_and(|issued| now.duration_since(issued) < self.ttl)
    }
}
