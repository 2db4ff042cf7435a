use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::AppError;

/// Sliding-window counter of failed logins per scope and email.
#[derive(Debug)]
pub struct LoginThrottle {
    max_attempts: u32,
    window: Duration,
    failures: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl LoginThrottle {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn key(scope: &str, email: &str) -> String {
        format!("{}:{}", scope, email.trim().to_lowercase())
    }

    pub fn check(&self, scope: &str, email: &str) -> Result<(), AppError> {
        self.check_at(scope, email, Instant::now())
    }

    pub fn record_failure(&self, scope: &str, email: &str) {
        self.record_failure_at(scope, email, Instant::now())
    }

    pub fn reset(&self, scope: &str, email: &str) {
        self.entries().remove(&Self::key(scope, email));
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.entries().len()
    }

    #[cfg(test)]
    pub(crate) fn poison_lock(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = self.failures.lock();
            panic!("poisoning the throttle lock");
        }));
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.failures.lock().unwrap_or_else(|poisoned| {
            warn!("Login throttle lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub(crate) fn check_at(&self, scope: &str, email: &str, now: Instant) -> Result<(), AppError> {
        let mut failures = self.entries();
        let key = Self::key(scope, email);
        let Some(attempts) = failures.get_mut(&key) else {
            return Ok(());
        };

        Self::prune(attempts, now, self.window);
        if attempts.is_empty() {
            failures.remove(&key);
            return Ok(());
        }

        if attempts.len() as u32 >= self.max_attempts {
            warn!(scope = %scope, "Login attempts exhausted for this window");
            return Err(AppError::RateLimited(
                "Too many login attempts, try again later".to_string(),
            ));
        }

        Ok(())
    }

    /// Also drops every other email whose failures have all aged out.
    pub(crate) fn record_failure_at(&self, scope: &str, email: &str, now: Instant) {
        let mut failures = self.entries();
        failures.retain(|_, attempts| {
            Self::prune(attempts, now, self.window);
            !attempts.is_empty()
        });
        failures
            .entry(Self::key(scope, email))
            .or_default()
            .push_back(now);
    }

    fn prune(attempts: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = attempts.front() {
            if now.saturating_duration_since(*oldest) >= window {
                attempts.pop_front();
            } else {
                break;
            }
        }
    }
}
