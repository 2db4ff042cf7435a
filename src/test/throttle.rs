#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use crate::auth::{ADMIN_SCOPE, LoginThrottle, STUDENT_SCOPE};
    use crate::error::AppError;

    #[test]
    fn test_blocks_after_max_failures() {
        let throttle = LoginThrottle::new(3, Duration::from_secs(60));
        let start = Instant::now();

        for i in 0..3 {
            assert!(throttle.check_at(ADMIN_SCOPE, "a@e.test", start).is_ok());
            throttle.record_failure_at(ADMIN_SCOPE, "a@e.test", start + Duration::from_secs(i));
        }

        let blocked = throttle.check_at(ADMIN_SCOPE, "a@e.test", start + Duration::from_secs(5));
        assert!(matches!(blocked, Err(AppError::RateLimited(_))));
    }

    #[test]
    fn test_window_slides() {
        let throttle = LoginThrottle::new(2, Duration::from_secs(60));
        let start = Instant::now();

        throttle.record_failure_at(ADMIN_SCOPE, "a@e.test", start);
        throttle.record_failure_at(ADMIN_SCOPE, "a@e.test", start + Duration::from_secs(30));
        assert!(throttle.check_at(ADMIN_SCOPE, "a@e.test", start + Duration::from_secs(31)).is_err());

        // The first failure has aged out.
        assert!(throttle.check_at(ADMIN_SCOPE, "a@e.test", start + Duration::from_secs(61)).is_ok());
    }

    #[test]
    fn test_keys_are_per_scope_and_case_insensitive() {
        let throttle = LoginThrottle::new(1, Duration::from_secs(60));
        let now = Instant::now();

        throttle.record_failure_at(STUDENT_SCOPE, "Ana@E.test ", now);

        assert!(throttle.check_at(STUDENT_SCOPE, "ana@e.test", now).is_err());
        assert!(throttle.check_at(ADMIN_SCOPE, "ana@e.test", now).is_ok());
        assert!(throttle.check_at(STUDENT_SCOPE, "bruno@e.test", now).is_ok());
    }

    #[test]
    fn test_reset_clears_failures() {
        let throttle = LoginThrottle::new(1, Duration::from_secs(60));

        throttle.record_failure(ADMIN_SCOPE, "a@e.test");
        assert!(throttle.check(ADMIN_SCOPE, "a@e.test").is_err());

        throttle.reset(ADMIN_SCOPE, "a@e.test");
        assert!(throttle.check(ADMIN_SCOPE, "a@e.test").is_ok());
    }

    #[test]
    fn test_aged_out_emails_are_forgotten() {
        let throttle = LoginThrottle::new(3, Duration::from_secs(60));
        let start = Instant::now();

        for i in 0..50 {
            throttle.record_failure_at(STUDENT_SCOPE, &format!("user{}@e.test", i), start);
        }
        assert_eq!(throttle.tracked(), 50);

        throttle.record_failure_at(STUDENT_SCOPE, "late@e.test", start + Duration::from_secs(61));
        assert_eq!(throttle.tracked(), 1);
    }

    #[test]
    fn test_poisoned_lock_still_blocks() {
        let throttle = LoginThrottle::new(1, Duration::from_secs(60));
        let now = Instant::now();
        throttle.record_failure_at(ADMIN_SCOPE, "a@e.test", now);

        throttle.poison_lock();

        assert!(matches!(
            throttle.check_at(ADMIN_SCOPE, "a@e.test", now),
            Err(AppError::RateLimited(_))
        ));
    }
}
