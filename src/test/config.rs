#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::auth::MAX_BCRYPT_COST;
    use crate::env::{BootstrapAdmin, PortalConfig};
    use serial_test::serial;

    const KEYS: [&str; 13] = [
        "DATABASE_URL",
        "SESSION_TTL_HOURS",
        "UPLOAD_DIR",
        "MAX_UPLOAD_BYTES",
        "LOGIN_MAX_ATTEMPTS",
        "LOGIN_WINDOW_SECS",
        "BCRYPT_COST",
        "OWNER_ID",
        "SEED_DEMO_MODULES",
        "ADMIN_BOOTSTRAP_NAME",
        "ADMIN_BOOTSTRAP_EMAIL",
        "ADMIN_BOOTSTRAP_RA",
        "ROCKET_PROFILE",
    ];

    /// Every known key unset except the given overrides.
    fn vars(overrides: &[(&'static str, &'static str)]) -> Vec<(&'static str, Option<&'static str>)> {
        KEYS.iter()
            .map(|key| {
                let value = overrides
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| *v);
                (*key, value)
            })
            .collect()
    }

    #[test]
    #[serial]
    fn test_defaults_without_environment() {
        temp_env::with_vars(vars(&[]), || {
            let config = PortalConfig::from_env();
            let defaults = PortalConfig::default();

            assert_eq!(config.database_url, None);
            assert_eq!(config.session_ttl_hours, defaults.session_ttl_hours);
            assert_eq!(config.upload_dir, PathBuf::from("uploads"));
            assert_eq!(config.login_max_attempts, 5);
            assert!(!config.seed_demo_modules);
            assert!(config.bootstrap_admin.is_none());
        });
    }

    #[test]
    #[serial]
    fn test_values_are_read_and_clamped() {
        let overrides = [
            ("DATABASE_URL", "sqlite://test.db"),
            ("SESSION_TTL_HOURS", "8"),
            ("UPLOAD_DIR", "/tmp/eduqly"),
            ("LOGIN_MAX_ATTEMPTS", "not-a-number"),
            ("BCRYPT_COST", "99"),
            ("OWNER_ID", "  admin:1  "),
            ("SEED_DEMO_MODULES", "true"),
        ];
        temp_env::with_vars(vars(&overrides), || {
            let config = PortalConfig::from_env();

            assert_eq!(config.database_url.as_deref(), Some("sqlite://test.db"));
            assert_eq!(config.session_ttl_hours, 8);
            assert_eq!(config.upload_dir, PathBuf::from("/tmp/eduqly"));
            assert_eq!(config.login_max_attempts, 5);
            assert_eq!(config.bcrypt_cost, MAX_BCRYPT_COST);
            assert_eq!(config.owner_id.as_deref(), Some("admin:1"));
            assert!(config.seed_demo_modules);
        });
    }

    #[test]
    #[serial]
    fn test_bootstrap_admin_needs_all_three_values() {
        let complete = [
            ("ADMIN_BOOTSTRAP_NAME", "Coordinator"),
            ("ADMIN_BOOTSTRAP_EMAIL", "coord@eduqly.test"),
            ("ADMIN_BOOTSTRAP_RA", "RA-1"),
        ];
        temp_env::with_vars(vars(&complete), || {
            assert_eq!(
                PortalConfig::from_env().bootstrap_admin,
                Some(BootstrapAdmin {
                    name: "Coordinator".to_string(),
                    email: "coord@eduqly.test".to_string(),
                    ra: "RA-1".to_string(),
                })
            );
        });

        temp_env::with_vars(vars(&complete[..2]), || {
            assert!(PortalConfig::from_env().bootstrap_admin.is_none());
        });
    }
}
