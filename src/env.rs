use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{info, warn};

use crate::auth::{MAX_BCRYPT_COST, MIN_BCRYPT_COST};

pub fn load_environment() -> Result<(), Box<dyn std::error::Error>> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

/// Admin created at launch when no admin with that email exists yet.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapAdmin {
    pub name: String,
    pub email: String,
    pub ra: String,
}

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub database_url: Option<String>,
    pub session_ttl_hours: i64,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub login_max_attempts: u32,
    pub login_window_secs: u64,
    pub bcrypt_cost: u32,
    pub owner_id: Option<String>,
    pub seed_demo_modules: bool,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            session_ttl_hours: 1,
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: 25 * 1024 * 1024,
            login_max_attempts: 5,
            login_window_secs: 900,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            owner_id: None,
            seed_demo_modules: false,
            bootstrap_admin: None,
        }
    }
}

impl PortalConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bootstrap_admin = match (
            non_empty_var("ADMIN_BOOTSTRAP_NAME"),
            non_empty_var("ADMIN_BOOTSTRAP_EMAIL"),
            non_empty_var("ADMIN_BOOTSTRAP_RA"),
        ) {
            (Some(name), Some(email), Some(ra)) => Some(BootstrapAdmin { name, email, ra }),
            (None, None, None) => None,
            _ => {
                warn!("ADMIN_BOOTSTRAP_NAME, _EMAIL and _RA must be set together; ignoring");
                None
            }
        };

        Self {
            database_url: non_empty_var("DATABASE_URL"),
            session_ttl_hours: parsed_var("SESSION_TTL_HOURS", defaults.session_ttl_hours),
            upload_dir: non_empty_var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_upload_bytes: parsed_var("MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            login_max_attempts: parsed_var("LOGIN_MAX_ATTEMPTS", defaults.login_max_attempts),
            login_window_secs: parsed_var("LOGIN_WINDOW_SECS", defaults.login_window_secs),
            bcrypt_cost: parsed_var("BCRYPT_COST", defaults.bcrypt_cost)
                .clamp(MIN_BCRYPT_COST, MAX_BCRYPT_COST),
            owner_id: non_empty_var("OWNER_ID"),
            seed_demo_modules: parsed_var("SEED_DEMO_MODULES", defaults.seed_demo_modules),
            bootstrap_admin,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    dotenvy::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed_var<T: FromStr>(key: &str, default: T) -> T {
    match non_empty_var(key) {
        Some(raw) => match raw.parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key = %key, value = %raw, "Unparsable configuration value, using default");
                default
            }
        },
        None => default,
    }
}
