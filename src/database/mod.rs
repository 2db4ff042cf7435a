use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use crate::error::AppError;

/// Shared handle to the store. An unavailable handle makes reads come back
/// empty and writes fail with a service error instead of panicking.
#[derive(Clone, Debug)]
pub struct Database {
    pool: Option<Pool<Sqlite>>,
}

impl Database {
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool: Some(pool) }
    }

    pub fn unavailable() -> Self {
        Self { pool: None }
    }

    /// Connections are opened on first use.
    pub fn connect_lazy(database_url: Option<&str>) -> Self {
        let Some(url) = database_url.filter(|u| !u.trim().is_empty()) else {
            warn!("DATABASE_URL not set, running without a database");
            return Self::unavailable();
        };

        match SqliteConnectOptions::from_str(url) {
            Ok(options) => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(5)
                    .connect_lazy_with(options.create_if_missing(true));
                Self::from_pool(pool)
            }
            Err(e) => {
                warn!(error = %e, "Invalid DATABASE_URL, running without a database");
                Self::unavailable()
            }
        }
    }

    pub fn pool(&self) -> Option<&Pool<Sqlite>> {
        self.pool.as_ref()
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }

    pub fn require(&self) -> Result<&Pool<Sqlite>, AppError> {
        self.pool
            .as_ref()
            .ok_or_else(|| AppError::ExternalService("Database not available".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<(), AppError> {
        let pool = self.require()?;
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(pool).await?;
        info!("Migrations completed successfully");
        Ok(())
    }
}
