use opentelemetry_semantic_conventions::{attribute::OTEL_STATUS_CODE, trace::ERROR_TYPE};
use rocket::http::Status;
use thiserror::Error;
use tracing::{Span, error, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Sign-in rejected: {0}")]
    Authentication(String),

    #[error("Not allowed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Stale write: {0}")]
    Conflict(String),

    #[error("Throttled: {0}")]
    RateLimited(String),

    #[error("Unavailable: {0}")]
    ExternalService(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Value recorded as `error.type` on the request span.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database",
            AppError::Authentication(_) => "authentication",
            AppError::Authorization(_) => "authorization",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::Conflict(_) => "version_conflict",
            AppError::RateLimited(_) => "login_throttled",
            AppError::ExternalService(_) => "database_unavailable",
            AppError::Internal(_) => "internal",
        }
    }

    /// Faults on our side; everything else is a rejected request.
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Internal(_) | AppError::ExternalService(_)
        )
    }

    pub fn log_and_record(&self, ctx: &str) {
        let message = self.to_string();
        let kind = self.kind();

        if self.is_server_fault() {
            error!(error_kind = kind, context = %ctx, "{}", message);
        } else {
            warn!(error_kind = kind, context = %ctx, "{}", message);
        }

        let span = Span::current();
        if span.is_none() {
            return;
        }
        span.record("error", tracing::field::display(true));
        span.record(ERROR_TYPE, tracing::field::display(kind));
        span.record("error.message", tracing::field::display(&message));
        if self.is_server_fault() {
            span.record(OTEL_STATUS_CODE, tracing::field::display("ERROR"));
        }
    }

    pub fn status_code(&self) -> Status {
        match self {
            AppError::Database(_) | AppError::Internal(_) => Status::InternalServerError,
            AppError::Authentication(_) => Status::Unauthorized,
            AppError::Authorization(_) => Status::Forbidden,
            AppError::NotFound(_) => Status::NotFound,
            AppError::Validation(_) => Status::UnprocessableEntity,
            AppError::Conflict(_) => Status::Conflict,
            AppError::RateLimited(_) => Status::TooManyRequests,
            AppError::ExternalService(_) => Status::ServiceUnavailable,
        }
    }
}

/// Plain status responses, used by handlers like the health check.
impl<'r> rocket::response::Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        self.log_and_record(&format!("{} {}", req.method(), req.uri()));
        self.status_code().respond_to(req)
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("Credential hashing failed: {}", error))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Schema migration failed: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Internal(format!("Materials could not be encoded: {}", error))
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        AppError::Internal(format!("Upload storage failed: {}", error))
    }
}
