use chrono::Utc;
use rocket::http::{Cookie, CookieJar, SameSite};
use tracing::{info, instrument, warn};

use crate::database::Database;
use crate::db;
use crate::editor::EditorStore;
use crate::env::PortalConfig;
use crate::error::AppError;
use crate::models::{Admin, Student};

use super::{LoginThrottle, UpsertUser, User, UserSession};

pub const SESSION_COOKIE: &str = "session_token";
pub const ADMIN_SCOPE: &str = "admin";
pub const STUDENT_SCOPE: &str = "student";

/// Same message for an unknown email and a wrong RA code.
#[instrument(skip(db, config, throttle, ra))]
pub async fn authenticate_admin(
    db: &Database,
    config: &PortalConfig,
    throttle: &LoginThrottle,
    email: &str,
    ra: &str,
) -> Result<Admin, AppError> {
    throttle.check(ADMIN_SCOPE, email)?;

    match db::verify_admin_credentials(db, email, ra, config.bcrypt_cost).await {
        Some(admin) => {
            throttle.reset(ADMIN_SCOPE, email);
            info!(admin_id = %admin.id, "Admin authenticated");
            Ok(admin)
        }
        None => {
            throttle.record_failure(ADMIN_SCOPE, email);
            Err(AppError::Authentication(
                "Invalid email or RA code".to_string(),
            ))
        }
    }
}

/// Deactivated students get the same error as a wrong password.
#[instrument(skip(db, config, throttle, password))]
pub async fn authenticate_student(
    db: &Database,
    config: &PortalConfig,
    throttle: &LoginThrottle,
    email: &str,
    password: &str,
) -> Result<Student, AppError> {
    throttle.check(STUDENT_SCOPE, email)?;

    match db::verify_student_credentials(db, email, password, config.bcrypt_cost).await {
        Some(student) => {
            throttle.reset(STUDENT_SCOPE, email);
            info!(student_id = %student.id, "Student authenticated");
            Ok(student)
        }
        None => {
            throttle.record_failure(STUDENT_SCOPE, email);
            Err(AppError::Authentication(
                "Invalid email or password".to_string(),
            ))
        }
    }
}

#[instrument(skip(db, config, cookies, identity), fields(user_id = %identity.id))]
pub async fn start_session(
    db: &Database,
    config: &PortalConfig,
    cookies: &CookieJar<'_>,
    identity: UpsertUser,
) -> Result<User, AppError> {
    let user = db::upsert_user(db, &identity, config.owner_id.as_deref()).await?;

    let token = UserSession::generate_token();
    let expires_at = Utc::now().naive_utc() + chrono::Duration::hours(config.session_ttl_hours);
    db::create_session(db, &user.id, &token, expires_at).await?;

    cookies.add_private(
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(rocket::time::Duration::hours(config.session_ttl_hours)),
    );

    info!(role = %user.role, "Session started");
    Ok(user)
}

/// Always clears the cookie, even when the row could not be deleted.
/// Drafts the user left open in the module editor go with the session.
#[instrument(skip_all)]
pub async fn end_session(db: &Database, editors: &EditorStore, cookies: &CookieJar<'_>) {
    if let Some(cookie) = cookies.get_private(SESSION_COOKIE) {
        if let Ok(session) = db::get_session_by_token(db, cookie.value()).await {
            editors.discard_user(&session.user_id);
        }
        if let Err(e) = db::invalidate_session(db, cookie.value()).await {
            warn!(error = %e, "Could not delete session row on logout");
        }
    }

    cookies.remove_private(Cookie::build(SESSION_COOKIE).path("/"));
}
