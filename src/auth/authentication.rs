use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::Redirect;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde_json::{Value, json};
use tracing::{Instrument, error, info, warn};

use crate::database::Database;
use crate::db::{get_session_by_token, get_user};

use super::{Permission, SESSION_COOKIE, User};

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        session_user(request)
            .instrument(tracing::info_span!("user_auth_guard"))
            .await
    }
}

async fn session_user(request: &Request<'_>) -> Outcome<User, ()> {
    let Some(token) = request
        .cookies()
        .get_private(SESSION_COOKIE)
        .map(|c| c.value().to_string())
    else {
        return Outcome::Error((Status::Unauthorized, ()));
    };

    let Some(db) = request.rocket().state::<Database>() else {
        error!("Database handle not found in managed state");
        return Outcome::Error((Status::InternalServerError, ()));
    };

    let session = match get_session_by_token(db, &token).await {
        Ok(session) => session,
        Err(err) => {
            warn!(error = %err, "Session token rejected");
            return Outcome::Error((Status::Unauthorized, ()));
        }
    };

    if !session.is_valid() {
        warn!(user_id = %session.user_id, "Session expired");
        return Outcome::Error((Status::Unauthorized, ()));
    }

    match get_user(db, &session.user_id).await {
        Some(user) => {
            info!(user_id = %user.id, role = %user.role, "User authenticated via session token");
            Outcome::Success(user)
        }
        None => {
            warn!(user_id = %session.user_id, "Session points at a missing user");
            Outcome::Error((Status::Unauthorized, ()))
        }
    }
}

/// A signed-in user allowed to manage the course.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.guard::<User>().await {
            Outcome::Success(user) => match user.require_permission(Permission::EditModules) {
                Ok(()) => Outcome::Success(AdminUser(user)),
                Err(status) => Outcome::Error((status, ())),
            },
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Forward(status) => Outcome::Forward(status),
        }
    }
}

fn api_error(status: Status, message: &str) -> Custom<Json<Value>> {
    Custom(
        status,
        Json(json!({
            "error": status.reason().unwrap_or("Error"),
            "message": message
        })),
    )
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<Value>> {
    api_error(Status::Unauthorized, "Authentication required")
}

#[catch(403)]
pub fn forbidden_api(_req: &Request) -> Custom<Json<Value>> {
    api_error(Status::Forbidden, "Admin access required")
}

#[catch(default)]
pub fn default_api(status: Status, req: &Request) -> Custom<Json<Value>> {
    warn!(status = %status, uri = %req.uri(), "API request failed");
    api_error(status, "Request could not be processed")
}

#[catch(401)]
pub fn admin_unauthorized(_req: &Request) -> Redirect {
    warn!("Unauthorized admin page access");
    Redirect::to(uri!("/admin/login"))
}

#[catch(403)]
pub fn admin_forbidden(_req: &Request) -> Redirect {
    warn!("Forbidden admin page access");
    Redirect::to(uri!("/admin/login"))
}

#[catch(401)]
pub fn unauthorized(_req: &Request) -> Redirect {
    warn!("Unauthorized access attempt");
    Redirect::to(uri!("/student/login"))
}
