use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use rocket::http::Status;
use serde::Serialize;
use tracing::warn;

use crate::models::to_utc;

use super::{Permission, Role};

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub login_method: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_signed_in: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub login_method: Option<String>,
    pub role: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub last_signed_in: Option<NaiveDateTime>,
}

impl From<DbUser> for User {
    fn from(user: DbUser) -> Self {
        let role = user.role.unwrap_or_default();
        Self {
            id: user.id.unwrap_or_default(),
            name: user.name.unwrap_or_default(),
            email: user.email.unwrap_or_default(),
            login_method: user.login_method.unwrap_or_default(),
            role: Role::parse(&role).unwrap_or_else(|_| {
                warn!(role = %role, "Unknown stored role, treating as user");
                Role::User
            }),
            created_at: to_utc(user.created_at),
            last_signed_in: to_utc(user.last_signed_in),
        }
    }
}

impl User {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), Status> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.id,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(Status::Forbidden)
        }
    }
}

/// Identity written on every successful login.
#[derive(Debug, Clone)]
pub struct UpsertUser {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub login_method: Option<String>,
    pub role: Option<Role>,
    pub last_signed_in: DateTime<Utc>,
}

impl UpsertUser {
    pub fn admin(admin_id: i64, name: &str, email: &str) -> Self {
        Self {
            id: format!("admin:{}", admin_id),
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            login_method: Some("ra".to_string()),
            role: Some(Role::Admin),
            last_signed_in: Utc::now(),
        }
    }

    pub fn student(student_id: i64, name: &str, email: &str) -> Self {
        Self {
            id: student_user_id(student_id),
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            login_method: Some("password".to_string()),
            role: None,
            last_signed_in: Utc::now(),
        }
    }
}

pub fn student_user_id(student_id: i64) -> String {
    format!("student:{}", student_id)
}

#[derive(Debug, Clone)]
pub struct UserSession {
    pub id: i64,
    pub user_id: String,
    pub token: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUserSession {
    pub id: Option<i64>,
    pub user_id: Option<String>,
    pub token: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
}

impl From<DbUserSession> for UserSession {
    fn from(session: DbUserSession) -> Self {
        Self {
            id: session.id.unwrap_or_default(),
            user_id: session.user_id.unwrap_or_default(),
            token: session.token.unwrap_or_default(),
            created_at: session
                .created_at
                .unwrap_or_else(|| Utc::now().naive_utc()),
            // A row without an expiry is treated as already expired.
            expires_at: session.expires_at.unwrap_or_default(),
        }
    }
}

impl UserSession {
    pub fn generate_token() -> String {
        let bytes: [u8; 32] = rand::rng().random();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now().naive_utc()
    }
}
