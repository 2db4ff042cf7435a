use crate::{
    auth::{
        DbUser, DbUserSession, Role, UpsertUser, User, UserSession, hash_secret, student_user_id,
        verify_secret_or_burn,
    },
    database::Database,
    error::AppError,
    models::{
        Admin, DbAdmin, DbModule, DbStudent, Module, ModuleChanges, NewModule, NewStudent,
        Student, StudentChanges,
    },
};
use chrono::{NaiveDateTime, Utc};
use sqlx::{Executor, Sqlite};
use tracing::{info, instrument, warn};

/// Read paths log failures and hand back an empty value.
fn degrade<T: Default>(result: Result<T, sqlx::Error>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            AppError::from(e).log_and_record(context);
            T::default()
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

// Users

#[instrument(skip(db))]
pub async fn upsert_user(
    db: &Database,
    user: &UpsertUser,
    owner_id: Option<&str>,
) -> Result<User, AppError> {
    info!("Upserting user");
    let pool = db.require()?;

    let role = match &user.role {
        Some(role) => Some(role.clone()),
        None if owner_id == Some(user.id.as_str()) => Some(Role::Admin),
        None => None,
    };
    let role = role.as_ref().map(|r| r.as_str().to_string());
    let signed_in = user.last_signed_in.naive_utc();

    sqlx::query(
        "INSERT INTO users (id, name, email, login_method, role, created_at, last_signed_in)
         VALUES (?1, ?2, ?3, ?4, COALESCE(?5, 'user'), ?6, ?6)
         ON CONFLICT(id) DO UPDATE SET
             name = COALESCE(?2, users.name),
             email = COALESCE(?3, users.email),
             login_method = COALESCE(?4, users.login_method),
             role = COALESCE(?5, users.role),
             last_signed_in = ?6",
    )
    .bind(&user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.login_method)
    .bind(role)
    .bind(signed_in)
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, name, email, login_method, role, created_at, last_signed_in
         FROM users WHERE id = ?",
    )
    .bind(&user.id)
    .fetch_one(pool)
    .await?;

    Ok(User::from(row))
}

#[instrument(skip(db))]
pub async fn get_user(db: &Database, id: &str) -> Option<User> {
    let Some(pool) = db.pool() else {
        warn!("Cannot get user: database not available");
        return None;
    };

    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, name, email, login_method, role, created_at, last_signed_in
         FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await;

    degrade(row, "get_user").map(User::from)
}

// Modules

async fn fetch_module<'e, E>(executor: E, id: i64) -> Result<Option<Module>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, DbModule>(
        "SELECT id, title, instructor, duration, format, description, files, version,
                created_at, updated_at
         FROM modules WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Module::from))
}

#[instrument(skip(db))]
pub async fn get_all_modules(db: &Database) -> Vec<Module> {
    info!("Getting all modules");
    let Some(pool) = db.pool() else {
        warn!("Cannot get modules: database not available");
        return Vec::new();
    };

    let rows = sqlx::query_as::<_, DbModule>(
        "SELECT id, title, instructor, duration, format, description, files, version,
                created_at, updated_at
         FROM modules
         ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await;

    degrade(rows, "get_all_modules")
        .into_iter()
        .map(Module::from)
        .collect()
}

#[instrument(skip(db))]
pub async fn get_module_by_id(db: &Database, id: i64) -> Option<Module> {
    info!("Getting module by id");
    let Some(pool) = db.pool() else {
        warn!("Cannot get module: database not available");
        return None;
    };

    degrade(fetch_module(pool, id).await, "get_module_by_id")
}

#[instrument(skip(db))]
pub async fn count_modules(db: &Database) -> i64 {
    let Some(pool) = db.pool() else {
        return 0;
    };

    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM modules")
        .fetch_one(pool)
        .await;

    degrade(count, "count_modules")
}

#[instrument(skip(db, module), fields(title = %module.title))]
pub async fn create_module(db: &Database, module: &NewModule) -> Result<Module, AppError> {
    info!("Creating module");
    let pool = db.require()?;

    let files = serde_json::to_string(&module.materials)?;
    let now = Utc::now().naive_utc();

    let res = sqlx::query(
        "INSERT INTO modules
             (title, instructor, duration, format, description, files, version, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(&module.title)
    .bind(&module.instructor)
    .bind(&module.duration)
    .bind(&module.format)
    .bind(&module.description)
    .bind(files)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let id = res.last_insert_rowid();
    fetch_module(pool, id)
        .await?
        .ok_or_else(|| AppError::Internal(format!("Module {} vanished after insert", id)))
}

/// Applies only the provided fields. A stale `expected_version` is a conflict.
#[instrument(skip(db, changes))]
pub async fn update_module(
    db: &Database,
    id: i64,
    changes: &ModuleChanges,
) -> Result<Module, AppError> {
    info!("Updating module");
    let pool = db.require()?;
    let mut tx = pool.begin().await?;

    let current = fetch_module(&mut *tx, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Module with id {} not found", id)))?;

    if let Some(expected) = changes.expected_version {
        if expected != current.version {
            return Err(AppError::Conflict(format!(
                "Module {} is at version {}, edit was based on version {}",
                id, current.version, expected
            )));
        }
    }

    if changes.is_empty() {
        tx.commit().await?;
        return Ok(current);
    }

    let mut updated = current.clone();
    changes.apply_to(&mut updated);
    let files = serde_json::to_string(&updated.materials)?;
    let now = Utc::now().naive_utc();

    let result = sqlx::query(
        "UPDATE modules
         SET title = ?, instructor = ?, duration = ?, format = ?, description = ?, files = ?,
             version = version + 1, updated_at = ?
         WHERE id = ? AND version = ?",
    )
    .bind(&updated.title)
    .bind(&updated.instructor)
    .bind(&updated.duration)
    .bind(&updated.format)
    .bind(&updated.description)
    .bind(files)
    .bind(now)
    .bind(id)
    .bind(current.version)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(format!(
            "Module {} changed while it was being saved",
            id
        )));
    }

    let saved = fetch_module(&mut *tx, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Module with id {} not found", id)))?;
    tx.commit().await?;

    Ok(saved)
}

/// Inserts the demo course into an empty table; returns how many were added.
#[instrument(skip(db))]
pub async fn seed_default_modules(db: &Database) -> Result<usize, AppError> {
    if count_modules(db).await > 0 {
        info!("Modules already present, skipping seed");
        return Ok(0);
    }

    let demo = [
        (
            "Introduction: why analyse data?",
            "Isabela",
            "5 min",
            "Intro video",
            "Why data analysis matters for strategic decisions.",
        ),
        (
            "Power BI concepts and fundamentals",
            "Julia",
            "15 min",
            "Narrated slides / e-book",
            "The essential concepts and the Power BI interface.",
        ),
        (
            "Practical uses in administration and restaurants",
            "Melissa, Ellen",
            "20 min",
            "Case study",
            "Real examples of Power BI in business.",
        ),
        (
            "Step-by-step Power BI tutorial",
            "André, Alexandre",
            "30 min",
            "Screencast / practical guide",
            "Build dashboards and visualisations hands-on.",
        ),
        (
            "Interactive activity (quiz)",
            "Nathalia",
            "10 min",
            "Kahoot / Google Forms",
            "Check what you learned with interactive questions.",
        ),
    ];

    for (title, instructor, duration, format, description) in demo {
        create_module(
            db,
            &NewModule {
                title: title.to_string(),
                instructor: instructor.to_string(),
                duration: duration.to_string(),
                format: format.to_string(),
                description: description.to_string(),
                materials: Vec::new(),
            },
        )
        .await?;
    }

    info!(count = demo.len(), "Seeded demo modules");
    Ok(demo.len())
}

// Admins

#[instrument(skip(db, ra))]
pub async fn create_admin(
    db: &Database,
    name: &str,
    email: &str,
    ra: &str,
    bcrypt_cost: u32,
) -> Result<Admin, AppError> {
    info!("Creating admin");
    let pool = db.require()?;
    let email = normalize_email(email);

    if get_admin_by_email(db, &email).await.is_some() {
        return Err(AppError::Conflict(format!(
            "An admin with email '{}' already exists",
            email
        )));
    }

    let ra_hash = hash_secret(ra, bcrypt_cost)?;
    let now = Utc::now().naive_utc();

    let res = sqlx::query("INSERT INTO admins (name, email, ra_hash, created_at) VALUES (?, ?, ?, ?)")
        .bind(name)
        .bind(&email)
        .bind(ra_hash)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("An admin with email '{}' already exists", email))
            } else {
                AppError::Database(e)
            }
        })?;

    let row = sqlx::query_as::<_, DbAdmin>(
        "SELECT id, name, email, ra_hash, created_at FROM admins WHERE id = ?",
    )
    .bind(res.last_insert_rowid())
    .fetch_one(pool)
    .await?;

    Ok(Admin::from(row))
}

async fn fetch_admin_row(db: &Database, email: &str) -> Option<DbAdmin> {
    let Some(pool) = db.pool() else {
        warn!("Cannot get admin: database not available");
        return None;
    };

    let row = sqlx::query_as::<_, DbAdmin>(
        "SELECT id, name, email, ra_hash, created_at FROM admins WHERE email = ?",
    )
    .bind(normalize_email(email))
    .fetch_optional(pool)
    .await;

    degrade(row, "fetch_admin_row")
}

#[instrument(skip(db))]
pub async fn get_admin_by_email(db: &Database, email: &str) -> Option<Admin> {
    fetch_admin_row(db, email).await.map(Admin::from)
}

/// `None` for an unknown email and for a wrong RA alike.
#[instrument(skip_all, fields(email = %email))]
pub async fn verify_admin_credentials(
    db: &Database,
    email: &str,
    ra: &str,
    bcrypt_cost: u32,
) -> Option<Admin> {
    info!("Verifying admin credentials");
    let row = fetch_admin_row(db, email).await;
    let hash = row.as_ref().and_then(|row| row.ra_hash.as_deref());

    if verify_secret_or_burn(ra, hash, bcrypt_cost) {
        row.map(Admin::from)
    } else {
        None
    }
}

// Students

const STUDENT_COLUMNS_SQL: &str =
    "SELECT id, name, email, password_hash, is_active, created_at FROM students";

#[instrument(skip(db))]
pub async fn get_all_students(db: &Database) -> Vec<Student> {
    info!("Getting all students");
    let Some(pool) = db.pool() else {
        warn!("Cannot get students: database not available");
        return Vec::new();
    };

    let rows = sqlx::query_as::<_, DbStudent>(
        "SELECT id, name, email, password_hash, is_active, created_at
         FROM students ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await;

    degrade(rows, "get_all_students")
        .into_iter()
        .map(Student::from)
        .collect()
}

async fn fetch_student_row(db: &Database, column: &str, value: StudentKey<'_>) -> Option<DbStudent> {
    let Some(pool) = db.pool() else {
        warn!("Cannot get student: database not available");
        return None;
    };

    degrade(
        fetch_student_in(pool, column, value).await,
        "fetch_student_row",
    )
}

enum StudentKey<'a> {
    Id(i64),
    Email(&'a str),
}

#[instrument(skip(db))]
pub async fn get_student_by_id(db: &Database, id: i64) -> Option<Student> {
    fetch_student_row(db, "id", StudentKey::Id(id))
        .await
        .map(Student::from)
}

#[instrument(skip(db))]
pub async fn get_student_by_email(db: &Database, email: &str) -> Option<Student> {
    fetch_student_row(db, "email", StudentKey::Email(email))
        .await
        .map(Student::from)
}

#[instrument(skip(db, student), fields(email = %student.email))]
pub async fn create_student(
    db: &Database,
    student: &NewStudent,
    bcrypt_cost: u32,
) -> Result<Student, AppError> {
    info!("Creating student");
    let pool = db.require()?;
    let email = normalize_email(&student.email);

    if get_student_by_email(db, &email).await.is_some() {
        return Err(AppError::Conflict(format!(
            "A student with email '{}' already exists",
            email
        )));
    }

    let password_hash = hash_secret(&student.password, bcrypt_cost)?;
    let now = Utc::now().naive_utc();

    let res = sqlx::query(
        "INSERT INTO students (name, email, password_hash, is_active, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(student.name.trim())
    .bind(&email)
    .bind(password_hash)
    .bind(student.is_active)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("A student with email '{}' already exists", email))
        } else {
            AppError::Database(e)
        }
    })?;

    get_student_by_id(db, res.last_insert_rowid())
        .await
        .ok_or_else(|| AppError::Internal("Student vanished after insert".to_string()))
}

async fn fetch_student_in<'e, E>(
    executor: E,
    column: &str,
    value: StudentKey<'_>,
) -> Result<Option<DbStudent>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{} WHERE {} = ?", STUDENT_COLUMNS_SQL, column);
    let query = sqlx::query_as::<_, DbStudent>(&sql);
    let query = match value {
        StudentKey::Id(id) => query.bind(id),
        StudentKey::Email(email) => query.bind(normalize_email(email)),
    };

    query.fetch_optional(executor).await
}

/// Profile, password and session changes land in one transaction.
#[instrument(skip(db, changes))]
pub async fn update_student(
    db: &Database,
    id: i64,
    changes: &StudentChanges,
    bcrypt_cost: u32,
) -> Result<Student, AppError> {
    info!("Updating student");
    let pool = db.require()?;

    let password_hash = match &changes.password {
        Some(password) => Some(hash_secret(password, bcrypt_cost)?),
        None => None,
    };

    let mut tx = pool.begin().await?;

    let current = fetch_student_in(&mut *tx, "id", StudentKey::Id(id))
        .await?
        .map(Student::from)
        .ok_or_else(|| AppError::NotFound(format!("Student with id {} not found", id)))?;

    let email = match &changes.email {
        Some(email) => {
            let email = normalize_email(email);
            let other = fetch_student_in(&mut *tx, "email", StudentKey::Email(&email)).await?;
            if other.and_then(|row| row.id).is_some_and(|other_id| other_id != id) {
                return Err(AppError::Conflict(format!(
                    "A student with email '{}' already exists",
                    email
                )));
            }
            email
        }
        None => current.email.clone(),
    };
    let name = changes
        .name
        .as_deref()
        .map(str::trim)
        .unwrap_or(&current.name)
        .to_string();
    let is_active = changes.is_active.unwrap_or(current.is_active);

    sqlx::query(
        "UPDATE students
         SET name = ?, email = ?, is_active = ?, password_hash = COALESCE(?, password_hash)
         WHERE id = ?",
    )
    .bind(&name)
    .bind(&email)
    .bind(is_active)
    .bind(password_hash.as_deref())
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("A student with email '{}' already exists", email))
        } else {
            AppError::Database(e)
        }
    })?;

    if (current.is_active && !is_active) || password_hash.is_some() {
        invalidate_user_sessions(&mut *tx, &student_user_id(id)).await?;
    }

    let updated = fetch_student_in(&mut *tx, "id", StudentKey::Id(id))
        .await?
        .map(Student::from)
        .ok_or_else(|| AppError::Internal("Student vanished during update".to_string()))?;

    tx.commit().await?;
    Ok(updated)
}

/// Returns whether a row was removed.
#[instrument(skip(db))]
pub async fn delete_student(db: &Database, id: i64) -> Result<bool, AppError> {
    info!("Deleting student");
    let pool = db.require()?;
    let mut tx = pool.begin().await?;

    let result = sqlx::query("DELETE FROM students WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    invalidate_user_sessions(&mut *tx, &student_user_id(id)).await?;

    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

/// Inactive students never verify, whatever the password.
#[instrument(skip_all, fields(email = %email))]
pub async fn verify_student_credentials(
    db: &Database,
    email: &str,
    password: &str,
    bcrypt_cost: u32,
) -> Option<Student> {
    info!("Verifying student credentials");
    let row = fetch_student_row(db, "email", StudentKey::Email(email)).await;
    let hash = row.as_ref().and_then(|row| row.password_hash.as_deref());

    if !verify_secret_or_burn(password, hash, bcrypt_cost) {
        return None;
    }
    row.map(Student::from).filter(|student| student.is_active)
}

// Sessions

#[instrument(skip(db, token))]
pub async fn create_session(
    db: &Database,
    user_id: &str,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");
    let pool = db.require()?;

    let res = sqlx::query(
        "INSERT INTO user_sessions (user_id, token, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(token)
    .bind(Utc::now().naive_utc())
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(db, token))]
pub async fn get_session_by_token(db: &Database, token: &str) -> Result<UserSession, AppError> {
    info!("Getting session by token");
    let pool = db.require()?;

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(db, token))]
pub async fn invalidate_session(db: &Database, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");
    let pool = db.require()?;

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

/// Takes an executor so student updates can run it inside their transaction.
#[instrument(skip(executor))]
pub async fn invalidate_user_sessions<'e, E>(executor: E, user_id: &str) -> Result<u64, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Invalidating all sessions of user");

    let result = sqlx::query("DELETE FROM user_sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

#[instrument(skip(db))]
pub async fn clean_expired_sessions(db: &Database) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");
    let pool = db.require()?;

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
