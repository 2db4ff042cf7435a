#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod course;
mod database;
mod db;
mod editor;
mod env;
mod error;
mod models;
mod pages;
mod render;
mod routes;
mod telemetry;
#[cfg(test)]
mod test;
mod uploads;
mod validation;

use std::time::Duration;

use api::{
    api_admin_login, api_create_module, api_create_student, api_delete_student, api_get_module,
    api_get_student, api_list_modules, api_list_students, api_logout, api_me, api_student_login,
    api_update_module, api_update_student, api_upload_audio, health,
};
use auth::{
    LoginThrottle, admin_forbidden, admin_unauthorized, default_api, forbidden_api,
    unauthorized, unauthorized_api,
};
use database::Database;
use db::{clean_expired_sessions, create_admin, get_admin_by_email, seed_default_modules};
use editor::EditorStore;
use env::{PortalConfig, load_environment};
use error::AppError;
use rocket::data::{Limits, ToByteUnit};
use rocket::fs::{FileServer, Options};
use rocket::{Build, Rocket, tokio};
use rocket_dyn_templates::Template;
use routes::{
    add_material, admin_login, admin_modules, admin_students, cancel_edit, course_page,
    create_module_page, create_student_page, delete_student_page, edit_draft, index, logout,
    not_found, process_admin_login, process_student_login, remove_material, save_module,
    start_edit, student_login, toggle_student, update_material,
};
use telemetry::{TelemetryFairing, init_tracing};
use thiserror::Error;
use tracing::{error, info, warn};
use uploads::UploadStore;

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

#[launch]
async fn rocket() -> _ {
    if let Err(e) = load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }
    init_tracing();

    let config = PortalConfig::from_env();
    let db = Database::connect_lazy(config.database_url.as_deref());

    let db = match prepare_database(&db, &config).await {
        Ok(()) => db,
        Err(e) => {
            error!(error = %e, "Database setup failed, continuing without a database");
            Database::unavailable()
        }
    };

    if db.is_available() {
        spawn_session_cleaner(db.clone());
    }

    init_rocket(db, config).await
}

/// Migrations must succeed; bootstrap and seeding only log their failures.
async fn prepare_database(db: &Database, config: &PortalConfig) -> Result<(), Error> {
    if !db.is_available() {
        return Ok(());
    }

    db.migrate().await?;

    if let Some(admin) = &config.bootstrap_admin {
        if get_admin_by_email(db, &admin.email).await.is_none() {
            match create_admin(db, &admin.name, &admin.email, &admin.ra, config.bcrypt_cost).await {
                Ok(created) => info!(admin_id = %created.id, "Bootstrap admin created"),
                Err(e) => e.log_and_record("Bootstrap admin"),
            }
        }
    }

    if config.seed_demo_modules {
        if let Err(e) = seed_default_modules(db).await {
            e.log_and_record("Seeding demo modules");
        }
    }

    Ok(())
}

fn spawn_session_cleaner(db: Database) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&db).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(SESSION_CLEANUP_INTERVAL).await;
        }
    });
}

pub async fn init_rocket(db: Database, config: PortalConfig) -> Rocket<Build> {
    info!("Starting Eduqly portal");

    // Audio arrives base64 encoded inside JSON, a third larger than the file.
    let json_limit = (config.max_upload_bytes as u64) / 3 * 4 + 64 * 1024;
    let limits = Limits::default().limit("json", json_limit.bytes());
    let figment = rocket::Config::figment().merge(("limits", limits));

    let uploads = UploadStore::new(config.upload_dir.clone(), config.max_upload_bytes);
    if let Err(e) = tokio::fs::create_dir_all(uploads.root().join("audio")).await {
        warn!(error = %e, dir = %uploads.root().display(), "Could not create upload directory");
    }
    let upload_files = FileServer::new(uploads.root(), Options::Missing);

    let throttle = LoginThrottle::new(
        config.login_max_attempts,
        Duration::from_secs(config.login_window_secs),
    );

    rocket::custom(figment)
        .manage(db)
        .manage(config)
        .manage(throttle)
        .manage(EditorStore::new())
        .manage(uploads)
        .mount(
            "/api",
            routes![
                api_list_modules,
                api_get_module,
                api_create_module,
                api_update_module,
                api_upload_audio,
                api_admin_login,
                api_student_login,
                api_me,
                api_logout,
                api_list_students,
                api_get_student,
                api_create_student,
                api_update_student,
                api_delete_student,
                health,
            ],
        )
        .mount(
            "/",
            routes![
                index,
                course_page,
                admin_login,
                process_admin_login,
                student_login,
                process_student_login,
                logout,
                admin_modules,
                create_module_page,
                start_edit,
                edit_draft,
                add_material,
                update_material,
                remove_material,
                cancel_edit,
                save_module,
                admin_students,
                create_student_page,
                toggle_student,
                delete_student_page,
            ],
        )
        .mount("/uploads", upload_files)
        .register("/api", catchers![unauthorized_api, forbidden_api, default_api])
        .register("/admin", catchers![admin_unauthorized, admin_forbidden])
        .register("/", catchers![unauthorized, not_found])
        .attach(Template::fairing())
        .attach(TelemetryFairing)
}
