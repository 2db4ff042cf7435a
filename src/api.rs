use rocket::State;
use rocket::http::CookieJar;
use rocket::http::Status;
use rocket::response::status::Created;
use rocket::serde::{Deserialize, Serialize, json::Json};
use serde_json::{Value, json};
use tracing::info;
use validator::Validate;

use crate::auth::{
    AdminUser, LoginThrottle, Permission, UpsertUser, User, authenticate_admin,
    authenticate_student, end_session, start_session,
};
use crate::database::Database;
use crate::db::{
    create_module, create_student, delete_student, get_all_modules, get_all_students,
    get_module_by_id, get_student_by_id, update_module, update_student,
};
use crate::editor::EditorStore;
use crate::env::PortalConfig;
use crate::error::AppError;
use crate::models::{
    Admin, Material, Module, ModuleChanges, NewModule, NewStudent, Student, StudentChanges,
    deserialize_flexible_bool, validate_materials,
};
use crate::uploads::{StoredUpload, UploadStore};
use crate::validation::{ApiError, AppErrorExt, JsonValidateExt, ToValidationResponse};

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdminLoginRequest {
    #[validate(email(message = "Enter a valid email address"))]
    email: String,
    #[validate(length(min = 1, message = "RA code is required"))]
    ra: String,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StudentLoginRequest {
    #[validate(email(message = "Enter a valid email address"))]
    email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
}

#[derive(Serialize)]
pub struct AdminLoginResponse {
    pub success: bool,
    pub admin: Admin,
}

#[derive(Serialize)]
pub struct StudentLoginResponse {
    pub success: bool,
    pub student: Student,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateModuleRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    title: String,
    #[validate(length(max = 200))]
    instructor: String,
    #[validate(length(max = 50))]
    duration: String,
    #[validate(length(max = 200))]
    format: String,
    #[validate(length(max = 5000))]
    description: String,
    #[serde(default, alias = "files")]
    materials: Vec<Material>,
}

impl From<CreateModuleRequest> for NewModule {
    fn from(req: CreateModuleRequest) -> Self {
        Self {
            title: req.title.trim().to_string(),
            instructor: req.instructor,
            duration: req.duration,
            format: req.format,
            description: req.description,
            materials: req.materials,
        }
    }
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateModuleRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    title: Option<String>,
    #[validate(length(max = 200))]
    instructor: Option<String>,
    #[validate(length(max = 50))]
    duration: Option<String>,
    #[validate(length(max = 200))]
    format: Option<String>,
    #[validate(length(max = 5000))]
    description: Option<String>,
    #[serde(default, alias = "files")]
    materials: Option<Vec<Material>>,
    expected_version: Option<i64>,
}

impl From<UpdateModuleRequest> for ModuleChanges {
    fn from(req: UpdateModuleRequest) -> Self {
        Self {
            title: req.title.map(|t| t.trim().to_string()),
            instructor: req.instructor,
            duration: req.duration,
            format: req.format,
            description: req.description,
            materials: req.materials,
            expected_version: req.expected_version,
        }
    }
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UploadAudioRequest {
    #[validate(length(min = 1, max = 255, message = "File name is required"))]
    file_name: String,
    #[validate(length(min = 1, message = "File data is required"))]
    file_data: String,
    #[validate(length(min = 1, message = "Content type is required"))]
    content_type: String,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentRequest {
    #[validate(length(min = 1, max = 120, message = "Name is required"))]
    name: String,
    #[validate(email(message = "Enter a valid email address"))]
    email: String,
    #[validate(length(min = 6, max = 128, message = "Password must be 6-128 characters"))]
    password: String,
    #[serde(default, deserialize_with = "deserialize_flexible_bool")]
    is_active: Option<bool>,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudentRequest {
    #[validate(length(min = 1, max = 120, message = "Name is required"))]
    name: Option<String>,
    #[validate(email(message = "Enter a valid email address"))]
    email: Option<String>,
    #[validate(length(min = 6, max = 128, message = "Password must be 6-128 characters"))]
    password: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_bool")]
    is_active: Option<bool>,
}

// Modules

#[get("/modules")]
pub async fn api_list_modules(db: &State<Database>) -> Json<Vec<Module>> {
    Json(get_all_modules(db).await)
}

#[get("/modules/<id>")]
pub async fn api_get_module(id: i64, db: &State<Database>) -> Result<Json<Module>, ApiError> {
    match get_module_by_id(db, id).await {
        Some(module) => Ok(Json(module)),
        None => Err(Status::NotFound.to_validation_response()),
    }
}

#[post("/modules", data = "<module>")]
pub async fn api_create_module(
    admin: AdminUser,
    module: Json<CreateModuleRequest>,
    db: &State<Database>,
) -> Result<Created<Json<Module>>, ApiError> {
    let request = module.validate_custom()?;
    validate_materials(&request.materials).validate_custom()?;

    let created = create_module(db, &NewModule::from(request))
        .await
        .validate_custom()?;

    info!(module_id = %created.id, admin = %admin.0.id, "Module created");
    Ok(Created::new(format!("/api/modules/{}", created.id)).body(Json(created)))
}

#[put("/modules/<id>", data = "<update>")]
pub async fn api_update_module(
    id: i64,
    admin: AdminUser,
    update: Json<UpdateModuleRequest>,
    db: &State<Database>,
) -> Result<Json<Module>, ApiError> {
    let request = update.validate_custom()?;
    if let Some(materials) = &request.materials {
        validate_materials(materials).validate_custom()?;
    }

    let updated = update_module(db, id, &ModuleChanges::from(request))
        .await
        .validate_custom()?;

    info!(module_id = %id, version = updated.version, admin = %admin.0.id, "Module updated");
    Ok(Json(updated))
}

#[post("/modules/upload-audio", data = "<upload>")]
pub async fn api_upload_audio(
    admin: AdminUser,
    upload: Json<UploadAudioRequest>,
    store: &State<UploadStore>,
) -> Result<Json<StoredUpload>, ApiError> {
    admin
        .0
        .require_permission(Permission::UploadMaterials)
        .validate_custom()?;
    let request = upload.validate_custom()?;

    let stored = store
        .store_audio(&request.file_name, &request.file_data, &request.content_type)
        .await
        .validate_custom()?;

    Ok(Json(stored))
}

// Logins and the current user

#[post("/admin/login", data = "<login>")]
pub async fn api_admin_login(
    login: Json<AdminLoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Database>,
    config: &State<PortalConfig>,
    throttle: &State<LoginThrottle>,
) -> Result<Json<AdminLoginResponse>, ApiError> {
    let request = login.validate_custom()?;

    let admin = authenticate_admin(db, config, throttle, &request.email, &request.ra)
        .await
        .validate_custom()?;

    start_session(
        db,
        config,
        cookies,
        UpsertUser::admin(admin.id, &admin.name, &admin.email),
    )
    .await
    .validate_custom()?;

    Ok(Json(AdminLoginResponse {
        success: true,
        admin,
    }))
}

#[post("/student/login", data = "<login>")]
pub async fn api_student_login(
    login: Json<StudentLoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Database>,
    config: &State<PortalConfig>,
    throttle: &State<LoginThrottle>,
) -> Result<Json<StudentLoginResponse>, ApiError> {
    let request = login.validate_custom()?;

    let student = authenticate_student(db, config, throttle, &request.email, &request.password)
        .await
        .validate_custom()?;

    start_session(
        db,
        config,
        cookies,
        UpsertUser::student(student.id, &student.name, &student.email),
    )
    .await
    .validate_custom()?;

    Ok(Json(StudentLoginResponse {
        success: true,
        student,
    }))
}

#[get("/auth/me")]
pub fn api_me(user: Option<User>) -> Json<Option<User>> {
    Json(user)
}

#[post("/auth/logout")]
pub async fn api_logout(
    cookies: &CookieJar<'_>,
    db: &State<Database>,
    editors: &State<EditorStore>,
) -> Json<Value> {
    end_session(db, editors, cookies).await;
    Json(json!({ "success": true }))
}

// Student administration

#[get("/admin/students")]
pub async fn api_list_students(
    admin: AdminUser,
    db: &State<Database>,
) -> Result<Json<Vec<Student>>, ApiError> {
    admin
        .0
        .require_permission(Permission::ManageStudents)
        .validate_custom()?;
    Ok(Json(get_all_students(db).await))
}

#[get("/admin/students/<id>")]
pub async fn api_get_student(
    id: i64,
    admin: AdminUser,
    db: &State<Database>,
) -> Result<Json<Student>, ApiError> {
    admin
        .0
        .require_permission(Permission::ManageStudents)
        .validate_custom()?;
    match get_student_by_id(db, id).await {
        Some(student) => Ok(Json(student)),
        None => Err(Status::NotFound.to_validation_response()),
    }
}

#[post("/admin/students", data = "<student>")]
pub async fn api_create_student(
    admin: AdminUser,
    student: Json<CreateStudentRequest>,
    db: &State<Database>,
    config: &State<PortalConfig>,
) -> Result<Created<Json<Student>>, ApiError> {
    admin
        .0
        .require_permission(Permission::ManageStudents)
        .validate_custom()?;
    let request = student.validate_custom()?;

    let created = create_student(
        db,
        &NewStudent {
            name: request.name,
            email: request.email,
            password: request.password,
            is_active: request.is_active.unwrap_or(true),
        },
        config.bcrypt_cost,
    )
    .await
    .validate_custom()?;

    Ok(Created::new(format!("/api/admin/students/{}", created.id)).body(Json(created)))
}

#[put("/admin/students/<id>", data = "<student>")]
pub async fn api_update_student(
    id: i64,
    admin: AdminUser,
    student: Json<UpdateStudentRequest>,
    db: &State<Database>,
    config: &State<PortalConfig>,
) -> Result<Json<Student>, ApiError> {
    admin
        .0
        .require_permission(Permission::ManageStudents)
        .validate_custom()?;
    let request = student.validate_custom()?;

    let changes = StudentChanges {
        name: request.name,
        email: request.email,
        password: request.password,
        is_active: request.is_active,
    };

    let updated = update_student(db, id, &changes, config.bcrypt_cost)
        .await
        .validate_custom()?;

    Ok(Json(updated))
}

#[delete("/admin/students/<id>")]
pub async fn api_delete_student(
    id: i64,
    admin: AdminUser,
    db: &State<Database>,
) -> Result<Json<Value>, ApiError> {
    admin
        .0
        .require_permission(Permission::ManageStudents)
        .validate_custom()?;
    let deleted = delete_student(db, id).await.validate_custom()?;
    if !deleted {
        return Err(
            AppError::NotFound(format!("Student with id {} not found", id)).to_validation_response(),
        );
    }

    Ok(Json(json!({ "success": true })))
}

/// Reports 503 when the portal is running without its database.
#[get("/health")]
pub fn health(db: &State<Database>) -> Result<&'static str, AppError> {
    db.require()?;
    Ok("OK")
}
