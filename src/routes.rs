use chrono::Utc;
use rocket::form::Form;
use rocket::http::{CookieJar, Status};
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::{Request, State};
use rocket_dyn_templates::Template;
use tracing::{info, warn};
use validator::Validate;

use crate::auth::{
    AdminUser, LoginThrottle, Permission, UpsertUser, User, authenticate_admin,
    authenticate_student, end_session, start_session,
};
use crate::course::{CourseState, CourseView};
use crate::database::Database;
use crate::db::{
    create_module, create_student, delete_student, get_all_modules, get_all_students,
    get_module_by_id, get_student_by_id, update_module, update_student,
};
use crate::editor::{EditorStore, MaterialPatch, ModuleField};
use crate::env::PortalConfig;
use crate::error::AppError;
use crate::models::{MaterialKind, Module, NewModule, NewStudent, StudentChanges, validate_materials};
use crate::pages::{self, chrome};
use crate::validation::{FormValidateExt, form_error_message};

type PageResult = Result<Flash<Redirect>, Flash<Redirect>>;

/// Message safe to show on a page; internals stay in the logs.
fn user_message(err: &AppError, context: &str) -> String {
    err.log_and_record(context);
    match err {
        AppError::Database(_) | AppError::Internal(_) => "Something went wrong, try again".to_string(),
        AppError::ExternalService(_) => "The service is temporarily unavailable".to_string(),
        AppError::Conflict(_) => {
            "This module was changed by someone else. Cancel and edit again.".to_string()
        }
        AppError::Authentication(msg)
        | AppError::Authorization(msg)
        | AppError::NotFound(msg)
        | AppError::Validation(msg)
        | AppError::RateLimited(msg) => msg.clone(),
    }
}

#[get("/")]
pub async fn index(
    user: Option<User>,
    flash: Option<FlashMessage<'_>>,
    db: &State<Database>,
) -> Template {
    let modules = get_all_modules(db).await;
    pages::home(chrome("Eduqly", user.as_ref(), flash.as_ref()), &modules)
}

#[get("/course?<module>&<material>&<done>")]
pub async fn course_page(
    user: User,
    module: Option<i64>,
    material: Option<String>,
    done: Option<String>,
    db: &State<Database>,
) -> Result<Template, Status> {
    user.require_permission(Permission::ViewCourse)?;

    let modules = get_all_modules(db).await;
    let state = CourseState::from_query(module, material, done.as_deref());
    let view = CourseView::new(&modules, state);

    Ok(pages::course(chrome("Course", Some(&user), None), &view))
}

// Logins

#[derive(FromForm)]
pub struct AdminLoginForm {
    email: String,
    ra: String,
}

#[derive(FromForm)]
pub struct StudentLoginForm {
    email: String,
    password: String,
}

#[get("/admin/login")]
pub fn admin_login(flash: Option<FlashMessage<'_>>) -> Template {
    pages::login(
        chrome("Admin login", None, flash.as_ref()),
        "/admin/login",
        "ra",
        "RA code",
    )
}

#[post("/admin/login", data = "<form>")]
pub async fn process_admin_login(
    form: Form<AdminLoginForm>,
    cookies: &CookieJar<'_>,
    db: &State<Database>,
    config: &State<PortalConfig>,
    throttle: &State<LoginThrottle>,
) -> Result<Redirect, Flash<Redirect>> {
    let failed = |err: AppError| {
        Flash::error(
            Redirect::to("/admin/login"),
            user_message(&err, "Admin login"),
        )
    };

    let admin = authenticate_admin(db, config, throttle, &form.email, &form.ra)
        .await
        .map_err(failed)?;
    start_session(
        db,
        config,
        cookies,
        UpsertUser::admin(admin.id, &admin.name, &admin.email),
    )
    .await
    .map_err(failed)?;

    Ok(Redirect::to("/admin/modules"))
}

#[get("/student/login")]
pub fn student_login(flash: Option<FlashMessage<'_>>) -> Template {
    pages::login(
        chrome("Student login", None, flash.as_ref()),
        "/student/login",
        "password",
        "Password",
    )
}

#[post("/student/login", data = "<form>")]
pub async fn process_student_login(
    form: Form<StudentLoginForm>,
    cookies: &CookieJar<'_>,
    db: &State<Database>,
    config: &State<PortalConfig>,
    throttle: &State<LoginThrottle>,
) -> Result<Redirect, Flash<Redirect>> {
    let failed = |err: AppError| {
        Flash::error(
            Redirect::to("/student/login"),
            user_message(&err, "Student login"),
        )
    };

    let student = authenticate_student(db, config, throttle, &form.email, &form.password)
        .await
        .map_err(failed)?;
    start_session(
        db,
        config,
        cookies,
        UpsertUser::student(student.id, &student.name, &student.email),
    )
    .await
    .map_err(failed)?;

    Ok(Redirect::to("/course"))
}

#[get("/logout")]
pub async fn logout(
    cookies: &CookieJar<'_>,
    db: &State<Database>,
    editors: &State<EditorStore>,
) -> Redirect {
    end_session(db, editors, cookies).await;
    Redirect::to("/")
}

// Module manager

fn module_redirect(module_id: i64) -> Redirect {
    Redirect::to(format!("/admin/modules?module={}", module_id))
}

fn module_error(module_id: i64, message: impl Into<String>) -> Flash<Redirect> {
    Flash::error(module_redirect(module_id), message.into())
}

async fn load_module(db: &Database, module_id: i64) -> Result<Module, Flash<Redirect>> {
    get_module_by_id(db, module_id).await.ok_or_else(|| {
        warn!(module_id = %module_id, "Module not found for editing");
        Flash::error(Redirect::to("/admin/modules"), "Module not found")
    })
}

#[get("/admin/modules?<module>&<preview>")]
pub async fn admin_modules(
    admin: AdminUser,
    module: Option<i64>,
    preview: Option<String>,
    flash: Option<FlashMessage<'_>>,
    db: &State<Database>,
    editors: &State<EditorStore>,
) -> Template {
    let modules = get_all_modules(db).await;
    let selected = module
        .and_then(|id| modules.iter().find(|m| m.id == id))
        .cloned();
    let editor = selected.map(|m| editors.snapshot(&admin.0.id, m));

    pages::admin_modules(
        chrome("Modules", Some(&admin.0), flash.as_ref()),
        &modules,
        editor.as_ref(),
        preview.as_deref(),
    )
}

#[derive(FromForm, Validate)]
pub struct ModuleFieldsForm {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    title: String,
    #[validate(length(max = 200, message = "Instructor must be at most 200 characters"))]
    instructor: String,
    #[validate(length(max = 50, message = "Duration must be at most 50 characters"))]
    duration: String,
    #[validate(length(max = 200, message = "Format must be at most 200 characters"))]
    format: String,
    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    description: String,
}

impl ModuleFieldsForm {
    /// Same rules as the RPC module requests, on the trimmed title.
    fn checked(mut self) -> Result<Self, String> {
        self.title = self.title.trim().to_string();
        self.validate().map_err(|e| form_error_message(&e))?;
        Ok(self)
    }
}

impl From<&Module> for ModuleFieldsForm {
    fn from(module: &Module) -> Self {
        Self {
            title: module.title.clone(),
            instructor: module.instructor.clone(),
            duration: module.duration.clone(),
            format: module.format.clone(),
            description: module.description.clone(),
        }
    }
}

#[post("/admin/modules", data = "<form>")]
pub async fn create_module_page(
    admin: AdminUser,
    form: Form<ModuleFieldsForm>,
    db: &State<Database>,
) -> PageResult {
    let form = form
        .into_inner()
        .checked()
        .map_err(|message| Flash::error(Redirect::to("/admin/modules"), message))?;

    let module = NewModule {
        title: form.title,
        instructor: form.instructor,
        duration: form.duration,
        format: form.format,
        description: form.description,
        materials: Vec::new(),
    };

    match create_module(db, &module).await {
        Ok(created) => {
            info!(module_id = %created.id, admin = %admin.0.id, "Module created from page");
            Ok(Flash::success(module_redirect(created.id), "Module created"))
        }
        Err(e) => Err(Flash::error(
            Redirect::to("/admin/modules"),
            user_message(&e, "Create module page"),
        )),
    }
}

#[post("/admin/modules/<id>/edit")]
pub async fn start_edit(
    id: i64,
    admin: AdminUser,
    db: &State<Database>,
    editors: &State<EditorStore>,
) -> PageResult {
    let current = load_module(db, id).await?;
    editors.apply(&admin.0.id, current, |editor| editor.start_edit());
    Ok(Flash::success(module_redirect(id), "Editing started"))
}

#[post("/admin/modules/<id>/draft", data = "<form>")]
pub async fn edit_draft(
    id: i64,
    admin: AdminUser,
    form: Form<ModuleFieldsForm>,
    db: &State<Database>,
    editors: &State<EditorStore>,
) -> PageResult {
    let form = form
        .into_inner()
        .checked()
        .map_err(|message| module_error(id, message))?;
    let current = load_module(db, id).await?;

    editors
        .apply(&admin.0.id, current, |editor| {
            editor.edit_field(ModuleField::Title, form.title)?;
            editor.edit_field(ModuleField::Instructor, form.instructor)?;
            editor.edit_field(ModuleField::Duration, form.duration)?;
            editor.edit_field(ModuleField::Format, form.format)?;
            editor.edit_field(ModuleField::Description, form.description)
        })
        .map_err(|e| module_error(id, e.to_string()))?;

    Ok(Flash::success(module_redirect(id), "Draft updated"))
}

#[derive(FromForm)]
pub struct NewMaterialForm {
    kind: String,
}

#[post("/admin/modules/<id>/materials", data = "<form>")]
pub async fn add_material(
    id: i64,
    admin: AdminUser,
    form: Form<NewMaterialForm>,
    db: &State<Database>,
    editors: &State<EditorStore>,
) -> PageResult {
    let kind = MaterialKind::from(form.kind.as_str());
    if !kind.is_supported() {
        return Err(module_error(id, format!("Unsupported material type: {}", kind)));
    }

    let current = load_module(db, id).await?;
    editors
        .apply(&admin.0.id, current, |editor| {
            editor.add_material(kind, Utc::now())
        })
        .map_err(|e| module_error(id, e.to_string()))?;

    Ok(Flash::success(module_redirect(id), "Material added to the draft"))
}

#[derive(FromForm)]
pub struct MaterialForm {
    kind: String,
    name: String,
    url: String,
    embed_code: String,
}

#[post("/admin/modules/<id>/materials/<material_id>", data = "<form>")]
pub async fn update_material(
    id: i64,
    material_id: &str,
    admin: AdminUser,
    form: Form<MaterialForm>,
    db: &State<Database>,
    editors: &State<EditorStore>,
) -> PageResult {
    let form = form.into_inner();
    let patch = MaterialPatch {
        kind: Some(MaterialKind::from(form.kind)),
        name: Some(form.name),
        url: Some(form.url),
        embed_code: Some(form.embed_code),
    };

    let current = load_module(db, id).await?;
    editors
        .apply(&admin.0.id, current, |editor| {
            editor.update_material(material_id, patch)
        })
        .map_err(|e| module_error(id, e.to_string()))?;

    Ok(Flash::success(module_redirect(id), "Material updated in the draft"))
}

#[post("/admin/modules/<id>/materials/<material_id>/remove")]
pub async fn remove_material(
    id: i64,
    material_id: &str,
    admin: AdminUser,
    db: &State<Database>,
    editors: &State<EditorStore>,
) -> PageResult {
    let current = load_module(db, id).await?;
    editors
        .apply(&admin.0.id, current, |editor| {
            editor.remove_material(material_id)
        })
        .map_err(|e| module_error(id, e.to_string()))?;

    Ok(Flash::success(module_redirect(id), "Material removed from the draft"))
}

#[post("/admin/modules/<id>/cancel")]
pub async fn cancel_edit(
    id: i64,
    admin: AdminUser,
    db: &State<Database>,
    editors: &State<EditorStore>,
) -> PageResult {
    let current = load_module(db, id).await?;
    editors.apply(&admin.0.id, current, |editor| editor.cancel());
    Ok(Flash::success(module_redirect(id), "Changes discarded"))
}

/// On failure the draft is kept so nothing typed is lost.
#[post("/admin/modules/<id>/save")]
pub async fn save_module(
    id: i64,
    admin: AdminUser,
    db: &State<Database>,
    editors: &State<EditorStore>,
) -> PageResult {
    let current = load_module(db, id).await?;
    let draft = editors.snapshot(&admin.0.id, current.clone());
    ModuleFieldsForm::from(draft.module())
        .checked()
        .map_err(|message| module_error(id, message))?;

    let changes = editors
        .apply(&admin.0.id, current, |editor| editor.pending_changes())
        .map_err(|e| module_error(id, e.to_string()))?;

    if let Some(materials) = &changes.materials {
        validate_materials(materials)
            .map_err(|e| module_error(id, user_message(&e, "Save module page")))?;
    }

    let saved = update_module(db, id, &changes)
        .await
        .map_err(|e| module_error(id, user_message(&e, "Save module page")))?;

    let shown = saved.clone();
    editors.apply(&admin.0.id, saved, move |editor| editor.commit(shown));
    info!(module_id = %id, admin = %admin.0.id, "Module saved from editor");

    Ok(Flash::success(module_redirect(id), "Module saved"))
}

// Student manager

#[get("/admin/students")]
pub async fn admin_students(
    admin: AdminUser,
    flash: Option<FlashMessage<'_>>,
    db: &State<Database>,
) -> Result<Template, Status> {
    admin.0.require_permission(Permission::ManageStudents)?;

    let students = get_all_students(db).await;
    Ok(pages::admin_students(
        chrome("Students", Some(&admin.0), flash.as_ref()),
        &students,
    ))
}

#[derive(FromForm, Validate)]
pub struct NewStudentForm {
    #[validate(length(min = 1, max = 120, message = "Name is required"))]
    name: String,
    #[validate(email(message = "Enter a valid email address"))]
    email: String,
    #[validate(length(min = 6, max = 128, message = "Password must be 6-128 characters"))]
    password: String,
    is_active: bool,
}

fn students_redirect() -> Redirect {
    Redirect::to("/admin/students")
}

fn require_student_admin(admin: &AdminUser) -> Result<(), Flash<Redirect>> {
    admin
        .0
        .require_permission(Permission::ManageStudents)
        .map_err(|_| Flash::error(Redirect::to("/admin/login"), "Student management is not allowed"))
}

#[post("/admin/students", data = "<form>")]
pub async fn create_student_page(
    admin: AdminUser,
    form: Form<NewStudentForm>,
    db: &State<Database>,
    config: &State<PortalConfig>,
) -> PageResult {
    require_student_admin(&admin)?;
    let form = form
        .validate_form()
        .map_err(|message| Flash::error(students_redirect(), message))?;

    let student = NewStudent {
        name: form.name,
        email: form.email,
        password: form.password,
        is_active: form.is_active,
    };

    create_student(db, &student, config.bcrypt_cost)
        .await
        .map_err(|e| Flash::error(students_redirect(), user_message(&e, "Create student page")))?;

    Ok(Flash::success(students_redirect(), "Student created"))
}

#[post("/admin/students/<id>/toggle")]
pub async fn toggle_student(
    id: i64,
    admin: AdminUser,
    db: &State<Database>,
    config: &State<PortalConfig>,
) -> PageResult {
    require_student_admin(&admin)?;
    let student = get_student_by_id(db, id)
        .await
        .ok_or_else(|| Flash::error(students_redirect(), "Student not found"))?;

    let changes = StudentChanges {
        is_active: Some(!student.is_active),
        ..Default::default()
    };
    let updated = update_student(db, id, &changes, config.bcrypt_cost)
        .await
        .map_err(|e| Flash::error(students_redirect(), user_message(&e, "Toggle student page")))?;

    let message = if updated.is_active {
        "Student activated"
    } else {
        "Student deactivated"
    };
    Ok(Flash::success(students_redirect(), message))
}

#[post("/admin/students/<id>/delete")]
pub async fn delete_student_page(id: i64, admin: AdminUser, db: &State<Database>) -> PageResult {
    require_student_admin(&admin)?;
    match delete_student(db, id).await {
        Ok(true) => Ok(Flash::success(students_redirect(), "Student deleted")),
        Ok(false) => Err(Flash::error(students_redirect(), "Student not found")),
        Err(e) => Err(Flash::error(
            students_redirect(),
            user_message(&e, "Delete student page"),
        )),
    }
}

#[catch(404)]
pub fn not_found(req: &Request) -> Template {
    pages::not_found(req.uri().path().as_str())
}
