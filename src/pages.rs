//! Template contexts for the server-rendered pages.
//!
//! Every page extends `templates/base.html.tera`, which reads the shared
//! [`Chrome`]. Tera escapes all values; only the material viewer markup,
//! escaped by [`render_material`], is inserted with `safe`.

use rocket::request::FlashMessage;
use rocket_dyn_templates::{Template, context};
use serde::Serialize;

use crate::auth::{Permission, User};
use crate::course::CourseView;
use crate::editor::ModuleEditor;
use crate::models::{Material, MaterialKind, Module, Student};
use crate::render::render_material;

#[derive(Debug, Serialize)]
pub struct Chrome {
    title: String,
    user_name: Option<String>,
    can_edit_modules: bool,
    can_manage_students: bool,
    flash: Option<FlashView>,
}

#[derive(Debug, Serialize)]
struct FlashView {
    kind: String,
    message: String,
}

pub fn chrome(title: &str, user: Option<&User>, flash: Option<&FlashMessage<'_>>) -> Chrome {
    Chrome {
        title: title.to_string(),
        user_name: user.map(|u| u.name.clone()),
        can_edit_modules: user.is_some_and(|u| u.has_permission(Permission::EditModules)),
        can_manage_students: user.is_some_and(|u| u.has_permission(Permission::ManageStudents)),
        flash: flash.map(|f| FlashView {
            kind: f.kind().to_string(),
            message: f.message().to_string(),
        }),
    }
}

pub fn home(chrome: Chrome, modules: &[Module]) -> Template {
    Template::render("index", context! { chrome, modules })
}

pub fn login(chrome: Chrome, action: &str, secret_field: &str, secret_label: &str) -> Template {
    Template::render(
        "login",
        context! {
            heading: chrome.title.clone(),
            chrome,
            action,
            secret_field,
            secret_label,
        },
    )
}

#[derive(Debug, Serialize)]
struct CourseLink<'a> {
    title: &'a str,
    duration: &'a str,
    href: String,
    selected: bool,
    completed: bool,
}

#[derive(Debug, Serialize)]
struct MaterialLink<'a> {
    name: &'a str,
    kind: &'a str,
    href: String,
}

fn course_href(query: String) -> String {
    format!("/course{}", query)
}

pub fn course(chrome: Chrome, view: &CourseView<'_>) -> Template {
    let state = view.state();
    let selected = view.selected_module();

    let modules: Vec<CourseLink> = view
        .modules()
        .iter()
        .map(|module| CourseLink {
            title: &module.title,
            duration: &module.duration,
            href: course_href(state.select_module(module.id).query_string()),
            selected: selected.map(|s| s.id) == Some(module.id),
            completed: view.is_completed(module.id),
        })
        .collect();

    let materials: Vec<MaterialLink> = selected
        .map(|module| {
            module
                .materials
                .iter()
                .map(|material| MaterialLink {
                    name: &material.name,
                    kind: material.kind.label(),
                    href: course_href(state.select_material(module.id, &material.id).query_string()),
                })
                .collect()
        })
        .unwrap_or_default();

    let toggle = selected.map(|module| {
        context! {
            href: course_href(state.toggle_completed(module.id).query_string()),
            completed: view.is_completed(module.id),
        }
    });
    let neighbour = |module: Option<&Module>| {
        module.map(|m| {
            context! {
                title: m.title.clone(),
                href: course_href(state.select_module(m.id).query_string()),
            }
        })
    };

    Template::render(
        "course",
        context! {
            chrome,
            progress: view.progress(),
            modules,
            selected,
            toggle,
            materials,
            viewer: render_material(view.selected_material()),
            previous: neighbour(view.previous_module()),
            next: neighbour(view.next_module()),
        },
    )
}

#[derive(Debug, Serialize)]
struct KindOption {
    value: String,
    label: String,
    selected: bool,
}

fn kind_options(selected: &MaterialKind) -> Vec<KindOption> {
    MaterialKind::ALL
        .iter()
        .map(|kind| KindOption {
            value: kind.as_str().to_string(),
            label: kind.label().to_string(),
            selected: kind == selected,
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct MaterialRow<'a> {
    name: &'a str,
    kind_label: &'a str,
    kinds: Vec<KindOption>,
    url: &'a str,
    embed_code: &'a str,
    action: String,
    preview_href: String,
}

fn material_row(module_id: i64, material: &Material) -> MaterialRow<'_> {
    let encoded = urlencoding::encode(&material.id);
    MaterialRow {
        name: &material.name,
        kind_label: material.kind.label(),
        kinds: kind_options(&material.kind),
        url: material.url.as_deref().unwrap_or_default(),
        embed_code: material.embed_code.as_deref().unwrap_or_default(),
        action: format!("/admin/modules/{}/materials/{}", module_id, encoded),
        preview_href: format!("/admin/modules?module={}&preview={}", module_id, encoded),
    }
}

pub fn admin_modules(
    chrome: Chrome,
    modules: &[Module],
    editor: Option<&ModuleEditor>,
    preview: Option<&str>,
) -> Template {
    let shown = editor.map(ModuleEditor::module);
    let materials: Vec<MaterialRow> = shown
        .map(|module| {
            module
                .materials
                .iter()
                .map(|material| material_row(module.id, material))
                .collect()
        })
        .unwrap_or_default();
    let preview = shown
        .zip(preview)
        .and_then(|(module, id)| module.material(id))
        .map(|material| render_material(Some(material)));

    Template::render(
        "admin_modules",
        context! {
            chrome,
            modules,
            module: shown,
            editing: editor.is_some_and(ModuleEditor::is_editing),
            materials,
            new_kinds: kind_options(&MaterialKind::Video),
            preview,
        },
    )
}

pub fn admin_students(chrome: Chrome, students: &[Student]) -> Template {
    Template::render("admin_students", context! { chrome, students })
}

pub fn not_found(path: &str) -> Template {
    Template::render(
        "not_found",
        context! {
            chrome: chrome("Not found", None, None),
            path,
        },
    )
}
