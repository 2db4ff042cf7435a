use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;
use url::Url;

use crate::error::AppError;
use crate::render::{parse_site_path, sanitize_embed};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MaterialKind {
    Video,
    Audio,
    Pdf,
    Powerpoint,
    Iframe,
    Webpage,
    /// Kept verbatim so old rows still render; never accepted on write.
    Unsupported(String),
}

impl MaterialKind {
    pub const ALL: [MaterialKind; 6] = [
        MaterialKind::Video,
        MaterialKind::Audio,
        MaterialKind::Pdf,
        MaterialKind::Powerpoint,
        MaterialKind::Iframe,
        MaterialKind::Webpage,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            MaterialKind::Video => "video",
            MaterialKind::Audio => "audio",
            MaterialKind::Pdf => "pdf",
            MaterialKind::Powerpoint => "powerpoint",
            MaterialKind::Iframe => "iframe",
            MaterialKind::Webpage => "webpage",
            MaterialKind::Unsupported(raw) => raw,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            MaterialKind::Video => "Video",
            MaterialKind::Audio => "Audio",
            MaterialKind::Pdf => "PDF",
            MaterialKind::Powerpoint => "PowerPoint",
            MaterialKind::Iframe => "Embed",
            MaterialKind::Webpage => "Web page",
            MaterialKind::Unsupported(raw) => raw,
        }
    }

    pub fn default_extension(&self) -> Option<&'static str> {
        match self {
            MaterialKind::Video => Some("mp4"),
            MaterialKind::Audio => Some("mp3"),
            MaterialKind::Pdf => Some("pdf"),
            MaterialKind::Powerpoint => Some("pptx"),
            _ => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, MaterialKind::Unsupported(_))
    }
}

impl From<String> for MaterialKind {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "video" | "youtube" => MaterialKind::Video,
            "audio" => MaterialKind::Audio,
            "pdf" => MaterialKind::Pdf,
            "powerpoint" => MaterialKind::Powerpoint,
            "iframe" => MaterialKind::Iframe,
            "webpage" => MaterialKind::Webpage,
            _ => MaterialKind::Unsupported(value),
        }
    }
}

impl From<&str> for MaterialKind {
    fn from(value: &str) -> Self {
        MaterialKind::from(value.to_string())
    }
}

impl From<MaterialKind> for String {
    fn from(kind: MaterialKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MaterialKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(
        default,
        rename = "iframeCode",
        skip_serializing_if = "Option::is_none"
    )]
    pub embed_code: Option<String>,
    pub uploaded_at: String,
}

impl Material {
    /// Blank strings count as absent.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    pub fn embed_code(&self) -> Option<&str> {
        self.embed_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Enforces one payload shape per kind.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.id.trim().is_empty() {
            return Err(AppError::Validation("Material id is required".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "Material {} needs a name",
                self.id
            )));
        }

        match (&self.kind, self.url(), self.embed_code()) {
            (MaterialKind::Unsupported(raw), _, _) => Err(AppError::Validation(format!(
                "Unsupported material type: {}",
                raw
            ))),
            (MaterialKind::Iframe, Some(_), Some(_)) => Err(AppError::Validation(format!(
                "Material {} must have either a url or embed code, not both",
                self.id
            ))),
            (MaterialKind::Iframe, None, None) => Err(AppError::Validation(format!(
                "Material {} needs a url or embed code",
                self.id
            ))),
            (MaterialKind::Iframe, None, Some(code)) => match sanitize_embed(code) {
                Some(_) => Ok(()),
                None => Err(AppError::Validation(format!(
                    "Embed code of material {} must be a single iframe with an http(s) source",
                    self.id
                ))),
            },
            (_, Some(url), None) => validate_url(&self.id, url),
            (kind, None, _) => Err(AppError::Validation(format!(
                "Material {} of type {} needs a url",
                self.id, kind
            ))),
            (kind, Some(_), Some(_)) => Err(AppError::Validation(format!(
                "Material {} of type {} does not accept embed code",
                self.id, kind
            ))),
        }
    }
}

fn validate_url(material_id: &str, url: &str) -> Result<(), AppError> {
    if is_acceptable_url(url) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Material {} has an invalid url",
            material_id
        )))
    }
}

/// Absolute http(s), site-relative, or the `#` placeholder the editor inserts.
pub fn is_acceptable_url(url: &str) -> bool {
    if url == "#" {
        return true;
    }
    if url.chars().any(|c| c.is_whitespace() || c == '"' || c == '<' || c == '>') {
        return false;
    }
    if url.starts_with('/') {
        return parse_site_path(url).is_some();
    }

    Url::parse(url).is_ok_and(|parsed| {
        matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some()
    })
}

pub fn validate_materials(materials: &[Material]) -> Result<(), AppError> {
    let mut seen = std::collections::HashSet::new();
    for material in materials {
        material.validate()?;
        if !seen.insert(material.id.as_str()) {
            return Err(AppError::Validation(format!(
                "Duplicate material id: {}",
                material.id
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: i64,
    pub title: String,
    pub instructor: String,
    pub duration: String,
    pub format: String,
    pub description: String,
    pub materials: Vec<Material>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Module {
    pub fn material(&self, id: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.id == id)
    }
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbModule {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub instructor: Option<String>,
    pub duration: Option<String>,
    pub format: Option<String>,
    pub description: Option<String>,
    pub files: Option<String>,
    pub version: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<DbModule> for Module {
    fn from(db: DbModule) -> Self {
        let id = db.id.unwrap_or_default();
        let materials = match db.files.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                serde_json::from_str::<Vec<Material>>(raw).unwrap_or_else(|e| {
                    warn!(module_id = %id, error = %e, "Unreadable materials column, showing none");
                    Vec::new()
                })
            }
            _ => Vec::new(),
        };

        Self {
            id,
            title: db.title.unwrap_or_default(),
            instructor: db.instructor.unwrap_or_default(),
            duration: db.duration.unwrap_or_default(),
            format: db.format.unwrap_or_default(),
            description: db.description.unwrap_or_default(),
            materials,
            version: db.version.unwrap_or(1),
            created_at: to_utc(db.created_at),
            updated_at: to_utc(db.updated_at),
        }
    }
}

/// Fields of a module as submitted for creation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewModule {
    pub title: String,
    pub instructor: String,
    pub duration: String,
    pub format: String,
    pub description: String,
    pub materials: Vec<Material>,
}

/// Partial module update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleChanges {
    pub title: Option<String>,
    pub instructor: Option<String>,
    pub duration: Option<String>,
    pub format: Option<String>,
    pub description: Option<String>,
    pub materials: Option<Vec<Material>>,
    pub expected_version: Option<i64>,
}

impl ModuleChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.instructor.is_none()
            && self.duration.is_none()
            && self.format.is_none()
            && self.description.is_none()
            && self.materials.is_none()
    }

    pub fn apply_to(&self, module: &mut Module) {
        if let Some(title) = &self.title {
            module.title = title.clone();
        }
        if let Some(instructor) = &self.instructor {
            module.instructor = instructor.clone();
        }
        if let Some(duration) = &self.duration {
            module.duration = duration.clone();
        }
        if let Some(format) = &self.format {
            module.format = format.clone();
        }
        if let Some(description) = &self.description {
            module.description = description.clone();
        }
        if let Some(materials) = &self.materials {
            module.materials = materials.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbAdmin {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub ra_hash: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbAdmin> for Admin {
    fn from(db: DbAdmin) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            name: db.name.unwrap_or_default(),
            email: db.email.unwrap_or_default(),
            created_at: to_utc(db.created_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbStudent {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbStudent> for Student {
    fn from(db: DbStudent) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            name: db.name.unwrap_or_default(),
            email: db.email.unwrap_or_default(),
            is_active: db.is_active.unwrap_or(true),
            created_at: to_utc(db.created_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStudent {
    pub name: String,
    pub email: String,
    pub password: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
}

/// Accepts a JSON boolean or the strings "true"/"false".
pub fn deserialize_flexible_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flexible {
        Bool(bool),
        Text(String),
    }

    match Option::<Flexible>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Flexible::Bool(value)) => Ok(Some(value)),
        Some(Flexible::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            other => Err(serde::de::Error::custom(format!(
                "expected true or false, got {}",
                other
            ))),
        },
    }
}

pub fn to_utc(value: Option<NaiveDateTime>) -> DateTime<Utc> {
    value
        .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}
