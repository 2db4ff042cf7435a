use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{Material, MaterialKind, Module, ModuleChanges};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditorError {
    #[error("Module is not being edited")]
    NotEditing,

    #[error("Material {0} is not part of this module")]
    UnknownMaterial(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleField {
    Title,
    Instructor,
    Duration,
    Format,
    Description,
}

impl ModuleField {
    fn slot<'m>(&self, module: &'m mut Module) -> &'m mut String {
        match self {
            ModuleField::Title => &mut module.title,
            ModuleField::Instructor => &mut module.instructor,
            ModuleField::Duration => &mut module.duration,
            ModuleField::Format => &mut module.format,
            ModuleField::Description => &mut module.description,
        }
    }
}

/// Replacement values for one material. Blank `url`/`embed_code` clear the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialPatch {
    pub kind: Option<MaterialKind>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub embed_code: Option<String>,
}

fn blank_to_none(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModuleEditor {
    Viewing(Module),
    Editing { persisted: Module, draft: Module },
}

impl ModuleEditor {
    pub fn new(module: Module) -> Self {
        ModuleEditor::Viewing(module)
    }

    pub fn is_editing(&self) -> bool {
        matches!(self, ModuleEditor::Editing { .. })
    }

    /// What the page shows: the draft while editing.
    pub fn module(&self) -> &Module {
        match self {
            ModuleEditor::Viewing(module) => module,
            ModuleEditor::Editing { draft, .. } => draft,
        }
    }

    pub fn persisted(&self) -> &Module {
        match self {
            ModuleEditor::Viewing(module) => module,
            ModuleEditor::Editing { persisted, .. } => persisted,
        }
    }

    pub fn start_edit(&mut self) {
        if let ModuleEditor::Viewing(module) = self {
            let module = module.clone();
            *self = ModuleEditor::Editing {
                persisted: module.clone(),
                draft: module,
            };
        }
    }

    fn draft_mut(&mut self) -> Result<&mut Module, EditorError> {
        match self {
            ModuleEditor::Editing { draft, .. } => Ok(draft),
            ModuleEditor::Viewing(_) => Err(EditorError::NotEditing),
        }
    }

    pub fn edit_field(
        &mut self,
        field: ModuleField,
        value: impl Into<String>,
    ) -> Result<(), EditorError> {
        let draft = self.draft_mut()?;
        *field.slot(draft) = value.into();
        Ok(())
    }

    /// Appends a placeholder material and returns its id.
    pub fn add_material(
        &mut self,
        kind: MaterialKind,
        now: DateTime<Utc>,
    ) -> Result<String, EditorError> {
        let draft = self.draft_mut()?;

        let base = format!("{}-{}", draft.id, now.timestamp_millis());
        let mut id = base.clone();
        let mut suffix = 2;
        while draft.material(&id).is_some() {
            id = format!("{}-{}", base, suffix);
            suffix += 1;
        }

        let name = match kind.default_extension() {
            Some(ext) => format!("new_{}.{}", kind, ext),
            None => format!("new_{}", kind),
        };

        draft.materials.push(Material {
            id: id.clone(),
            kind,
            name,
            url: Some("#".to_string()),
            embed_code: None,
            uploaded_at: now.format("%Y-%m-%d").to_string(),
        });

        debug!(material_id = %id, "Material added to draft");
        Ok(id)
    }

    pub fn update_material(&mut self, id: &str, patch: MaterialPatch) -> Result<(), EditorError> {
        let draft = self.draft_mut()?;
        let material = draft
            .materials
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| EditorError::UnknownMaterial(id.to_string()))?;

        if let Some(kind) = patch.kind {
            material.kind = kind;
        }
        if let Some(name) = patch.name {
            material.name = name;
        }
        if let Some(url) = patch.url {
            material.url = blank_to_none(url);
        }
        if let Some(code) = patch.embed_code {
            material.embed_code = blank_to_none(code);
        }

        Ok(())
    }

    pub fn remove_material(&mut self, id: &str) -> Result<(), EditorError> {
        let draft = self.draft_mut()?;
        let before = draft.materials.len();
        draft.materials.retain(|m| m.id != id);

        if draft.materials.len() == before {
            return Err(EditorError::UnknownMaterial(id.to_string()));
        }
        Ok(())
    }

    pub fn cancel(&mut self) {
        if let ModuleEditor::Editing { persisted, .. } = self {
            *self = ModuleEditor::Viewing(persisted.clone());
        }
    }

    /// Only the fields the draft changed, pinned to the persisted version.
    pub fn pending_changes(&self) -> Result<ModuleChanges, EditorError> {
        let ModuleEditor::Editing { persisted, draft } = self else {
            return Err(EditorError::NotEditing);
        };

        fn changed<T: PartialEq + Clone>(before: &T, after: &T) -> Option<T> {
            (before != after).then(|| after.clone())
        }

        Ok(ModuleChanges {
            title: changed(&persisted.title, &draft.title),
            instructor: changed(&persisted.instructor, &draft.instructor),
            duration: changed(&persisted.duration, &draft.duration),
            format: changed(&persisted.format, &draft.format),
            description: changed(&persisted.description, &draft.description),
            materials: changed(&persisted.materials, &draft.materials),
            expected_version: Some(persisted.version),
        })
    }

    pub fn commit(&mut self, saved: Module) {
        *self = ModuleEditor::Viewing(saved);
    }
}

/// Open editors of every admin, keyed by user id and module id.
#[derive(Debug, Default)]
pub struct EditorStore {
    editors: Mutex<HashMap<(String, i64), ModuleEditor>>,
}

impl EditorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` on the caller's editor. A non-editing editor is refreshed
    /// from `current` first so the page never shows stale data.
    pub fn apply<R>(
        &self,
        user_id: &str,
        current: Module,
        f: impl FnOnce(&mut ModuleEditor) -> R,
    ) -> R {
        let mut editors = self
            .editors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let key = (user_id.to_string(), current.id);
        let editor = editors
            .entry(key.clone())
            .or_insert_with(|| ModuleEditor::Viewing(current.clone()));
        if !editor.is_editing() {
            *editor = ModuleEditor::Viewing(current);
        }

        let result = f(editor);
        // Only open drafts are kept.
        if !editor.is_editing() {
            editors.remove(&key);
        }
        result
    }

    pub fn snapshot(&self, user_id: &str, current: Module) -> ModuleEditor {
        self.apply(user_id, current, |editor| editor.clone())
    }

    /// Drops every draft the user still has open.
    pub fn discard_user(&self, user_id: &str) {
        let mut editors = self
            .editors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = editors.len();
        editors.retain(|(owner, _), _| owner != user_id);
        if editors.len() != before {
            info!(user_id = %user_id, dropped = before - editors.len(), "Discarded open drafts");
        }
    }

    #[cfg(test)]
    pub(crate) fn open_drafts(&self) -> usize {
        self.editors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
