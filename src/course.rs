use std::collections::BTreeSet;

use serde::Serialize;

use crate::models::{Material, Module};

/// Leading whole minutes of a free-text duration like "15 min"; 0 when absent.
pub fn duration_minutes(duration: &str) -> u32 {
    let digits: String = duration
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CourseProgress {
    pub total_minutes: u64,
    pub completed_minutes: u64,
    pub completed_modules: usize,
    pub module_count: usize,
    pub percent: u32,
}

fn sum_minutes<'a>(modules: impl Iterator<Item = &'a Module>) -> u64 {
    modules.fold(0u64, |total, m| {
        total.saturating_add(u64::from(duration_minutes(&m.duration)))
    })
}

impl CourseProgress {
    pub fn compute(modules: &[Module], completed: &BTreeSet<i64>) -> Self {
        let total_minutes = sum_minutes(modules.iter());
        let done: Vec<&Module> = modules
            .iter()
            .filter(|m| completed.contains(&m.id))
            .collect();
        let completed_minutes = sum_minutes(done.iter().copied());

        let percent = if total_minutes == 0 {
            0
        } else {
            (completed_minutes as f64 * 100.0 / total_minutes as f64).round() as u32
        };

        Self {
            total_minutes,
            completed_minutes,
            completed_modules: done.len(),
            module_count: modules.len(),
            percent,
        }
    }
}

/// Viewer state carried in the course page's query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseState {
    pub module: Option<i64>,
    pub material: Option<String>,
    pub completed: BTreeSet<i64>,
}

impl CourseState {
    /// `done` is a comma separated id list; junk entries are dropped.
    pub fn from_query(module: Option<i64>, material: Option<String>, done: Option<&str>) -> Self {
        let completed = done
            .unwrap_or_default()
            .split(',')
            .filter_map(|id| id.trim().parse().ok())
            .collect();

        Self {
            module,
            material: material.filter(|m| !m.is_empty()),
            completed,
        }
    }

    pub fn select_module(&self, module_id: i64) -> Self {
        Self {
            module: Some(module_id),
            material: None,
            completed: self.completed.clone(),
        }
    }

    pub fn select_material(&self, module_id: i64, material_id: &str) -> Self {
        Self {
            module: Some(module_id),
            material: Some(material_id.to_string()),
            completed: self.completed.clone(),
        }
    }

    pub fn toggle_completed(&self, module_id: i64) -> Self {
        let mut next = self.clone();
        if !next.completed.remove(&module_id) {
            next.completed.insert(module_id);
        }
        next
    }

    pub fn query_string(&self) -> String {
        let mut params = Vec::new();
        if let Some(module) = self.module {
            params.push(format!("module={}", module));
        }
        if let Some(material) = &self.material {
            params.push(format!("material={}", urlencoding::encode(material)));
        }
        if !self.completed.is_empty() {
            let ids: Vec<String> = self.completed.iter().map(i64::to_string).collect();
            params.push(format!("done={}", ids.join(",")));
        }

        if params.is_empty() {
            String::new()
        } else {
            format!("?{}", params.join("&"))
        }
    }
}

pub struct CourseView<'a> {
    modules: &'a [Module],
    state: CourseState,
}

impl<'a> CourseView<'a> {
    pub fn new(modules: &'a [Module], state: CourseState) -> Self {
        Self { modules, state }
    }

    pub fn state(&self) -> &CourseState {
        &self.state
    }

    pub fn modules(&self) -> &'a [Module] {
        self.modules
    }

    /// Falls back to the first module when nothing (or an unknown id) is selected.
    pub fn selected_module(&self) -> Option<&'a Module> {
        self.state
            .module
            .and_then(|id| self.modules.iter().find(|m| m.id == id))
            .or_else(|| self.modules.first())
    }

    pub fn selected_material(&self) -> Option<&'a Material> {
        let module = self.selected_module()?;
        module.material(self.state.material.as_deref()?)
    }

    pub fn is_completed(&self, module_id: i64) -> bool {
        self.state.completed.contains(&module_id)
    }

    pub fn progress(&self) -> CourseProgress {
        CourseProgress::compute(self.modules, &self.state.completed)
    }

    fn selected_index(&self) -> Option<usize> {
        let selected = self.selected_module()?;
        self.modules.iter().position(|m| m.id == selected.id)
    }

    pub fn next_module(&self) -> Option<&'a Module> {
        self.modules.get(self.selected_index()? + 1)
    }

    pub fn previous_module(&self) -> Option<&'a Module> {
        let index = self.selected_index()?;
        index.checked_sub(1).and_then(|i| self.modules.get(i))
    }
}
