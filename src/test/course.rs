#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::course::{CourseProgress, CourseState, CourseView, duration_minutes};
    use crate::models::{MaterialKind, Module};
    use crate::test::test_db::material;
    use chrono::Utc;

    fn module(id: i64, duration: &str) -> Module {
        Module {
            id,
            title: format!("Module {}", id),
            instructor: "Isabela".to_string(),
            duration: duration.to_string(),
            format: "Video".to_string(),
            description: String::new(),
            materials: vec![material(
                &format!("{}-m", id),
                MaterialKind::Pdf,
                "/uploads/a.pdf",
            )],
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn course() -> Vec<Module> {
        vec![module(1, "5 min"), module(2, "15 min"), module(3, "30 min")]
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(duration_minutes("15 min"), 15);
        assert_eq!(duration_minutes(" 30min"), 30);
        assert_eq!(duration_minutes("about an hour"), 0);
        assert_eq!(duration_minutes(""), 0);
    }

    #[test]
    fn test_progress_is_weighted_by_minutes() {
        let modules = course();
        let progress = CourseProgress::compute(&modules, &BTreeSet::from([2]));

        assert_eq!(progress.total_minutes, 50);
        assert_eq!(progress.completed_minutes, 15);
        assert_eq!(progress.completed_modules, 1);
        assert_eq!(progress.module_count, 3);
        assert_eq!(progress.percent, 30);
    }

    #[test]
    fn test_progress_ignores_unknown_ids_and_empty_courses() {
        let modules = course();
        let progress = CourseProgress::compute(&modules, &BTreeSet::from([1, 2, 3, 99]));
        assert_eq!(progress.percent, 100);
        assert_eq!(progress.completed_modules, 3);

        let empty = CourseProgress::compute(&[], &BTreeSet::from([1]));
        assert_eq!(empty.percent, 0);
        assert_eq!(empty.total_minutes, 0);
    }

    #[test]
    fn test_huge_durations_do_not_overflow() {
        let modules = vec![module(1, "4000000000 min"), module(2, "4000000000 min")];
        let progress = CourseProgress::compute(&modules, &BTreeSet::from([1]));

        assert_eq!(progress.total_minutes, 8_000_000_000);
        assert_eq!(progress.completed_minutes, 4_000_000_000);
        assert_eq!(progress.percent, 50);
    }

    #[test]
    fn test_state_round_trips_through_the_query() {
        let state = CourseState::from_query(Some(2), Some("2-m".to_string()), Some("3,1,x,"));
        assert_eq!(state.completed, BTreeSet::from([1, 3]));
        assert_eq!(state.query_string(), "?module=2&material=2-m&done=1,3");

        assert_eq!(CourseState::default().query_string(), "");
    }

    #[test]
    fn test_state_transitions() {
        let state = CourseState::from_query(Some(1), Some("1-m".to_string()), None);

        let moved = state.select_module(2);
        assert_eq!(moved.module, Some(2));
        assert_eq!(moved.material, None);

        let picked = moved.select_material(3, "a b");
        assert_eq!(picked.query_string(), "?module=3&material=a%20b");

        let done = picked.toggle_completed(3);
        assert!(done.completed.contains(&3));
        let undone = done.toggle_completed(3);
        assert!(!undone.completed.contains(&3));
    }

    #[test]
    fn test_view_falls_back_to_first_module() {
        let modules = course();
        let view = CourseView::new(&modules, CourseState::from_query(Some(42), None, None));
        assert_eq!(view.selected_module().map(|m| m.id), Some(1));
        assert!(view.selected_material().is_none());
        assert!(view.previous_module().is_none());
        assert_eq!(view.next_module().map(|m| m.id), Some(2));
    }

    #[test]
    fn test_view_selection_and_neighbours() {
        let modules = course();
        let state = CourseState::from_query(Some(3), Some("3-m".to_string()), Some("3"));
        let view = CourseView::new(&modules, state);

        assert_eq!(view.selected_material().map(|m| m.id.as_str()), Some("3-m"));
        assert!(view.is_completed(3));
        assert_eq!(view.previous_module().map(|m| m.id), Some(2));
        assert!(view.next_module().is_none());
        assert_eq!(view.progress().percent, 60);

        let foreign = CourseView::new(
            &modules,
            CourseState::from_query(Some(3), Some("1-m".to_string()), None),
        );
        assert!(foreign.selected_material().is_none());
    }
}
