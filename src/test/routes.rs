#[cfg(test)]
mod tests {
    use crate::db::{get_all_modules, get_module_by_id, get_student_by_email};
    use crate::models::MaterialKind;
    use crate::test::test_utils::*;
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;

    async fn post_form(client: &Client, uri: String, body: &str) -> Status {
        client
            .post(uri)
            .header(ContentType::Form)
            .body(body.to_string())
            .dispatch()
            .await
            .status()
    }

    fn location(response: &rocket::local::asynchronous::LocalResponse<'_>) -> Option<String> {
        response.headers().get_one("Location").map(str::to_string)
    }

    #[rocket::async_test]
    async fn test_home_lists_modules() {
        let (client, _env) = setup_test_client(create_standard_test_db().await).await;

        let response = client.get("/").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        assert!(body.contains("Introduction"));
        assert!(body.contains("Power BI fundamentals"));
        assert!(body.contains("Student login"));
    }

    #[rocket::async_test]
    async fn test_course_requires_a_student_session() {
        let (client, _env) = setup_test_client(create_standard_test_db().await).await;

        let response = client.get("/course").dispatch().await;
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(location(&response).as_deref(), Some("/student/login"));
    }

    #[rocket::async_test]
    async fn test_student_form_login_opens_the_course() {
        let (client, _env) = setup_test_client(create_standard_test_db().await).await;

        let response = client
            .post("/student/login")
            .header(ContentType::Form)
            .body(format!("email={}&password={}", STUDENT_EMAIL, STANDARD_PASSWORD))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(location(&response).as_deref(), Some("/course"));

        let course = client.get("/course").dispatch().await;
        assert_eq!(course.status(), Status::Ok);
        let body = course.into_string().await.unwrap();
        assert!(body.contains("Progress: 0%"));
        assert!(body.contains("Mark as completed"));
        assert!(body.contains("Select a material to view it"));

        let viewer = client
            .get("/course?material=1-intro")
            .dispatch()
            .await
            .into_string()
            .await
            .unwrap();
        assert!(viewer.contains("https://www.youtube.com/embed/dQw4w9WgXcQ"));
    }

    #[rocket::async_test]
    async fn test_completed_modules_come_from_the_query() {
        let (client, env) = setup_test_client(create_standard_test_db().await).await;
        let intro = env.db.module_id("Introduction").unwrap();
        let tutorial = env.db.module_id("Step-by-step tutorial").unwrap();

        login_student(&client, STUDENT_EMAIL, STANDARD_PASSWORD).await;

        let body = client
            .get(format!("/course?module={}&done={},{}", intro, intro, tutorial))
            .dispatch()
            .await
            .into_string()
            .await
            .unwrap();
        // 35 of 50 minutes
        assert!(body.contains("Progress: 70%"));
        assert!(body.contains("Mark as not completed"));
    }

    #[rocket::async_test]
    async fn test_failed_form_login_flashes_an_error() {
        let (client, _env) = setup_test_client(create_standard_test_db().await).await;

        let response = client
            .post("/admin/login")
            .header(ContentType::Form)
            .body(format!("email={}&ra=wrong", ADMIN_EMAIL))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(location(&response).as_deref(), Some("/admin/login"));

        let page = client.get("/admin/login").dispatch().await;
        let body = page.into_string().await.unwrap();
        assert!(body.contains("Invalid email or RA code"));
    }

    #[rocket::async_test]
    async fn test_admin_pages_redirect_anonymous_visitors() {
        let (client, _env) = setup_test_client(create_standard_test_db().await).await;

        let response = client.get("/admin/modules").dispatch().await;
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(location(&response).as_deref(), Some("/admin/login"));

        login_student(&client, STUDENT_EMAIL, STANDARD_PASSWORD).await;
        let response = client.get("/admin/students").dispatch().await;
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(location(&response).as_deref(), Some("/admin/login"));
    }

    #[rocket::async_test]
    async fn test_editor_add_material_and_save() {
        let (client, env) = setup_test_client(create_standard_test_db().await).await;
        let id = env.db.module_id("Power BI fundamentals").unwrap();

        login_admin(&client, ADMIN_EMAIL, STANDARD_RA).await;

        assert_eq!(
            post_form(&client, format!("/admin/modules/{}/edit", id), "").await,
            Status::SeeOther
        );
        assert_eq!(
            post_form(&client, format!("/admin/modules/{}/materials", id), "kind=pdf").await,
            Status::SeeOther
        );

        let page = client
            .get(format!("/admin/modules?module={}", id))
            .dispatch()
            .await
            .into_string()
            .await
            .unwrap();
        assert!(page.contains("Editing: Power BI fundamentals"));
        assert!(page.contains("new_pdf.pdf"));

        // Nothing is stored until the draft is saved.
        let stored = get_module_by_id(&env.db.db, id).await.unwrap();
        assert!(stored.materials.is_empty());

        assert_eq!(
            post_form(&client, format!("/admin/modules/{}/save", id), "").await,
            Status::SeeOther
        );

        let stored = get_module_by_id(&env.db.db, id).await.unwrap();
        assert_eq!(stored.materials.len(), 1);
        assert_eq!(stored.materials[0].kind, MaterialKind::Pdf);
        assert_eq!(stored.version, 2);

        let page = client
            .get(format!("/admin/modules?module={}", id))
            .dispatch()
            .await
            .into_string()
            .await
            .unwrap();
        assert!(!page.contains("Editing:"));
        assert_eq!(page.matches("new_pdf.pdf").count(), 1);
    }

    #[rocket::async_test]
    async fn test_editor_remove_keeps_order_and_cancel_discards() {
        let test_db = TestDbBuilder::new()
            .admin("Coordinator", ADMIN_EMAIL)
            .module_with_materials(
                "Media",
                "10 min",
                vec![
                    material("a", MaterialKind::Video, "/uploads/a.mp4"),
                    material("b", MaterialKind::Pdf, "/uploads/b.pdf"),
                    material("c", MaterialKind::Audio, "/uploads/c.mp3"),
                ],
            )
            .build()
            .await
            .unwrap();
        let (client, env) = setup_test_client(test_db).await;
        let id = env.db.module_id("Media").unwrap();

        login_admin(&client, ADMIN_EMAIL, STANDARD_RA).await;

        post_form(&client, format!("/admin/modules/{}/edit", id), "").await;
        post_form(&client, format!("/admin/modules/{}/materials/b/remove", id), "").await;
        post_form(&client, format!("/admin/modules/{}/save", id), "").await;

        let stored = get_module_by_id(&env.db.db, id).await.unwrap();
        let ids: Vec<&str> = stored.materials.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        post_form(&client, format!("/admin/modules/{}/edit", id), "").await;
        post_form(
            &client,
            format!("/admin/modules/{}/draft", id),
            "title=Renamed&instructor=Julia&duration=10+min&format=Video&description=",
        )
        .await;
        post_form(&client, format!("/admin/modules/{}/cancel", id), "").await;

        let page = client
            .get(format!("/admin/modules?module={}", id))
            .dispatch()
            .await
            .into_string()
            .await
            .unwrap();
        assert!(!page.contains("Renamed"));

        let stored = get_module_by_id(&env.db.db, id).await.unwrap();
        assert_eq!(stored.title, "Media");
    }

    #[rocket::async_test]
    async fn test_editing_requires_starting_an_edit() {
        let (client, env) = setup_test_client(create_standard_test_db().await).await;
        let id = env.db.module_id("Introduction").unwrap();

        login_admin(&client, ADMIN_EMAIL, STANDARD_RA).await;

        post_form(&client, format!("/admin/modules/{}/materials", id), "kind=audio").await;

        let page = client
            .get(format!("/admin/modules?module={}", id))
            .dispatch()
            .await
            .into_string()
            .await
            .unwrap();
        assert!(page.contains("Module is not being edited"));
    }

    #[rocket::async_test]
    async fn test_student_pages_toggle_and_delete() {
        let (client, env) = setup_test_client(create_standard_test_db().await).await;
        let bruno = env.db.student_id(INACTIVE_EMAIL).unwrap();

        login_admin(&client, ADMIN_EMAIL, STANDARD_RA).await;

        post_form(&client, format!("/admin/students/{}/toggle", bruno), "").await;
        let student = get_student_by_email(&env.db.db, INACTIVE_EMAIL).await.unwrap();
        assert!(student.is_active);

        post_form(
            &client,
            "/admin/students".to_string(),
            "name=Carla&email=carla%40eduqly.test&password=secret123&is_active=on",
        )
        .await;
        assert!(get_student_by_email(&env.db.db, "carla@eduqly.test").await.is_some());

        post_form(&client, format!("/admin/students/{}/delete", bruno), "").await;
        assert!(get_student_by_email(&env.db.db, INACTIVE_EMAIL).await.is_none());

        let body = client
            .get("/admin/students")
            .dispatch()
            .await
            .into_string()
            .await
            .unwrap();
        assert!(body.contains("Student deleted"));
        assert!(body.contains("carla@eduqly.test"));
    }

    #[rocket::async_test]
    async fn test_unknown_page_renders_not_found() {
        let (client, _env) = setup_test_client(create_standard_test_db().await).await;

        let response = client.get("/nowhere").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
        assert!(response.into_string().await.unwrap().contains("Page not found"));
    }

    async fn page(client: &Client, uri: String) -> String {
        client
            .get(uri)
            .dispatch()
            .await
            .into_string()
            .await
            .unwrap()
    }

    #[rocket::async_test]
    async fn test_editor_rejects_an_empty_title() {
        let (client, env) = setup_test_client(create_standard_test_db().await).await;
        let id = env.db.module_id("Power BI fundamentals").unwrap();

        login_admin(&client, ADMIN_EMAIL, STANDARD_RA).await;
        post_form(&client, format!("/admin/modules/{}/edit", id), "").await;
        post_form(
            &client,
            format!("/admin/modules/{}/draft", id),
            "title=+++&instructor=Julia&duration=10+min&format=Video&description=",
        )
        .await;

        let body = page(&client, format!("/admin/modules?module={}", id)).await;
        assert!(body.contains("Title must be 1-200 characters"));

        post_form(&client, format!("/admin/modules/{}/save", id), "").await;

        let stored = get_module_by_id(&env.db.db, id).await.unwrap();
        assert_eq!(stored.title, "Power BI fundamentals");
        assert_eq!(stored.version, 1);
    }

    #[rocket::async_test]
    async fn test_new_module_form_is_validated() {
        let (client, env) = setup_test_client(create_standard_test_db().await).await;

        login_admin(&client, ADMIN_EMAIL, STANDARD_RA).await;
        let long_duration = "9".repeat(51);
        post_form(
            &client,
            "/admin/modules".to_string(),
            &format!(
                "title=Extra&instructor=&duration={}&format=&description=",
                long_duration
            ),
        )
        .await;

        let modules = get_all_modules(&env.db.db).await;
        assert!(modules.iter().all(|m| m.title != "Extra"));
        let body = page(&client, "/admin/modules".to_string()).await;
        assert!(body.contains("Duration must be at most 50 characters"));
    }

    #[rocket::async_test]
    async fn test_student_form_uses_the_email_rule() {
        let (client, env) = setup_test_client(create_standard_test_db().await).await;

        login_admin(&client, ADMIN_EMAIL, STANDARD_RA).await;
        post_form(
            &client,
            "/admin/students".to_string(),
            "name=Dora&email=dora%40&password=secret123&is_active=on",
        )
        .await;

        assert!(get_student_by_email(&env.db.db, "dora@").await.is_none());
        let body = page(&client, "/admin/students".to_string()).await;
        assert!(body.contains("Enter a valid email address"));
    }

    #[rocket::async_test]
    async fn test_logout_discards_open_drafts() {
        let (client, env) = setup_test_client(create_standard_test_db().await).await;
        let id = env.db.module_id("Power BI fundamentals").unwrap();

        login_admin(&client, ADMIN_EMAIL, STANDARD_RA).await;
        post_form(&client, format!("/admin/modules/{}/edit", id), "").await;
        assert!(
            page(&client, format!("/admin/modules?module={}", id))
                .await
                .contains("Editing:")
        );

        client.get("/logout").dispatch().await;
        login_admin(&client, ADMIN_EMAIL, STANDARD_RA).await;

        let body = page(&client, format!("/admin/modules?module={}", id)).await;
        assert!(!body.contains("Editing:"));
    }

    #[rocket::async_test]
    async fn test_page_values_are_escaped() {
        let test_db = TestDbBuilder::new()
            .module("<script>alert(1)</script>", "5 min")
            .build()
            .await
            .unwrap();
        let (client, _env) = setup_test_client(test_db).await;

        let body = page(&client, "/".to_string()).await;
        assert!(!body.contains("<script>alert(1)</script>"));
        assert!(body.contains("&lt;script&gt;"));
    }
}
