#[cfg(test)]
pub mod test_db {
    use crate::auth::MIN_BCRYPT_COST;
    use crate::database::Database;
    use crate::db::{create_admin, create_module, create_student};
    use crate::error::AppError;
    use crate::models::{Material, MaterialKind, NewModule, NewStudent};
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";
    pub static STANDARD_RA: &str = "RA-2024-0042";
    pub const TEST_BCRYPT_COST: u32 = MIN_BCRYPT_COST;

    #[derive(Default)]
    pub struct TestDbBuilder {
        admins: Vec<TestAdmin>,
        students: Vec<TestStudent>,
        modules: Vec<NewModule>,
    }

    pub struct TestAdmin {
        pub name: String,
        pub email: String,
        pub ra: String,
    }

    pub struct TestStudent {
        pub name: String,
        pub email: String,
        pub password: String,
        pub is_active: bool,
    }

    pub fn init_test_logging() {
        INIT.call_once(|| {
            let _ = env_logger::builder()
                .parse_filters("debug")
                .is_test(true)
                .try_init();
            let _ = tracing_subscriber::fmt()
                .with_env_filter("debug")
                .with_test_writer()
                .try_init();
        });
    }

    /// One connection, never recycled, so the in-memory database survives the test.
    pub async fn memory_pool() -> Result<Pool<Sqlite>, sqlx::Error> {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
    }

    pub fn material(id: &str, kind: MaterialKind, url: &str) -> Material {
        Material {
            id: id.to_string(),
            name: format!("{}.file", id),
            kind,
            url: Some(url.to_string()),
            embed_code: None,
            uploaded_at: "2025-06-01".to_string(),
        }
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn admin(self, name: &str, email: &str) -> Self {
            self.admin_with_ra(name, email, STANDARD_RA)
        }

        pub fn admin_with_ra(mut self, name: &str, email: &str, ra: &str) -> Self {
            self.admins.push(TestAdmin {
                name: name.to_string(),
                email: email.to_string(),
                ra: ra.to_string(),
            });
            self
        }

        pub fn student(mut self, name: &str, email: &str) -> Self {
            self.students.push(TestStudent {
                name: name.to_string(),
                email: email.to_string(),
                password: STANDARD_PASSWORD.to_string(),
                is_active: true,
            });
            self
        }

        pub fn inactive_student(mut self, name: &str, email: &str) -> Self {
            self.students.push(TestStudent {
                name: name.to_string(),
                email: email.to_string(),
                password: STANDARD_PASSWORD.to_string(),
                is_active: false,
            });
            self
        }

        pub fn module(self, title: &str, duration: &str) -> Self {
            self.module_with_materials(title, duration, Vec::new())
        }

        pub fn module_with_materials(
            mut self,
            title: &str,
            duration: &str,
            materials: Vec<Material>,
        ) -> Self {
            self.modules.push(NewModule {
                title: title.to_string(),
                instructor: "Isabela".to_string(),
                duration: duration.to_string(),
                format: "Video".to_string(),
                description: format!("About {}", title),
                materials,
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            init_test_logging();

            let pool = memory_pool().await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            let db = Database::from_pool(pool);

            let mut admin_ids = HashMap::new();
            for admin in &self.admins {
                let created =
                    create_admin(&db, &admin.name, &admin.email, &admin.ra, TEST_BCRYPT_COST)
                        .await?;
                admin_ids.insert(admin.email.clone(), created.id);
            }

            let mut student_ids = HashMap::new();
            for student in &self.students {
                let created = create_student(
                    &db,
                    &NewStudent {
                        name: student.name.clone(),
                        email: student.email.clone(),
                        password: student.password.clone(),
                        is_active: student.is_active,
                    },
                    TEST_BCRYPT_COST,
                )
                .await?;
                student_ids.insert(student.email.clone(), created.id);
            }

            let mut module_ids = HashMap::new();
            for module in &self.modules {
                let created = create_module(&db, module).await?;
                module_ids.insert(module.title.clone(), created.id);
            }

            Ok(TestDb {
                db,
                admin_ids,
                student_ids,
                module_ids,
            })
        }
    }

    pub struct TestDb {
        pub db: Database,
        pub admin_ids: HashMap<String, i64>,
        pub student_ids: HashMap<String, i64>,
        pub module_ids: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn pool(&self) -> &Pool<Sqlite> {
            self.db.pool().expect("test database always has a pool")
        }

        pub fn admin_id(&self, email: &str) -> Option<i64> {
            self.admin_ids.get(email).copied()
        }

        pub fn student_id(&self, email: &str) -> Option<i64> {
            self.student_ids.get(email).copied()
        }

        pub fn module_id(&self, title: &str) -> Option<i64> {
            self.module_ids.get(title).copied()
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    use crate::env::PortalConfig;
    use crate::init_rocket;
    use crate::models::MaterialKind;
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use tempfile::TempDir;

    pub use super::test_db::{
        STANDARD_PASSWORD, STANDARD_RA, TEST_BCRYPT_COST, TestDb, TestDbBuilder, material,
    };

    pub const ADMIN_EMAIL: &str = "coord@eduqly.test";
    pub const STUDENT_EMAIL: &str = "ana@eduqly.test";
    pub const INACTIVE_EMAIL: &str = "bruno@eduqly.test";

    /// Keeps the upload directory alive as long as the client.
    pub struct TestEnv {
        pub db: TestDb,
        pub uploads: TempDir,
    }

    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .admin("Coordinator", ADMIN_EMAIL)
            .student("Ana", STUDENT_EMAIL)
            .inactive_student("Bruno", INACTIVE_EMAIL)
            .module_with_materials(
                "Introduction",
                "5 min",
                vec![material(
                    "1-intro",
                    MaterialKind::Video,
                    "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
                )],
            )
            .module("Power BI fundamentals", "15 min")
            .module("Step-by-step tutorial", "30 min")
            .build()
            .await
            .expect("Failed to build test database")
    }

    pub fn test_config(uploads: &TempDir) -> PortalConfig {
        PortalConfig {
            upload_dir: uploads.path().to_path_buf(),
            bcrypt_cost: TEST_BCRYPT_COST,
            ..PortalConfig::default()
        }
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestEnv) {
        setup_test_client_with(test_db, |_| {}).await
    }

    pub async fn setup_test_client_with(
        test_db: TestDb,
        configure: impl FnOnce(&mut PortalConfig),
    ) -> (Client, TestEnv) {
        let uploads = tempfile::tempdir().expect("Failed to create upload dir");
        let mut config = test_config(&uploads);
        configure(&mut config);

        let rocket = init_rocket(test_db.db.clone(), config).await;
        let client = Client::tracked(rocket)
            .await
            .expect("Failed to create test client");

        (
            client,
            TestEnv {
                db: test_db,
                uploads,
            },
        )
    }

    pub async fn login_admin(client: &Client, email: &str, ra: &str) -> Status {
        client
            .post("/api/admin/login")
            .header(ContentType::JSON)
            .body(json!({ "email": email, "ra": ra }).to_string())
            .dispatch()
            .await
            .status()
    }

    pub async fn login_student(client: &Client, email: &str, password: &str) -> Status {
        client
            .post("/api/student/login")
            .header(ContentType::JSON)
            .body(json!({ "email": email, "password": password }).to_string())
            .dispatch()
            .await
            .status()
    }
}
