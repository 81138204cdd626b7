use efir::session::Identity;
use efir::storage::{self, NewUser, Role, User};
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tempfile::NamedTempFile;

/// Test database with automatic cleanup
pub struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        // Connect to database
        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        // Run migrations
        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    /// Get database connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}

/// Create a citizen account with the given email and national ID
pub async fn seed_citizen(db: &DatabaseConnection, email: &str, national_id: &str) -> User {
    seed_user(db, email, national_id, Role::Citizen).await
}

/// Create a police account with the given email and national ID
pub async fn seed_officer(db: &DatabaseConnection, email: &str, national_id: &str) -> User {
    seed_user(db, email, national_id, Role::Police).await
}

async fn seed_user(db: &DatabaseConnection, email: &str, national_id: &str, role: Role) -> User {
    storage::create_user(
        db,
        NewUser {
            name: "Test User".to_string(),
            email: email.to_string(),
            password: "secret1".to_string(),
            phone: "9999999999".to_string(),
            national_id: national_id.to_string(),
            role,
        },
    )
    .await
    .expect("Failed to create test user")
}

pub fn identity(user: &User) -> Identity {
    Identity::from(user)
}
