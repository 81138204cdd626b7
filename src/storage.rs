use crate::entities;
use crate::errors::FirError;
use crate::settings::Database as DbCfg;
use base64ct::Encoding;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Citizen,
    Police,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Citizen => "citizen",
            Role::Police => "police",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "citizen" => Some(Role::Citizen),
            "police" => Some(Role::Police),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub national_id: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: i64,
    pub updated_at: i64,
}

/// User record as returned over the API (never carries the password hash).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub national_id: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            national_id: user.national_id.clone(),
            role: user.role,
            created_at: millis_to_datetime(user.created_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub national_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
}

impl ProfileUpdate {
    pub fn check(&self) -> Result<(), FirError> {
        if let Some(name) = &self.name {
            check_name(name)?;
        }
        if let Some(phone) = &self.phone {
            check_phone(phone)?;
        }
        Ok(())
    }
}

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{10}$").expect("valid phone regex"));
static NATIONAL_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{12}$").expect("valid national id regex"));

fn check_name(name: &str) -> Result<(), FirError> {
    if name.trim().is_empty() {
        return Err(FirError::Validation("name is required".to_string()));
    }
    Ok(())
}

fn check_phone(phone: &str) -> Result<(), FirError> {
    if !PHONE_RE.is_match(phone.trim()) {
        return Err(FirError::Validation(
            "phone must be exactly 10 digits".to_string(),
        ));
    }
    Ok(())
}

/// Account details submitted at registration, also used for officer
/// provisioning.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct Registration {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    #[validate(email(message = "email is not a valid address"))]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
    pub phone: String,
    pub national_id: String,
}

impl Registration {
    pub fn check(&self) -> Result<(), FirError> {
        self.validate()?;
        check_name(&self.name)?;
        check_phone(&self.phone)?;
        if !NATIONAL_ID_RE.is_match(self.national_id.trim()) {
            return Err(FirError::Validation(
                "nationalId must be exactly 12 digits".to_string(),
            ));
        }
        Ok(())
    }

    pub fn into_new_user(self, role: Role) -> NewUser {
        NewUser {
            name: self.name,
            email: self.email,
            password: self.password,
            phone: self.phone,
            national_id: self.national_id,
            role,
        }
    }
}

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, FirError> {
    use migration::{Migrator, MigratorTrait};

    let mut opts = ConnectOptions::new(cfg.url.clone());
    opts.connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_secs))
        .sqlx_logging(false);

    let db = Database::connect(opts).await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub(crate) fn random_id() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_password(password: &str) -> Result<String, FirError> {
    use argon2::password_hash::{rand_core::OsRng, SaltString};
    use argon2::{Argon2, PasswordHasher};

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| FirError::Unexpected(format!("Password hashing failed: {}", e)))
}

// Verified against when the email is unknown, so a miss costs the same as a
// wrong password.
static DUMMY_HASH: Lazy<Option<String>> = Lazy::new(|| hash_password("efir-dummy-password").ok());

fn password_matches(password: &str, hash: &str) -> Result<bool, FirError> {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| FirError::Unexpected(format!("Invalid password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn user_from_model(model: entities::user::Model) -> Result<User, FirError> {
    let role = Role::parse(&model.role)
        .ok_or_else(|| FirError::Unexpected(format!("unknown role `{}`", model.role)))?;
    Ok(User {
        id: model.id,
        name: model.name,
        email: model.email,
        phone: model.phone,
        national_id: model.national_id,
        password_hash: model.password_hash,
        role,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

// User management functions

pub async fn create_user<C: ConnectionTrait>(db: &C, input: NewUser) -> Result<User, FirError> {
    let email = normalize_email(&input.email);

    if get_user_by_email(db, &email).await?.is_some() {
        return Err(FirError::DuplicateKey("email".to_string()));
    }
    if get_user_by_national_id(db, &input.national_id)
        .await?
        .is_some()
    {
        return Err(FirError::DuplicateKey("national_id".to_string()));
    }

    let id = random_id();
    let now = now_millis();
    let password_hash = hash_password(&input.password)?;

    let user = entities::user::ActiveModel {
        id: Set(id.clone()),
        name: Set(input.name.trim().to_string()),
        email: Set(email),
        phone: Set(input.phone.trim().to_string()),
        national_id: Set(input.national_id.trim().to_string()),
        password_hash: Set(password_hash),
        role: Set(input.role.as_str().to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    };

    // A concurrent registration can still win the race; the unique indexes
    // turn that into DuplicateKey via From<DbErr>.
    let model = user.insert(db).await?;
    tracing::info!(user_id = %model.id, role = %model.role, "Created user");
    user_from_model(model)
}

pub async fn get_user_by_email<C: ConnectionTrait>(
    db: &C,
    email: &str,
) -> Result<Option<User>, FirError> {
    use entities::user::{Column, Entity};

    Entity::find()
        .filter(Column::Email.eq(normalize_email(email)))
        .one(db)
        .await?
        .map(user_from_model)
        .transpose()
}

pub async fn get_user_by_id<C: ConnectionTrait>(
    db: &C,
    id: &str,
) -> Result<Option<User>, FirError> {
    entities::User::find_by_id(id.to_string())
        .one(db)
        .await?
        .map(user_from_model)
        .transpose()
}

pub async fn get_user_by_national_id<C: ConnectionTrait>(
    db: &C,
    national_id: &str,
) -> Result<Option<User>, FirError> {
    use entities::user::{Column, Entity};

    Entity::find()
        .filter(Column::NationalId.eq(national_id.trim()))
        .one(db)
        .await?
        .map(user_from_model)
        .transpose()
}

/// Check an email/password pair. `None` for an unknown email or a wrong
/// password alike.
pub async fn verify_user_password(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
) -> Result<Option<User>, FirError> {
    let user = match get_user_by_email(db, email).await? {
        Some(u) => u,
        None => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = password_matches(password, dummy);
            }
            return Ok(None);
        }
    };

    if password_matches(password, &user.password_hash)? {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

/// Update the mutable profile fields (name, phone). Role, email and national
/// ID never change after registration.
pub async fn update_user_profile(
    db: &DatabaseConnection,
    id: &str,
    update: ProfileUpdate,
) -> Result<User, FirError> {
    let user = entities::User::find_by_id(id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| FirError::NotFound("User".to_string()))?;

    let mut active: entities::user::ActiveModel = user.into();
    if let Some(name) = update.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(phone) = update.phone {
        active.phone = Set(phone.trim().to_string());
    }
    active.updated_at = Set(now_millis());

    let model = active.update(db).await?;
    user_from_model(model)
}
