use crate::authz::{self, Action, Resource};
use crate::errors::FirError;
use crate::session::Identity;
use crate::storage::{self, ProfileUpdate, Registration, Role, User};
use miette::{IntoDiagnostic, Result};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Root structure of the officer roster file
#[derive(Debug, Clone, Deserialize)]
pub struct OfficersFile {
    pub officers: Vec<Registration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncResult {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Sync police accounts from a JSON roster (idempotent).
pub async fn sync_officers_from_file(db: &DatabaseConnection, path: &Path) -> Result<SyncSummary> {
    tracing::info!("Loading officer roster from {}", path.display());

    let content = fs::read_to_string(path)
        .into_diagnostic()
        .map_err(|e| miette::miette!("Failed to read officer roster at '{}': {}", path.display(), e))?;

    let roster: OfficersFile = serde_json::from_str(&content)
        .into_diagnostic()
        .map_err(|e| {
            miette::miette!(
                "Failed to parse officer roster: {}\n\nExpected format:\n{{\n  \"officers\": [\n    {{\n      \"name\": \"Inspector Rao\",\n      \"email\": \"rao@police.example\",\n      \"password\": \"change-me\",\n      \"phone\": \"9876543210\",\n      \"nationalId\": \"123412341234\"\n    }}\n  ]\n}}",
                e
            )
        })?;

    tracing::info!("Found {} officer(s) in roster", roster.officers.len());

    let mut summary = SyncSummary::default();
    for officer in &roster.officers {
        let result = sync_officer(db, officer)
            .await
            .map_err(|e| miette::miette!("Officer '{}': {}", officer.email, e))?;
        match result {
            SyncResult::Created => summary.created += 1,
            SyncResult::Updated => summary.updated += 1,
            SyncResult::Unchanged => summary.unchanged += 1,
        }
    }

    tracing::info!(
        "Officer sync complete: {} created, {} updated, {} unchanged",
        summary.created,
        summary.updated,
        summary.unchanged
    );

    Ok(summary)
}

/// Create or refresh a single officer. Name and phone follow the roster;
/// the password is only set when the account is created.
pub async fn sync_officer(db: &DatabaseConnection, def: &Registration) -> Result<SyncResult, FirError> {
    def.check()?;

    let existing = storage::get_user_by_email(db, &def.email).await?;
    let Some(user) = existing else {
        tracing::info!("Creating officer: {}", def.email);
        storage::create_user(db, def.clone().into_new_user(Role::Police)).await?;
        return Ok(SyncResult::Created);
    };

    if user.role != Role::Police {
        return Err(FirError::Validation(format!(
            "{} belongs to a citizen account and cannot be provisioned as police",
            user.email
        )));
    }

    let name_matches = user.name == def.name.trim();
    let phone_matches = user.phone == def.phone.trim();
    if name_matches && phone_matches {
        return Ok(SyncResult::Unchanged);
    }

    tracing::info!("Updating officer: {}", user.email);
    storage::update_user_profile(
        db,
        &user.id,
        ProfileUpdate {
            name: Some(def.name.clone()),
            phone: Some(def.phone.clone()),
        },
    )
    .await?;
    Ok(SyncResult::Updated)
}

/// Register a new police account on behalf of an existing officer.
pub async fn register_officer(
    db: &DatabaseConnection,
    identity: &Identity,
    registration: Registration,
) -> Result<User, FirError> {
    authz::require(Some(identity), Action::RegisterOfficer, Resource::None)?;
    registration.check()?;

    let user = storage::create_user(db, registration.into_new_user(Role::Police)).await?;
    tracing::info!(officer = %user.id, by = %identity.user_id, "Registered officer");
    Ok(user)
}
