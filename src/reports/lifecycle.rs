use super::number::ReportNumberSource;
use super::record::{self, parse_stored_status};
use super::types::{IncidentType, NewReport, Report, ReportStatus, StatusChange};
use crate::authz::{self, Action, Resource};
use crate::entities::{self, report, status_update};
use crate::errors::FirError;
use crate::session::Identity;
use crate::storage::{now_millis, random_id};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::time::Duration;
use tokio::time::Instant;

pub const MIN_DESCRIPTION_CHARS: usize = 20;
pub const MAX_COMMENT_CHARS: usize = 2000;
const UNKNOWN_ACCUSED: &str = "Unknown";

/// Validated, normalised form of a `NewReport`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReportFields {
    complainant_name: String,
    complainant_phone: String,
    incident_type: IncidentType,
    incident_date: NaiveDate,
    incident_location: String,
    description: String,
    accused_name: String,
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, FirError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FirError::Validation(format!("{field} is required")));
    }
    Ok(trimmed)
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp.
fn parse_incident_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok().or_else(|| {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).date_naive())
    })
}

fn validate(input: &NewReport, today: NaiveDate) -> Result<ReportFields, FirError> {
    let complainant_name = required(&input.complainant_name, "complainantName")?;
    let complainant_phone = required(&input.complainant_phone, "complainantPhone")?;
    let incident_type = required(&input.incident_type, "incidentType")?;
    let incident_date = required(&input.incident_date, "incidentDate")?;
    let incident_location = required(&input.incident_location, "incidentLocation")?;
    let description = required(&input.description, "description")?;

    let incident_type = IncidentType::parse(incident_type).ok_or_else(|| {
        FirError::Validation(format!("incidentType `{incident_type}` is not recognised"))
    })?;

    let incident_date = parse_incident_date(incident_date).ok_or_else(|| {
        FirError::Validation("incidentDate must be a date in YYYY-MM-DD form".to_string())
    })?;
    if incident_date > today {
        return Err(FirError::Validation(
            "incidentDate cannot be in the future".to_string(),
        ));
    }

    if description.chars().count() < MIN_DESCRIPTION_CHARS {
        return Err(FirError::Validation(format!(
            "description must be at least {MIN_DESCRIPTION_CHARS} characters"
        )));
    }

    let accused_name = input
        .accused_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_ACCUSED);

    Ok(ReportFields {
        complainant_name: complainant_name.to_string(),
        complainant_phone: complainant_phone.to_string(),
        incident_type,
        incident_date,
        incident_location: incident_location.to_string(),
        description: description.to_string(),
        accused_name: accused_name.to_string(),
    })
}

async fn number_taken(db: &DatabaseConnection, number: &str) -> Result<bool, FirError> {
    Ok(entities::Report::find()
        .filter(report::Column::ReportNumber.eq(number))
        .one(db)
        .await?
        .is_some())
}

/// Write the report row and its initial `Filed` history entry together. The
/// stored report is read back before the commit.
async fn insert_report(
    db: &DatabaseConnection,
    owner_id: &str,
    number: &str,
    fields: &ReportFields,
) -> Result<Report, FirError> {
    let id = random_id();
    let now = now_millis();

    let row = report::ActiveModel {
        id: Set(id.clone()),
        report_number: Set(number.to_string()),
        complainant_name: Set(fields.complainant_name.clone()),
        complainant_phone: Set(fields.complainant_phone.clone()),
        incident_type: Set(fields.incident_type.as_str().to_string()),
        incident_date: Set(fields.incident_date.format("%Y-%m-%d").to_string()),
        incident_location: Set(fields.incident_location.clone()),
        description: Set(fields.description.clone()),
        accused_name: Set(fields.accused_name.clone()),
        status: Set(ReportStatus::Filed.as_str().to_string()),
        owner_id: Set(owner_id.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        version: Set(0),
    };
    let initial = status_update::ActiveModel {
        id: NotSet,
        report_id: Set(id.clone()),
        seq: Set(0),
        status: Set(ReportStatus::Filed.as_str().to_string()),
        comment: Set(String::new()),
        created_at: Set(now),
    };

    let txn = db.begin().await?;
    entities::Report::insert(row).exec(&txn).await?;
    entities::StatusUpdate::insert(initial).exec(&txn).await?;
    let stored = record::load_report(&txn, &id)
        .await?
        .ok_or_else(|| FirError::Unexpected("report vanished after insert".into()))?;
    txn.commit().await?;
    Ok(stored)
}

/// Fails once `deadline` has passed. Only ever called before a transaction
/// starts, so a failure here means nothing was written.
fn check_deadline(deadline: Option<Instant>, what: &str) -> Result<(), FirError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(FirError::TransientStorage(format!(
            "request deadline exceeded before {what}"
        ))),
        _ => Ok(()),
    }
}

/// File a new report for the calling citizen.
///
/// Each report number candidate is checked before the insert and the unique
/// index catches a concurrent winner; either kind of collision moves on to the
/// next candidate until `max_attempts` is spent.
pub async fn create_report(
    db: &DatabaseConnection,
    numbers: &dyn ReportNumberSource,
    max_attempts: u32,
    identity: &Identity,
    input: NewReport,
) -> Result<Report, FirError> {
    file_report(db, numbers, max_attempts, None, identity, input).await
}

/// [`create_report`], but no new attempt is started after `deadline`.
pub async fn create_report_before(
    db: &DatabaseConnection,
    numbers: &dyn ReportNumberSource,
    max_attempts: u32,
    deadline: Instant,
    identity: &Identity,
    input: NewReport,
) -> Result<Report, FirError> {
    file_report(db, numbers, max_attempts, Some(deadline), identity, input).await
}

async fn file_report(
    db: &DatabaseConnection,
    numbers: &dyn ReportNumberSource,
    max_attempts: u32,
    deadline: Option<Instant>,
    identity: &Identity,
    input: NewReport,
) -> Result<Report, FirError> {
    authz::require(Some(identity), Action::CreateReport, Resource::None)?;
    let fields = validate(&input, Utc::now().date_naive())?;

    for attempt in 0..max_attempts {
        check_deadline(deadline, "filing the report")?;
        let number = numbers.candidate(attempt);
        if number_taken(db, &number).await? {
            tracing::warn!(%number, attempt, "Report number collision, rerolling");
            continue;
        }

        match insert_report(db, &identity.user_id, &number, &fields).await {
            Ok(report) => {
                tracing::info!(report_id = %report.id, report_number = %number, owner = %identity.user_id, "Filed report");
                return Ok(report);
            }
            Err(FirError::DuplicateKey(field)) if field == "report_number" => {
                tracing::warn!(%number, attempt, "Report number taken concurrently, rerolling");
            }
            Err(e) => return Err(e),
        }
    }

    Err(FirError::DuplicateKey("report_number".to_string()))
}

/// Outcome of one optimistic append attempt.
enum Append {
    Applied(Report),
    LostRace,
}

/// Move the report from `expected_version` to the next version and append the
/// matching history entry, all in one transaction. The conditional update goes
/// first so the transaction takes the write lock before reading anything; the
/// updated report is read back before the commit.
async fn try_append(
    db: &DatabaseConnection,
    report_id: &str,
    expected_version: i64,
    status: ReportStatus,
    comment: &str,
) -> Result<Append, FirError> {
    let now = now_millis();
    let next = expected_version + 1;

    let txn = db.begin().await?;
    let updated = entities::Report::update_many()
        .col_expr(report::Column::Status, Expr::value(status.as_str()))
        .col_expr(report::Column::Version, Expr::value(next))
        .col_expr(report::Column::UpdatedAt, Expr::value(now))
        .filter(report::Column::Id.eq(report_id))
        .filter(report::Column::Version.eq(expected_version))
        .exec(&txn)
        .await?;

    if updated.rows_affected == 0 {
        txn.rollback().await?;
        return Ok(Append::LostRace);
    }

    let entry = status_update::ActiveModel {
        id: NotSet,
        report_id: Set(report_id.to_string()),
        seq: Set(next),
        status: Set(status.as_str().to_string()),
        comment: Set(comment.to_string()),
        created_at: Set(now),
    };
    entities::StatusUpdate::insert(entry).exec(&txn).await?;
    let stored = record::load_report(&txn, report_id)
        .await?
        .ok_or_else(|| FirError::NotFound("Report".to_string()))?;
    txn.commit().await?;
    Ok(Append::Applied(stored))
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(5 * u64::from(attempt.min(10)))
}

/// Set a new status on any report and append it to the history.
///
/// Concurrent updates of the same report are serialised through the
/// report's version column; a caller that loses the race re-reads and tries
/// again, giving up with a transient error after `max_attempts`.
pub async fn update_status(
    db: &DatabaseConnection,
    identity: &Identity,
    report_id: &str,
    change: StatusChange,
    max_attempts: u32,
) -> Result<Report, FirError> {
    change_status(db, identity, report_id, change, max_attempts, None).await
}

/// [`update_status`], but no new attempt is started after `deadline`.
pub async fn update_status_before(
    db: &DatabaseConnection,
    identity: &Identity,
    report_id: &str,
    change: StatusChange,
    max_attempts: u32,
    deadline: Instant,
) -> Result<Report, FirError> {
    change_status(db, identity, report_id, change, max_attempts, Some(deadline)).await
}

async fn change_status(
    db: &DatabaseConnection,
    identity: &Identity,
    report_id: &str,
    change: StatusChange,
    max_attempts: u32,
    deadline: Option<Instant>,
) -> Result<Report, FirError> {
    authz::require(Some(identity), Action::UpdateStatus, Resource::None)?;

    let status = ReportStatus::parse(&change.status).ok_or_else(|| {
        let allowed: Vec<&str> = ReportStatus::ALL.iter().map(|s| s.as_str()).collect();
        FirError::Validation(format!(
            "status `{}` is not one of: {}",
            change.status,
            allowed.join(", ")
        ))
    })?;
    let comment = change.comment.unwrap_or_default();
    if comment.chars().count() > MAX_COMMENT_CHARS {
        return Err(FirError::Validation(format!(
            "comment must be at most {MAX_COMMENT_CHARS} characters"
        )));
    }

    for attempt in 1..=max_attempts {
        check_deadline(deadline, "updating the status")?;
        let current = record::find_model(db, report_id)
            .await?
            .ok_or_else(|| FirError::NotFound("Report".to_string()))?;
        let from = parse_stored_status(&current.status)?;

        match try_append(db, report_id, current.version, status, &comment).await {
            Ok(Append::Applied(report)) => {
                tracing::info!(%report_id, %from, to = %status, by = %identity.user_id, "Report status changed");
                return Ok(report);
            }
            Ok(Append::LostRace) => {
                tracing::warn!(%report_id, attempt, "Concurrent status update, retrying");
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(%report_id, attempt, error = %e, "Storage busy during status update, retrying");
            }
            Err(e) => return Err(e),
        }
        tokio::time::sleep(backoff(attempt)).await;
    }

    Err(FirError::TransientStorage(format!(
        "report {report_id} is being updated concurrently"
    )))
}
