//! Conversion between stored rows and the `Report` view, including the
//! status history that lives in its own table.

use super::types::{
    IncidentType, OwnerSummary, PoliceReportView, Report, ReportStatus, StatusUpdate,
};
use crate::entities::{self, report, status_update, user};
use crate::errors::FirError;
use crate::storage::millis_to_datetime;
use chrono::NaiveDate;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use std::collections::HashMap;

/// Ids bound per `IN (...)` query; SQLite caps bind parameters per statement.
const BATCH_SIZE: usize = 500;

fn corrupt(what: &str, value: &str) -> FirError {
    FirError::Unexpected(format!("stored {what} `{value}` is not recognised"))
}

pub(crate) fn parse_stored_status(value: &str) -> Result<ReportStatus, FirError> {
    ReportStatus::parse(value).ok_or_else(|| corrupt("status", value))
}

fn history_entry(model: status_update::Model) -> Result<StatusUpdate, FirError> {
    Ok(StatusUpdate {
        status: parse_stored_status(&model.status)?,
        comment: model.comment,
        timestamp: millis_to_datetime(model.created_at),
    })
}

/// Build the view from a row and its history rows (already ordered by `seq`).
pub(crate) fn report_from_model(
    model: report::Model,
    history: Vec<status_update::Model>,
) -> Result<Report, FirError> {
    let incident_type = IncidentType::parse(&model.incident_type)
        .ok_or_else(|| corrupt("incident type", &model.incident_type))?;
    let incident_date = NaiveDate::parse_from_str(&model.incident_date, "%Y-%m-%d")
        .map_err(|_| corrupt("incident date", &model.incident_date))?;

    Ok(Report {
        status: parse_stored_status(&model.status)?,
        status_history: history
            .into_iter()
            .map(history_entry)
            .collect::<Result<_, _>>()?,
        id: model.id,
        report_number: model.report_number,
        complainant_name: model.complainant_name,
        complainant_phone: model.complainant_phone,
        incident_type,
        incident_date,
        incident_location: model.incident_location,
        description: model.description,
        accused_name: model.accused_name,
        owner: model.owner_id,
        created_at: millis_to_datetime(model.created_at),
        updated_at: millis_to_datetime(model.updated_at),
    })
}

pub(crate) async fn find_model<C: ConnectionTrait>(
    db: &C,
    id: &str,
) -> Result<Option<report::Model>, FirError> {
    Ok(entities::Report::find_by_id(id.to_string()).one(db).await?)
}

pub(crate) async fn load_report<C: ConnectionTrait>(
    db: &C,
    id: &str,
) -> Result<Option<Report>, FirError> {
    match find_model(db, id).await? {
        Some(model) => Ok(hydrate(db, vec![model]).await?.pop()),
        None => Ok(None),
    }
}

/// Attach histories to a batch of rows, preserving the order of `models`.
pub(crate) async fn hydrate<C: ConnectionTrait>(
    db: &C,
    models: Vec<report::Model>,
) -> Result<Vec<Report>, FirError> {
    let ids: Vec<String> = models.iter().map(|m| m.id.clone()).collect();
    let mut by_report: HashMap<String, Vec<status_update::Model>> = HashMap::new();
    for chunk in ids.chunks(BATCH_SIZE) {
        let rows = entities::StatusUpdate::find()
            .filter(status_update::Column::ReportId.is_in(chunk.iter().cloned()))
            .order_by_asc(status_update::Column::ReportId)
            .order_by_asc(status_update::Column::Seq)
            .all(db)
            .await?;
        for row in rows {
            by_report.entry(row.report_id.clone()).or_default().push(row);
        }
    }

    models
        .into_iter()
        .map(|model| {
            let history = by_report.remove(&model.id).unwrap_or_default();
            report_from_model(model, history)
        })
        .collect()
}

/// Pair each report with a summary of the account that filed it.
pub(crate) async fn with_owners<C: ConnectionTrait>(
    db: &C,
    reports: Vec<Report>,
) -> Result<Vec<PoliceReportView>, FirError> {
    let mut owner_ids: Vec<String> = reports.iter().map(|r| r.owner.clone()).collect();
    owner_ids.sort();
    owner_ids.dedup();

    let mut owners: HashMap<String, OwnerSummary> = HashMap::new();
    for chunk in owner_ids.chunks(BATCH_SIZE) {
        let rows = entities::User::find()
            .filter(user::Column::Id.is_in(chunk.iter().cloned()))
            .all(db)
            .await?;
        for row in rows {
            owners.insert(
                row.id.clone(),
                OwnerSummary {
                    id: row.id,
                    name: row.name,
                    email: row.email,
                    phone: row.phone,
                },
            );
        }
    }

    Ok(reports
        .into_iter()
        .map(|report| PoliceReportView {
            filed_by: owners.get(&report.owner).cloned(),
            report,
        })
        .collect())
}
