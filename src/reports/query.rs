use super::record::{self, hydrate, with_owners};
use super::types::{PoliceReportView, PublicReportView, Report, ReportStatus};
use crate::authz::{self, Action, Resource};
use crate::entities::{self, report, status_update};
use crate::errors::FirError;
use crate::session::Identity;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, JoinType, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait, Select,
};

/// Reports joined to their initial `Filed` entry, whose autoincrement id is
/// the filing order.
fn in_filing_order() -> Select<entities::Report> {
    entities::Report::find()
        .join(JoinType::InnerJoin, report::Relation::StatusUpdate.def())
        .filter(status_update::Column::Seq.eq(0))
}

fn not_found() -> FirError {
    FirError::NotFound("Report".to_string())
}

/// Reports filed by the caller, in filing order.
pub async fn get_own_reports(
    db: &DatabaseConnection,
    identity: &Identity,
) -> Result<Vec<Report>, FirError> {
    authz::require(
        Some(identity),
        Action::ReadOwnReports,
        Resource::OwnedBy(&identity.user_id),
    )?;

    let models = in_filing_order()
        .filter(report::Column::OwnerId.eq(identity.user_id.as_str()))
        .order_by_asc(status_update::Column::Id)
        .all(db)
        .await?;
    hydrate(db, models).await
}

/// Citizen detail view: only the owner may read it.
pub async fn get_report_by_id(
    db: &DatabaseConnection,
    identity: &Identity,
    id: &str,
) -> Result<Report, FirError> {
    let report = record::load_report(db, id).await?.ok_or_else(not_found)?;
    authz::require(
        Some(identity),
        Action::ReadOwnReport,
        Resource::Report {
            owner: &report.owner,
        },
    )?;
    Ok(report)
}

/// Police detail view of any report, including who filed it.
pub async fn get_any_report(
    db: &DatabaseConnection,
    identity: &Identity,
    id: &str,
) -> Result<PoliceReportView, FirError> {
    authz::require(Some(identity), Action::ReadAnyReport, Resource::None)?;
    let report = record::load_report(db, id).await?.ok_or_else(not_found)?;
    with_owners(db, vec![report]).await?.pop().ok_or_else(not_found)
}

/// Anonymous lookup by report number. Complainant details, owner and history
/// are never part of the result.
pub async fn search_by_number(
    db: &DatabaseConnection,
    report_number: &str,
) -> Result<PublicReportView, FirError> {
    authz::require(None, Action::PublicSearch, Resource::None)?;

    let number = report_number.trim();
    if number.is_empty() {
        return Err(FirError::Validation("report number is required".to_string()));
    }

    let model = entities::Report::find()
        .filter(report::Column::ReportNumber.eq(number))
        .one(db)
        .await?
        .ok_or_else(not_found)?;
    let report = record::report_from_model(model, Vec::new())?;
    Ok(PublicReportView::from(&report))
}

/// All reports, most recently filed first, optionally narrowed to one status. The filter is
/// the raw query value so that the role check happens before it is parsed.
pub async fn get_all_reports(
    db: &DatabaseConnection,
    identity: &Identity,
    status: Option<&str>,
) -> Result<Vec<PoliceReportView>, FirError> {
    authz::require(Some(identity), Action::ListAllReports, Resource::None)?;

    let status = status
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            ReportStatus::parse(s)
                .ok_or_else(|| FirError::Validation(format!("unknown status filter `{s}`")))
        })
        .transpose()?;

    let mut query = in_filing_order();
    if let Some(status) = status {
        query = query.filter(report::Column::Status.eq(status.as_str()));
    }
    let models = query
        .order_by_desc(status_update::Column::Id)
        .all(db)
        .await?;
    with_owners(db, hydrate(db, models).await?).await
}
