use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a report. Declaration order is the display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReportStatus {
    Filed,
    #[serde(rename = "Under Investigation")]
    UnderInvestigation,
    Resolved,
    Closed,
    Rejected,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 5] = [
        ReportStatus::Filed,
        ReportStatus::UnderInvestigation,
        ReportStatus::Resolved,
        ReportStatus::Closed,
        ReportStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Filed => "Filed",
            ReportStatus::UnderInvestigation => "Under Investigation",
            ReportStatus::Resolved => "Resolved",
            ReportStatus::Closed => "Closed",
            ReportStatus::Rejected => "Rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s.trim())
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncidentType {
    Theft,
    Robbery,
    Assault,
    Burglary,
    Fraud,
    Vandalism,
    Other,
}

impl IncidentType {
    pub const ALL: [IncidentType; 7] = [
        IncidentType::Theft,
        IncidentType::Robbery,
        IncidentType::Assault,
        IncidentType::Burglary,
        IncidentType::Fraud,
        IncidentType::Vandalism,
        IncidentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::Theft => "Theft",
            IncidentType::Robbery => "Robbery",
            IncidentType::Assault => "Assault",
            IncidentType::Burglary => "Burglary",
            IncidentType::Fraud => "Fraud",
            IncidentType::Vandalism => "Vandalism",
            IncidentType::Other => "Other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s.trim())
    }
}

impl fmt::Display for IncidentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the append-only status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: ReportStatus,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub report_number: String,
    pub complainant_name: String,
    pub complainant_phone: String,
    pub incident_type: IncidentType,
    pub incident_date: NaiveDate,
    pub incident_location: String,
    pub description: String,
    pub accused_name: String,
    pub status: ReportStatus,
    /// Oldest first; the last entry always matches `status`.
    pub status_history: Vec<StatusUpdate>,
    /// Id of the citizen who filed the report.
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields submitted by a citizen when filing a report. Everything is optional
/// at the wire level so missing fields surface as validation errors rather
/// than deserialization failures.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewReport {
    pub complainant_name: String,
    pub complainant_phone: String,
    pub incident_type: String,
    /// `YYYY-MM-DD`
    pub incident_date: String,
    pub incident_location: String,
    pub description: String,
    pub accused_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatusChange {
    pub status: String,
    pub comment: Option<String>,
}

/// Contact details of the account that filed a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Police portal view: the full report plus who filed it. `filed_by` is
/// `None` only if the filing account no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoliceReportView {
    #[serde(flatten)]
    pub report: Report,
    pub filed_by: Option<OwnerSummary>,
}

/// What an anonymous caller may see when searching by report number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicReportView {
    pub report_number: String,
    pub incident_type: IncidentType,
    pub incident_date: NaiveDate,
    pub incident_location: String,
    pub description: String,
    pub accused_name: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl From<&Report> for PublicReportView {
    fn from(report: &Report) -> Self {
        Self {
            report_number: report.report_number.clone(),
            incident_type: report.incident_type,
            incident_date: report.incident_date,
            incident_location: report.incident_location.clone(),
            description: report.description.clone(),
            accused_name: report.accused_name.clone(),
            status: report.status,
            created_at: report.created_at,
            last_updated_at: report.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_names() {
        assert_eq!(
            ReportStatus::parse("Under Investigation"),
            Some(ReportStatus::UnderInvestigation)
        );
        assert_eq!(ReportStatus::parse("Resolved"), Some(ReportStatus::Resolved));
        assert_eq!(ReportStatus::parse("resolved"), None);
        assert_eq!(ReportStatus::parse("Reopened"), None);
        assert_eq!(
            serde_json::to_value(ReportStatus::UnderInvestigation).unwrap(),
            "Under Investigation"
        );
    }

    #[test]
    fn test_status_order() {
        assert!(ReportStatus::Filed < ReportStatus::UnderInvestigation);
        assert!(ReportStatus::Closed < ReportStatus::Rejected);
    }

    #[test]
    fn test_incident_type_parse() {
        for t in IncidentType::ALL {
            assert_eq!(IncidentType::parse(t.as_str()), Some(t));
        }
        assert_eq!(IncidentType::parse("Arson"), None);
    }

    #[test]
    fn test_new_report_tolerates_missing_fields() {
        let parsed: NewReport =
            serde_json::from_str(r#"{"complainantName":"A","incidentType":"Theft"}"#).unwrap();
        assert_eq!(parsed.complainant_name, "A");
        assert!(parsed.description.is_empty());
        assert!(parsed.accused_name.is_none());
    }
}
