//! Report lifecycle engine and the query/search surface over reports.

pub mod lifecycle;
pub mod number;
pub mod query;
mod record;
pub mod types;

pub use lifecycle::{create_report, create_report_before, update_status, update_status_before};
pub use number::{ReportNumberSource, TimeSuffixNumbers};
pub use query::{get_all_reports, get_any_report, get_own_reports, get_report_by_id, search_by_number};
pub use types::{
    IncidentType, NewReport, OwnerSummary, PoliceReportView, PublicReportView, Report, ReportStatus,
    StatusChange, StatusUpdate,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FirError;
    use crate::session::Identity;
    use crate::storage::{self, NewUser, Role};
    use sea_orm::DatabaseConnection;
    use sea_orm_migration::MigratorTrait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    struct TestDb {
        connection: DatabaseConnection,
        _temp_file: NamedTempFile,
    }

    impl TestDb {
        async fn new() -> Self {
            let temp_file = NamedTempFile::new().expect("Failed to create temp file");
            let db_path = temp_file.path().to_str().expect("Invalid temp file path");
            let db_url = format!("sqlite://{}?mode=rwc", db_path);

            let connection = sea_orm::Database::connect(&db_url)
                .await
                .expect("Failed to connect to test database");
            migration::Migrator::up(&connection, None)
                .await
                .expect("Failed to run migrations");

            Self {
                connection,
                _temp_file: temp_file,
            }
        }
    }

    /// Always proposes the same number, to force collisions.
    struct FixedNumber(&'static str);

    impl ReportNumberSource for FixedNumber {
        fn candidate(&self, _attempt: u32) -> String {
            self.0.to_string()
        }
    }

    /// Counts how many candidates were requested.
    struct Counting {
        inner: FixedNumber,
        calls: AtomicU32,
    }

    impl ReportNumberSource for Counting {
        fn candidate(&self, attempt: u32) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.candidate(attempt)
        }
    }

    async fn seed(db: &DatabaseConnection, email: &str, nid: &str, role: Role) -> Identity {
        let user = storage::create_user(
            db,
            NewUser {
                name: "Someone".into(),
                email: email.into(),
                password: "secret1".into(),
                phone: "9999999999".into(),
                national_id: nid.into(),
                role,
            },
        )
        .await
        .unwrap();
        Identity::from(&user)
    }

    fn new_report() -> NewReport {
        NewReport {
            complainant_name: "A".into(),
            complainant_phone: "9999999999".into(),
            incident_type: "Theft".into(),
            incident_date: "2024-01-10".into(),
            incident_location: "Market Road".into(),
            description: "Wallet taken from a parked scooter".into(),
            accused_name: None,
        }
    }

    fn numbers() -> TimeSuffixNumbers {
        TimeSuffixNumbers::new("FIR")
    }

    #[tokio::test]
    async fn test_create_report_starts_filed() {
        let db = TestDb::new().await;
        let citizen = seed(&db.connection, "a@x.com", "123456789012", Role::Citizen).await;

        let report = create_report(&db.connection, &numbers(), 5, &citizen, new_report())
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Filed);
        assert_eq!(report.status_history.len(), 1);
        assert_eq!(report.status_history[0].status, ReportStatus::Filed);
        assert_eq!(report.status_history[0].comment, "");
        assert_eq!(report.owner, citizen.user_id);
        assert_eq!(report.accused_name, "Unknown");
        assert!(number::is_well_formed(&report.report_number, "FIR"));
    }

    #[tokio::test]
    async fn test_police_cannot_file() {
        let db = TestDb::new().await;
        let officer = seed(&db.connection, "p@x.com", "000000000001", Role::Police).await;

        let err = create_report(&db.connection, &numbers(), 5, &officer, new_report())
            .await
            .unwrap_err();
        assert!(matches!(err, FirError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_number_collision_fails_explicitly() {
        let db = TestDb::new().await;
        let citizen = seed(&db.connection, "a@x.com", "123456789012", Role::Citizen).await;
        let source = Counting {
            inner: FixedNumber("FIR12345678"),
            calls: AtomicU32::new(0),
        };

        let first = create_report(&db.connection, &source, 3, &citizen, new_report())
            .await
            .unwrap();
        assert_eq!(first.report_number, "FIR12345678");

        let err = create_report(&db.connection, &source, 3, &citizen, new_report())
            .await
            .unwrap_err();
        assert!(matches!(err, FirError::DuplicateKey(ref f) if f == "report_number"));
        // one call for the first report, three rerolls for the second
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);

        // The original report is untouched
        let own = get_own_reports(&db.connection, &citizen).await.unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].id, first.id);
    }

    #[tokio::test]
    async fn test_status_updates_append_history() {
        let db = TestDb::new().await;
        let citizen = seed(&db.connection, "a@x.com", "123456789012", Role::Citizen).await;
        let officer = seed(&db.connection, "p@x.com", "000000000001", Role::Police).await;
        let report = create_report(&db.connection, &numbers(), 5, &citizen, new_report())
            .await
            .unwrap();

        let sequence = [
            "Under Investigation",
            "Resolved",
            "Closed",
            // Closed is not terminal
            "Under Investigation",
            "Rejected",
        ];
        let mut latest = report.clone();
        for (i, status) in sequence.iter().enumerate() {
            latest = update_status(
                &db.connection,
                &officer,
                &report.id,
                StatusChange {
                    status: status.to_string(),
                    comment: Some(format!("step {i}")),
                },
                8,
            )
            .await
            .unwrap();
            assert_eq!(latest.status_history.len(), i + 2);
            assert_eq!(latest.status.as_str(), *status);
        }

        assert_eq!(latest.status, ReportStatus::Rejected);
        assert_eq!(
            latest.status_history.last().map(|h| h.status),
            Some(latest.status)
        );
        assert_eq!(latest.status_history[1].comment, "step 0");
        // History is append-only: the first entry never changes
        assert_eq!(latest.status_history[0], report.status_history[0]);
    }

    #[tokio::test]
    async fn test_update_status_checks() {
        let db = TestDb::new().await;
        let citizen = seed(&db.connection, "a@x.com", "123456789012", Role::Citizen).await;
        let officer = seed(&db.connection, "p@x.com", "000000000001", Role::Police).await;
        let report = create_report(&db.connection, &numbers(), 5, &citizen, new_report())
            .await
            .unwrap();

        let change = |s: &str| StatusChange {
            status: s.to_string(),
            comment: None,
        };

        // Citizens are refused even for reports that do not exist
        let err = update_status(&db.connection, &citizen, "missing", change("Resolved"), 8)
            .await
            .unwrap_err();
        assert!(matches!(err, FirError::Forbidden(_)));

        let err = update_status(&db.connection, &officer, "missing", change("Resolved"), 8)
            .await
            .unwrap_err();
        assert!(matches!(err, FirError::NotFound(_)));

        let err = update_status(&db.connection, &officer, &report.id, change("Reopened"), 8)
            .await
            .unwrap_err();
        assert!(matches!(err, FirError::Validation(_)));

        let too_long = StatusChange {
            status: "Resolved".into(),
            comment: Some("x".repeat(2001)),
        };
        let err = update_status(&db.connection, &officer, &report.id, too_long, 8)
            .await
            .unwrap_err();
        assert!(matches!(err, FirError::Validation(_)));

        // Nothing above touched the report
        let unchanged = get_any_report(&db.connection, &officer, &report.id)
            .await
            .unwrap();
        assert_eq!(unchanged.report.status_history.len(), 1);

        let updated = update_status(&db.connection, &officer, &report.id, change("Resolved"), 8)
            .await
            .unwrap();
        assert_eq!(updated.status_history[1].comment, "");
    }

    #[tokio::test]
    async fn test_concurrent_updates_keep_every_entry() {
        let db = TestDb::new().await;
        let citizen = seed(&db.connection, "a@x.com", "123456789012", Role::Citizen).await;
        let officer = seed(&db.connection, "p@x.com", "000000000001", Role::Police).await;
        let report = create_report(&db.connection, &numbers(), 5, &citizen, new_report())
            .await
            .unwrap();

        let conn = Arc::new(db.connection.clone());
        let mut handles = Vec::new();
        for i in 0..4 {
            let conn = conn.clone();
            let officer = officer.clone();
            let id = report.id.clone();
            handles.push(tokio::spawn(async move {
                update_status(
                    &conn,
                    &officer,
                    &id,
                    StatusChange {
                        status: "Under Investigation".into(),
                        comment: Some(format!("officer note {i}")),
                    },
                    50,
                )
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let final_report = get_any_report(&db.connection, &officer, &report.id)
            .await
            .unwrap();
        assert_eq!(final_report.report.status_history.len(), 5);
        let mut comments: Vec<_> = final_report.report.status_history[1..]
            .iter()
            .map(|h| h.comment.clone())
            .collect();
        comments.sort();
        assert_eq!(
            comments,
            (0..4).map(|i| format!("officer note {i}")).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_queries_respect_roles() {
        let db = TestDb::new().await;
        let alice = seed(&db.connection, "alice@x.com", "111111111111", Role::Citizen).await;
        let bob = seed(&db.connection, "bob@x.com", "222222222222", Role::Citizen).await;
        let officer = seed(&db.connection, "p@x.com", "000000000001", Role::Police).await;

        let a1 = create_report(&db.connection, &numbers(), 5, &alice, new_report())
            .await
            .unwrap();
        let b1 = create_report(&db.connection, &numbers(), 5, &bob, new_report())
            .await
            .unwrap();

        let own = get_own_reports(&db.connection, &alice).await.unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].id, a1.id);

        assert!(matches!(
            get_report_by_id(&db.connection, &alice, &b1.id).await,
            Err(FirError::Forbidden(_))
        ));
        assert!(matches!(
            get_report_by_id(&db.connection, &alice, "missing").await,
            Err(FirError::NotFound(_))
        ));

        // Reading twice without mutation yields the same report
        let once = get_report_by_id(&db.connection, &alice, &a1.id).await.unwrap();
        let twice = get_report_by_id(&db.connection, &alice, &a1.id).await.unwrap();
        assert_eq!(once, twice);

        assert!(matches!(
            get_all_reports(&db.connection, &alice, None).await,
            Err(FirError::Forbidden(_))
        ));
        // Role check comes before filter parsing
        assert!(matches!(
            get_all_reports(&db.connection, &alice, Some("bogus")).await,
            Err(FirError::Forbidden(_))
        ));
        let all = get_all_reports(&db.connection, &officer, None).await.unwrap();
        assert_eq!(all.len(), 2);

        assert!(matches!(
            get_any_report(&db.connection, &alice, &a1.id).await,
            Err(FirError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_status_filter() {
        let db = TestDb::new().await;
        let alice = seed(&db.connection, "alice@x.com", "111111111111", Role::Citizen).await;
        let officer = seed(&db.connection, "p@x.com", "000000000001", Role::Police).await;

        let first = create_report(&db.connection, &numbers(), 5, &alice, new_report())
            .await
            .unwrap();
        create_report(&db.connection, &numbers(), 5, &alice, new_report())
            .await
            .unwrap();
        update_status(
            &db.connection,
            &officer,
            &first.id,
            StatusChange {
                status: "Resolved".into(),
                comment: Some("done".into()),
            },
            8,
        )
        .await
        .unwrap();

        let resolved = get_all_reports(&db.connection, &officer, Some("Resolved"))
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].report.id, first.id);

        let filed = get_all_reports(&db.connection, &officer, Some("Filed"))
            .await
            .unwrap();
        assert_eq!(filed.len(), 1);

        assert!(matches!(
            get_all_reports(&db.connection, &officer, Some("Pending")).await,
            Err(FirError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_public_search() {
        let db = TestDb::new().await;
        let alice = seed(&db.connection, "alice@x.com", "111111111111", Role::Citizen).await;
        let report = create_report(&db.connection, &numbers(), 5, &alice, new_report())
            .await
            .unwrap();

        let view = search_by_number(&db.connection, &report.report_number)
            .await
            .unwrap();
        assert_eq!(view.report_number, report.report_number);
        assert_eq!(view.status, ReportStatus::Filed);

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("complainantPhone").is_none());
        assert!(json.get("complainantName").is_none());
        assert!(json.get("owner").is_none());
        assert!(json.get("statusHistory").is_none());

        assert!(matches!(
            search_by_number(&db.connection, "FIR00000000").await,
            Err(FirError::NotFound(_))
        ));
    }

    /// Hands out numbers that sort in the reverse of filing order.
    struct Descending(AtomicU32);

    impl ReportNumberSource for Descending {
        fn candidate(&self, _attempt: u32) -> String {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            format!("FIR{:08}", 99_999_999 - n)
        }
    }

    #[tokio::test]
    async fn test_reports_come_back_in_filing_order() {
        let db = TestDb::new().await;
        let alice = seed(&db.connection, "alice@x.com", "111111111111", Role::Citizen).await;
        let officer = seed(&db.connection, "p@x.com", "000000000001", Role::Police).await;
        let source = Descending(AtomicU32::new(0));

        let mut filed = Vec::new();
        for _ in 0..5 {
            let report = create_report(&db.connection, &source, 3, &alice, new_report())
                .await
                .unwrap();
            filed.push(report.id);
        }

        let own: Vec<_> = get_own_reports(&db.connection, &alice)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(own, filed);

        let all: Vec<_> = get_all_reports(&db.connection, &officer, None)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.report.id)
            .collect();
        filed.reverse();
        assert_eq!(all, filed);
    }

    #[tokio::test]
    async fn test_police_views_name_the_filing_account() {
        let db = TestDb::new().await;
        let alice = seed(&db.connection, "alice@x.com", "111111111111", Role::Citizen).await;
        let bob = seed(&db.connection, "bob@x.com", "222222222222", Role::Citizen).await;
        let officer = seed(&db.connection, "p@x.com", "000000000001", Role::Police).await;

        let a1 = create_report(&db.connection, &numbers(), 5, &alice, new_report())
            .await
            .unwrap();
        create_report(&db.connection, &numbers(), 5, &bob, new_report())
            .await
            .unwrap();

        let detail = get_any_report(&db.connection, &officer, &a1.id).await.unwrap();
        assert_eq!(detail.report, a1);
        assert_eq!(
            detail.filed_by,
            Some(OwnerSummary {
                id: alice.user_id.clone(),
                name: "Someone".into(),
                email: "alice@x.com".into(),
                phone: "9999999999".into(),
            })
        );

        for view in get_all_reports(&db.connection, &officer, None).await.unwrap() {
            let owner = view.filed_by.expect("owner summary");
            assert_eq!(owner.id, view.report.owner);
        }

        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["reportNumber"], a1.report_number);
        assert_eq!(json["filedBy"]["email"], "alice@x.com");
        assert!(json["filedBy"].get("passwordHash").is_none());

        // Citizen views stay without account details
        let own = get_report_by_id(&db.connection, &alice, &a1.id).await.unwrap();
        assert!(serde_json::to_value(&own).unwrap().get("filedBy").is_none());
    }

    #[tokio::test]
    async fn test_expired_deadline_writes_nothing() {
        let db = TestDb::new().await;
        let alice = seed(&db.connection, "alice@x.com", "111111111111", Role::Citizen).await;
        let officer = seed(&db.connection, "p@x.com", "000000000001", Role::Police).await;

        let err = create_report_before(
            &db.connection,
            &numbers(),
            5,
            tokio::time::Instant::now(),
            &alice,
            new_report(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FirError::TransientStorage(_)));
        assert!(get_own_reports(&db.connection, &alice).await.unwrap().is_empty());

        let report = create_report(&db.connection, &numbers(), 5, &alice, new_report())
            .await
            .unwrap();
        let err = update_status_before(
            &db.connection,
            &officer,
            &report.id,
            StatusChange {
                status: "Resolved".into(),
                comment: None,
            },
            8,
            tokio::time::Instant::now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FirError::TransientStorage(_)));
        assert_eq!(
            get_report_by_id(&db.connection, &alice, &report.id).await.unwrap(),
            report
        );
    }

    #[tokio::test]
    async fn test_hydrate_handles_more_ids_than_one_statement_binds() {
        let db = TestDb::new().await;
        let alice = seed(&db.connection, "alice@x.com", "111111111111", Role::Citizen).await;
        let report = create_report(&db.connection, &numbers(), 5, &alice, new_report())
            .await
            .unwrap();
        let stored = record::find_model(&db.connection, &report.id)
            .await
            .unwrap()
            .unwrap();

        let mut models = vec![stored.clone()];
        for i in 0..40_000 {
            let mut model = stored.clone();
            model.id = format!("missing-{i}");
            models.push(model);
        }

        let reports = record::hydrate(&db.connection, models).await.unwrap();
        assert_eq!(reports.len(), 40_001);
        assert_eq!(reports[0].status_history.len(), 1);
        assert!(reports[1..].iter().all(|r| r.status_history.is_empty()));

        let views = record::with_owners(&db.connection, reports).await.unwrap();
        assert!(views.iter().all(|v| v.filed_by.is_some()));
    }
}
