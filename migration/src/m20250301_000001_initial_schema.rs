use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Enable foreign keys for SQLite
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA foreign_keys = ON")
                .await?;
        }

        // Create users table
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Users::Name))
                    .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                    .col(string(Users::Phone))
                    .col(
                        ColumnDef::new(Users::NationalId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(string(Users::PasswordHash))
                    .col(
                        ColumnDef::new(Users::Role)
                            .string()
                            .not_null()
                            .default("citizen"),
                    )
                    .col(big_integer(Users::CreatedAt))
                    .col(big_integer(Users::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        // Create reports table
        manager
            .create_table(
                Table::create()
                    .table(Reports::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Reports::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Reports::ReportNumber)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(string(Reports::ComplainantName))
                    .col(string(Reports::ComplainantPhone))
                    .col(string(Reports::IncidentType))
                    .col(string(Reports::IncidentDate))
                    .col(string(Reports::IncidentLocation))
                    .col(text(Reports::Description))
                    .col(string(Reports::AccusedName))
                    .col(
                        ColumnDef::new(Reports::Status)
                            .string()
                            .not_null()
                            .default("Filed"),
                    )
                    .col(string(Reports::OwnerId))
                    .col(big_integer(Reports::CreatedAt))
                    .col(big_integer(Reports::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_reports_owner")
                            .from(Reports::Table, Reports::OwnerId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_reports_owner")
                    .table(Reports::Table)
                    .col(Reports::OwnerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_reports_status")
                    .table(Reports::Table)
                    .col(Reports::Status)
                    .to_owned(),
            )
            .await?;

        // Status history, one row per transition (seq 0 is the implicit "Filed")
        let id_col = match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => ColumnDef::new(ReportStatusUpdates::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key()
                .to_owned(),
            _ => ColumnDef::new(ReportStatusUpdates::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key()
                .to_owned(),
        };

        manager
            .create_table(
                Table::create()
                    .table(ReportStatusUpdates::Table)
                    .if_not_exists()
                    .col(id_col)
                    .col(string(ReportStatusUpdates::ReportId))
                    .col(big_integer(ReportStatusUpdates::Seq))
                    .col(string(ReportStatusUpdates::Status))
                    .col(
                        ColumnDef::new(ReportStatusUpdates::Comment)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(big_integer(ReportStatusUpdates::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_status_updates_report")
                            .from(ReportStatusUpdates::Table, ReportStatusUpdates::ReportId)
                            .to(Reports::Table, Reports::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One writer per (report, seq): a lost race fails here instead of forking history
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_status_updates_report_seq")
                    .table(ReportStatusUpdates::Table)
                    .col(ReportStatusUpdates::ReportId)
                    .col(ReportStatusUpdates::Seq)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReportStatusUpdates::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Reports::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Name,
    Email,
    Phone,
    NationalId,
    PasswordHash,
    Role,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Reports {
    Table,
    Id,
    ReportNumber,
    ComplainantName,
    ComplainantPhone,
    IncidentType,
    IncidentDate,
    IncidentLocation,
    Description,
    AccusedName,
    Status,
    OwnerId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ReportStatusUpdates {
    Table,
    Id,
    ReportId,
    Seq,
    Status,
    Comment,
    CreatedAt,
}
