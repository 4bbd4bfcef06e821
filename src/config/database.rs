//! Database configuration module for the tuition ledger.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. The composite uniqueness rules that the
//! entity macros cannot express (one enrollment per student and year, one charge per
//! student, year, month and concept) are added as explicit unique indexes.

use crate::entities::{
    Charge, Enrollment, Grade, Guardian, Payment, SchoolSettings, Section, Student, charge,
    enrollment,
};
use crate::errors::Result;
use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use std::path::Path;
use tracing::{debug, info, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/tuition_ledger.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
///
/// This function looks for `DATABASE_URL` in the environment and falls back to
/// a default local `SQLite` file if not found.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
///
/// Falls back to a default local `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    if let Some(dir) = sqlite_file_path(&database_url)
        .and_then(Path::parent)
        .filter(|dir| !dir.as_os_str().is_empty())
    {
        std::fs::create_dir_all(dir)?;
    }
    debug!("Connecting to {database_url}");
    Database::connect(&database_url).await.map_err(Into::into)
}

/// Path of the database file for a file-backed `SQLite` URL, `None` otherwise.
fn sqlite_file_path(database_url: &str) -> Option<&Path> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path.contains(":memory:") {
        return None;
    }
    Some(Path::new(path))
}

/// Creates all tables and unique indexes if they do not exist yet.
///
/// Tables are created parents first so foreign keys resolve.
#[instrument(skip(db))]
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    create_table(db, Guardian).await?;
    create_table(db, Grade).await?;
    create_table(db, Section).await?;
    create_table(db, Student).await?;
    create_table(db, Enrollment).await?;
    create_table(db, Charge).await?;
    create_table(db, Payment).await?;
    create_table(db, SchoolSettings).await?;

    let builder = db.get_database_backend();
    for index in unique_indexes() {
        db.execute(builder.build(&index)).await?;
    }

    info!("Database tables ensured");
    Ok(())
}

async fn create_table<E>(db: &DatabaseConnection, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(builder.build(&table)).await?;
    Ok(())
}

fn unique_indexes() -> [IndexCreateStatement; 2] {
    [
        Index::create()
            .name("idx_enrollments_student_year")
            .table(Enrollment)
            .col(enrollment::Column::StudentId)
            .col(enrollment::Column::AcademicYear)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_charges_student_year_month_concept")
            .table(Charge)
            .col(charge::Column::StudentId)
            .col(charge::Column::AcademicYear)
            .col(charge::Column::Month)
            .col(charge::Column::Concept)
            .unique()
            .if_not_exists()
            .to_owned(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ChargeModel, EnrollmentModel, PaymentModel, StudentModel};
    use sea_orm::{EntityTrait, QuerySelect};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        // Test that tables exist by querying them
        let _: Vec<StudentModel> = Student::find().limit(1).all(&db).await?;
        let _: Vec<EnrollmentModel> = Enrollment::find().limit(1).all(&db).await?;
        let _: Vec<ChargeModel> = Charge::find().limit(1).all(&db).await?;
        let _: Vec<PaymentModel> = Payment::find().limit(1).all(&db).await?;

        Ok(())
    }

    #[test]
    fn test_sqlite_file_path() {
        assert_eq!(
            sqlite_file_path("sqlite://data/tuition_ledger.sqlite?mode=rwc"),
            Some(Path::new("data/tuition_ledger.sqlite"))
        );
        assert_eq!(sqlite_file_path("sqlite::memory:"), None);
        assert_eq!(sqlite_file_path("postgres://localhost/db"), None);
    }

    #[tokio::test]
    async fn test_create_tables_is_repeatable() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }
}
