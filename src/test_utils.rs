//! Shared test utilities for the tuition ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating students, enrollments, charges and payments with sensible defaults.

use crate::{
    config::school::{Config, SchoolConfig, TuitionConfig},
    core::{
        charge::{ChargeGenerationResult, charges_for_student, generate_monthly_charges},
        enrollment::{NewEnrollment, create_enrollment, find_enrollment},
        events::ChangeFeed,
        payment::{
            ChargePayment, ChargeReceipt, EnrollmentPayment, EnrollmentReceipt,
            record_charge_payment, record_enrollment_payment,
        },
        roster::{create_grade, create_section, list_grades},
        settings::TuitionPolicy,
        student::{GuardianInput, NewStudent, register_student},
    },
    entities::{
        ChargeStatus, Concept, Currency, PaymentMethod, charge, enrollment, grade, payment,
        section, student,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use tracing_subscriber::EnvFilter;

/// Installs a test-writer tracing subscriber. Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// School configuration used across tests.
///
/// # Defaults
/// * year: 2025
/// * monthly tuition: 1000 NIO
/// * enrollment fee: 300 NIO
pub fn test_config() -> Config {
    Config {
        school: SchoolConfig {
            name: "Colegio de Prueba".to_string(),
            current_academic_year: 2025,
        },
        tuition: TuitionConfig {
            monthly_amount: 1000.0,
            monthly_currency: Currency::Nio,
            enrollment_amount: 300.0,
            enrollment_currency: Currency::Nio,
        },
    }
}

/// Monthly tuition of 1000 NIO.
pub const fn test_policy() -> TuitionPolicy {
    TuitionPolicy {
        monthly_amount: 1000.0,
        currency: Currency::Nio,
    }
}

/// Sets up a database with one grade ("5to Grado") and one section ("A").
/// Returns (db, feed, grade, section).
pub async fn setup_with_roster()
-> Result<(DatabaseConnection, ChangeFeed, grade::Model, section::Model)> {
    let db = setup_test_db().await?;
    let grade = create_grade(&db, "5to Grado", 5).await?;
    let section = create_section(&db, grade.id, "A").await?;
    Ok((db, ChangeFeed::default(), grade, section))
}

/// Registers a student in `grade_id` with a guardian named after them.
pub async fn create_test_student(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    name: &str,
    grade_id: i64,
) -> Result<student::Model> {
    register_student(
        db,
        feed,
        NewStudent {
            full_name: name.to_string(),
            enrollment_code: None,
            guardian: GuardianInput {
                full_name: format!("Tutor de {name}"),
                phone: "8888-0000".to_string(),
            },
            grade_id,
            section_id: None,
        },
    )
    .await
}

/// Sets up a roster and one student, "María García".
/// Returns (db, feed, student).
pub async fn setup_with_student() -> Result<(DatabaseConnection, ChangeFeed, student::Model)> {
    let (db, feed, grade, _) = setup_with_roster().await?;
    let student = create_test_student(&db, &feed, "María García", grade.id).await?;
    Ok((db, feed, student))
}

/// Enrolls a student from January with nothing paid.
pub async fn create_test_enrollment(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    student_id: i64,
    academic_year: i32,
    total_amount: f64,
    currency: Currency,
) -> Result<enrollment::Model> {
    create_enrollment(
        db,
        feed,
        NewEnrollment {
            student_id,
            academic_year,
            total_amount,
            currency,
            start_month: None,
            enrolled_at: None,
        },
    )
    .await
}

/// Enrolls a student in NIO with a custom first billed month.
pub async fn create_custom_enrollment(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    student_id: i64,
    academic_year: i32,
    total_amount: f64,
    start_month: Option<u32>,
) -> Result<enrollment::Model> {
    create_enrollment(
        db,
        feed,
        NewEnrollment {
            student_id,
            academic_year,
            total_amount,
            currency: Currency::Nio,
            start_month,
            enrolled_at: None,
        },
    )
    .await
}

/// Registers a student in the first grade and enrolls them for 300 NIO.
pub async fn enroll_test_student(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    name: &str,
    academic_year: i32,
) -> Result<student::Model> {
    let grade = list_grades(db)
        .await?
        .into_iter()
        .next()
        .ok_or(Error::NotFound {
            entity: "grade",
            id: 0,
        })?;
    let student = create_test_student(db, feed, name, grade.id).await?;
    create_test_enrollment(db, feed, student.id, academic_year, 300.0, Currency::Nio).await?;
    Ok(student)
}

/// Runs the charge generator with [`test_policy`].
pub async fn generate_test_charges(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    academic_year: i32,
    current_month: u32,
) -> Result<ChargeGenerationResult> {
    generate_monthly_charges(db, feed, &test_policy(), academic_year, current_month).await
}

/// Sets up an enrolled student (300 NIO, unpaid) with monthly charges generated
/// through `current_month`. Returns (db, feed, student, charges by month).
pub async fn setup_with_charges(
    academic_year: i32,
    current_month: u32,
) -> Result<(
    DatabaseConnection,
    ChangeFeed,
    student::Model,
    Vec<charge::Model>,
)> {
    let (db, feed, student) = setup_with_student().await?;
    create_test_enrollment(&db, &feed, student.id, academic_year, 300.0, Currency::Nio).await?;
    generate_test_charges(&db, &feed, academic_year, current_month).await?;
    let charges = charges_for_student(&db, student.id, academic_year).await?;
    Ok((db, feed, student, charges))
}

/// Pays an enrollment in NIO cash.
pub async fn pay_test_enrollment(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    student_id: i64,
    academic_year: i32,
    amount: f64,
) -> Result<EnrollmentReceipt> {
    record_enrollment_payment(
        db,
        feed,
        EnrollmentPayment {
            student_id: Some(student_id),
            academic_year,
            amount,
            currency: Currency::Nio,
            method: PaymentMethod::Efectivo,
            paid_at: None,
        },
    )
    .await
}

/// Pays a charge in NIO cash.
pub async fn pay_test_charge(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    student_id: i64,
    charge_id: i64,
    amount: f64,
) -> Result<ChargeReceipt> {
    record_charge_payment(
        db,
        feed,
        ChargePayment {
            student_id: Some(student_id),
            charge_id,
            amount,
            currency: Currency::Nio,
            method: PaymentMethod::Efectivo,
            paid_at: None,
        },
    )
    .await
}

/// Inserts a payment row for a charge without touching the charge, as a write
/// interrupted halfway would leave it.
pub async fn insert_raw_charge_payment(
    db: &DatabaseConnection,
    charge: &charge::Model,
    amount: f64,
) -> Result<payment::Model> {
    payment::ActiveModel {
        student_id: Set(charge.student_id),
        charge_id: Set(Some(charge.id)),
        enrollment_id: Set(None),
        concept: Set(charge.concept),
        academic_year: Set(charge.academic_year),
        month: Set(Some(charge.month)),
        amount: Set(amount),
        currency: Set(charge.currency),
        method: Set(PaymentMethod::Efectivo),
        paid_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Inserts a pending USD tuition charge for an enrolled student.
pub async fn create_usd_charge(
    db: &DatabaseConnection,
    student_id: i64,
    academic_year: i32,
    month: u32,
    amount: f64,
) -> Result<charge::Model> {
    let enrollment = find_enrollment(db, student_id, academic_year)
        .await?
        .ok_or(Error::NotFound {
            entity: "enrollment",
            id: student_id,
        })?;
    charge::ActiveModel {
        student_id: Set(student_id),
        enrollment_id: Set(enrollment.id),
        academic_year: Set(academic_year),
        month: Set(i32::try_from(month).unwrap_or(1)),
        concept: Set(Concept::Mensualidad),
        amount: Set(amount),
        paid_amount: Set(0.0),
        currency: Set(Currency::Usd),
        status: Set(ChargeStatus::Pendiente),
        due_date: Set(crate::core::charge::due_date_for(academic_year, month)?),
        version: Set(0),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}
