//! Enrollment business logic - yearly registrations and their fee balance.
//!
//! A student has at most one enrollment per academic year. The rule is checked before
//! the insert and enforced again by a unique index, so a concurrent insert that slips
//! past the check still surfaces as [`Error::DuplicateEnrollment`]. Every balance
//! change goes through [`compare_and_swap_balance`], which refuses to overwrite a row
//! that changed since it was read.

use crate::{
    core::{
        events::{ChangeEvent, ChangeFeed, EntityKind},
        round_money, student::require_student, validate_month, validate_positive_amount,
    },
    entities::{Currency, Enrollment, EnrollmentStatus, Student, enrollment, student},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, instrument};

/// Everything needed to enroll a student for a year.
#[derive(Debug, Clone)]
pub struct NewEnrollment {
    /// Student to enroll
    pub student_id: i64,
    /// Academic year
    pub academic_year: i32,
    /// Enrollment fee owed
    pub total_amount: f64,
    /// Currency of the fee
    pub currency: Currency,
    /// First billed month; defaults to January
    pub start_month: Option<u32>,
    /// Registration timestamp; defaults to now
    pub enrolled_at: Option<DateTime<Utc>>,
}

/// Derives the enrollment status from what was paid against what is owed.
///
/// - nothing paid: `Pendiente`
/// - something paid but less than owed: `Parcial`
/// - paid in full (or more): `Pagado`
#[must_use]
pub fn derive_status(paid_amount: f64, total_amount: f64) -> EnrollmentStatus {
    let paid = round_money(paid_amount);
    let total = round_money(total_amount);
    if paid >= total {
        EnrollmentStatus::Pagado
    } else if paid > 0.0 {
        EnrollmentStatus::Parcial
    } else {
        EnrollmentStatus::Pendiente
    }
}

/// Creates an enrollment with nothing paid yet.
#[instrument(skip(db, feed, new_enrollment), fields(student_id = new_enrollment.student_id, year = new_enrollment.academic_year))]
pub async fn create_enrollment(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    new_enrollment: NewEnrollment,
) -> Result<enrollment::Model> {
    let txn = db.begin().await?;
    let created = insert_enrollment(&txn, &new_enrollment).await?;
    txn.commit().await?;

    info!(enrollment_id = created.id, "Student enrolled");
    feed.publish(ChangeEvent::inserted(EntityKind::Enrollment, created.id));
    Ok(created)
}

/// Inserts an enrollment inside the caller's transaction.
///
/// Validates the fee and start month, checks that the student exists and is not
/// already enrolled for the year.
pub(crate) async fn insert_enrollment<C>(
    db: &C,
    new_enrollment: &NewEnrollment,
) -> Result<enrollment::Model>
where
    C: ConnectionTrait,
{
    let total_amount = round_money(new_enrollment.total_amount);
    if !total_amount.is_finite() || total_amount < 0.0 {
        return Err(Error::InvalidAmount {
            amount: new_enrollment.total_amount,
        });
    }
    let start_month = validate_month(new_enrollment.start_month.unwrap_or(1))?;
    require_student(db, new_enrollment.student_id).await?;

    let student_id = new_enrollment.student_id;
    let academic_year = new_enrollment.academic_year;
    if find_enrollment(db, student_id, academic_year)
        .await?
        .is_some()
    {
        return Err(Error::DuplicateEnrollment {
            student_id,
            academic_year,
        });
    }

    let model = enrollment::ActiveModel {
        student_id: Set(student_id),
        academic_year: Set(academic_year),
        total_amount: Set(total_amount),
        paid_amount: Set(0.0),
        currency: Set(new_enrollment.currency),
        status: Set(derive_status(0.0, total_amount)),
        start_month: Set(start_month),
        enrolled_at: Set(new_enrollment.enrolled_at.unwrap_or_else(Utc::now)),
        version: Set(0),
        ..Default::default()
    };

    model.insert(db).await.map_err(|err| {
        let err = Error::from(err);
        if err.is_unique_violation() {
            Error::DuplicateEnrollment {
                student_id,
                academic_year,
            }
        } else {
            err
        }
    })
}

/// Finds the enrollment of a student for a year.
pub async fn find_enrollment<C>(
    db: &C,
    student_id: i64,
    academic_year: i32,
) -> Result<Option<enrollment::Model>>
where
    C: ConnectionTrait,
{
    Enrollment::find()
        .filter(enrollment::Column::StudentId.eq(student_id))
        .filter(enrollment::Column::AcademicYear.eq(academic_year))
        .one(db)
        .await
        .map_err(Into::into)
}

/// All enrollments of a year, newest first.
pub async fn enrollments_for_year<C>(db: &C, academic_year: i32) -> Result<Vec<enrollment::Model>>
where
    C: ConnectionTrait,
{
    Enrollment::find()
        .filter(enrollment::Column::AcademicYear.eq(academic_year))
        .order_by_desc(enrollment::Column::EnrolledAt)
        .order_by_desc(enrollment::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Writes a new paid amount if, and only if, the row is still at the version that was read.
///
/// The status is re-derived from the new paid amount. On success the version is
/// bumped; on a version mismatch nothing is written and
/// [`Error::ConcurrentModification`] is returned.
pub async fn compare_and_swap_balance<C>(
    db: &C,
    current: &enrollment::Model,
    new_paid_amount: f64,
) -> Result<enrollment::Model>
where
    C: ConnectionTrait,
{
    let new_paid_amount = round_money(new_paid_amount);
    if new_paid_amount < 0.0 || new_paid_amount > current.total_amount {
        return Err(Error::ExceedsBalance {
            tendered: round_money(new_paid_amount - current.paid_amount),
            remaining: current.remaining(),
        });
    }
    let status = derive_status(new_paid_amount, current.total_amount);

    let result = Enrollment::update_many()
        .col_expr(enrollment::Column::PaidAmount, Expr::value(new_paid_amount))
        .col_expr(enrollment::Column::Status, Expr::value(status))
        .col_expr(
            enrollment::Column::Version,
            Expr::col(enrollment::Column::Version).add(1),
        )
        .filter(enrollment::Column::Id.eq(current.id))
        .filter(enrollment::Column::Version.eq(current.version))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::ConcurrentModification {
            entity: "enrollment",
            id: current.id,
        });
    }

    Ok(enrollment::Model {
        paid_amount: new_paid_amount,
        status,
        version: current.version + 1,
        ..current.clone()
    })
}

/// An enrollment joined with the student's name, for the enrollments listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentRow {
    /// Enrollment id
    pub id: i64,
    /// Student id
    pub student_id: i64,
    /// Student name
    pub student_name: String,
    /// Academic year
    pub academic_year: i32,
    /// Fee owed
    pub total_amount: f64,
    /// Fee received
    pub paid_amount: f64,
    /// Currency
    pub currency: Currency,
    /// Settlement state
    pub status: EnrollmentStatus,
    /// Registration timestamp
    pub enrolled_at: DateTime<Utc>,
}

/// Lists the enrollments of a year, optionally filtered by student name.
pub async fn list_enrollments(
    db: &DatabaseConnection,
    academic_year: i32,
    search: Option<&str>,
) -> Result<Vec<EnrollmentRow>> {
    let enrollments = enrollments_for_year(db, academic_year).await?;
    let names: HashMap<i64, String> = Student::find()
        .filter(student::Column::Id.is_in(enrollments.iter().map(|e| e.student_id)))
        .all(db)
        .await?
        .into_iter()
        .map(|s| (s.id, s.full_name))
        .collect();
    let needle = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    Ok(enrollments
        .into_iter()
        .map(|e| EnrollmentRow {
            id: e.id,
            student_id: e.student_id,
            student_name: names.get(&e.student_id).cloned().unwrap_or_default(),
            academic_year: e.academic_year,
            total_amount: e.total_amount,
            paid_amount: e.paid_amount,
            currency: e.currency,
            status: e.status,
            enrolled_at: e.enrolled_at,
        })
        .filter(|row| {
            needle
                .as_ref()
                .is_none_or(|n| row.student_name.to_lowercase().contains(n))
        })
        .collect())
}

/// Headline numbers for the enrollments page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrollmentSummary {
    /// Number of enrollments
    pub count: usize,
    /// Fees billed, per currency
    pub billed: BTreeMap<Currency, f64>,
    /// Fees received, per currency
    pub collected: BTreeMap<Currency, f64>,
    /// Enrollments with nothing paid
    pub pending: usize,
    /// Enrollments partly paid
    pub partial: usize,
    /// Enrollments paid in full
    pub paid: usize,
}

/// Summarises the enrollments of a year. Amounts are never mixed across currencies.
pub async fn enrollment_summary<C>(db: &C, academic_year: i32) -> Result<EnrollmentSummary>
where
    C: ConnectionTrait,
{
    let enrollments = enrollments_for_year(db, academic_year).await?;
    let mut summary = EnrollmentSummary {
        count: enrollments.len(),
        ..Default::default()
    };
    for e in &enrollments {
        let billed = summary.billed.entry(e.currency).or_default();
        *billed = round_money(*billed + e.total_amount);
        let collected = summary.collected.entry(e.currency).or_default();
        *collected = round_money(*collected + e.paid_amount);
        match e.status {
            EnrollmentStatus::Pendiente => summary.pending += 1,
            EnrollmentStatus::Parcial => summary.partial += 1,
            EnrollmentStatus::Pagado => summary.paid += 1,
        }
    }
    Ok(summary)
}

/// Validates an amount tendered against an enrollment's remaining balance.
pub(crate) fn check_tender(enrollment: &enrollment::Model, tendered: f64) -> Result<f64> {
    let tendered = validate_positive_amount(tendered)?;
    let remaining = enrollment.remaining();
    if remaining <= 0.0 {
        return Err(Error::AlreadySettled);
    }
    if tendered > remaining {
        return Err(Error::ExceedsBalance {
            tendered,
            remaining,
        });
    }
    Ok(tendered)
}
