//! Charge business logic - monthly tuition generation and charge upkeep.
//!
//! [`generate_monthly_charges`] guarantees that every enrollment of a year owes one
//! `MENSUALIDAD` charge per elapsed month, from the enrollment's start month through
//! the current month. It runs on every page load, so it is idempotent: existing
//! charges are left alone and a unique-index violation from a concurrent run counts
//! as "already there".
//!
//! Charge status is stored, but the payment ledger is authoritative:
//! [`reconcile_charges`] re-derives each charge from the payments that reference it.

use crate::{
    core::{
        events::{ChangeEvent, ChangeFeed, EntityKind},
        enrollment::enrollments_for_year,
        round_money,
        settings::TuitionPolicy,
        validate_month,
    },
    entities::{
        Charge, ChargeStatus, Concept, Payment, Student, StudentStatus, charge, enrollment,
        payment, student,
    },
    errors::{Error, Result},
};
use chrono::{Datelike, NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

/// Outcome of one generator run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChargeGenerationResult {
    /// Enrollments examined
    pub enrollments_processed: usize,
    /// Enrollments left alone because their student is inactive
    pub skipped_inactive: usize,
    /// Charges inserted by this run
    pub created: usize,
    /// Charges that already existed (including ones a concurrent run inserted)
    pub already_present: usize,
}

/// Last day of a billing month; the charge is due on that day.
pub fn due_date_for(academic_year: i32, month: u32) -> Result<NaiveDate> {
    validate_month(month)?;
    let (next_year, next_month) = if month == 12 {
        (academic_year + 1, 1)
    } else {
        (academic_year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .ok_or_else(|| Error::InvalidInput {
            message: format!("no calendar date for {academic_year}-{month:02}"),
        })
}

/// Derives a charge's status from what was paid, what is owed and today's date.
///
/// A charge with nothing paid becomes `Moroso` once its due date is in the past.
/// A partly paid charge stays `Parcial` even when overdue.
#[must_use]
pub fn derive_status(paid_amount: f64, amount: f64, due_date: NaiveDate, today: NaiveDate) -> ChargeStatus {
    let paid = round_money(paid_amount);
    if paid >= round_money(amount) {
        ChargeStatus::Pagado
    } else if paid > 0.0 {
        ChargeStatus::Parcial
    } else if due_date < today {
        ChargeStatus::Moroso
    } else {
        ChargeStatus::Pendiente
    }
}

/// True when the charge is unpaid (fully or partly) and its due date has passed.
#[must_use]
pub fn is_overdue(charge: &charge::Model, today: NaiveDate) -> bool {
    charge.status.is_open() && charge.due_date < today
}

/// Ensures one `MENSUALIDAD` charge per month from each enrollment's start month
/// through `current_month` of `academic_year`.
///
/// Months are processed in ascending order. Re-running never creates duplicates.
/// Enrollments of inactive students are skipped; reactivating a student backfills
/// the months missed on the next run.
#[instrument(skip(db, feed, policy))]
pub async fn generate_monthly_charges(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    policy: &TuitionPolicy,
    academic_year: i32,
    current_month: u32,
) -> Result<ChargeGenerationResult> {
    validate_month(current_month)?;
    let amount = round_money(policy.monthly_amount);
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidAmount {
            amount: policy.monthly_amount,
        });
    }

    let active: HashSet<i64> = Student::find()
        .filter(student::Column::Status.eq(StudentStatus::Activo))
        .all(db)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();
    let (enrollments, inactive): (Vec<_>, Vec<_>) = enrollments_for_year(db, academic_year)
        .await?
        .into_iter()
        .partition(|e| active.contains(&e.student_id));
    let existing: HashSet<(i64, i32)> = Charge::find()
        .filter(charge::Column::AcademicYear.eq(academic_year))
        .filter(charge::Column::Concept.eq(Concept::Mensualidad))
        .all(db)
        .await?
        .into_iter()
        .map(|c| (c.student_id, c.month))
        .collect();

    let mut result = ChargeGenerationResult {
        enrollments_processed: enrollments.len(),
        skipped_inactive: inactive.len(),
        ..Default::default()
    };
    let mut events = Vec::new();

    for enrollment in &enrollments {
        let first = u32::try_from(enrollment.start_month).unwrap_or(1).max(1);
        for month in first..=current_month {
            let key = (enrollment.student_id, i32::try_from(month).unwrap_or_default());
            if existing.contains(&key) {
                result.already_present += 1;
                continue;
            }
            match insert_monthly_charge(db, enrollment, month, amount, policy).await? {
                Some(created) => {
                    result.created += 1;
                    events.push(ChangeEvent::inserted(EntityKind::Charge, created.id));
                }
                None => result.already_present += 1,
            }
        }
    }

    if result.created > 0 {
        info!(
            created = result.created,
            enrollments = result.enrollments_processed,
            "Monthly charges generated"
        );
    } else {
        debug!("Monthly charges already complete");
    }
    if result.skipped_inactive > 0 {
        debug!(
            skipped = result.skipped_inactive,
            "Enrollments of inactive students skipped"
        );
    }
    feed.publish_all(events);
    Ok(result)
}

/// Inserts one pending charge. Returns `None` when a concurrent writer got there first.
async fn insert_monthly_charge(
    db: &DatabaseConnection,
    enrollment: &enrollment::Model,
    month: u32,
    amount: f64,
    policy: &TuitionPolicy,
) -> Result<Option<charge::Model>> {
    let month_number = validate_month(month)?;
    let model = charge::ActiveModel {
        student_id: Set(enrollment.student_id),
        enrollment_id: Set(enrollment.id),
        academic_year: Set(enrollment.academic_year),
        month: Set(month_number),
        concept: Set(Concept::Mensualidad),
        amount: Set(amount),
        paid_amount: Set(0.0),
        currency: Set(policy.currency),
        status: Set(ChargeStatus::Pendiente),
        due_date: Set(due_date_for(enrollment.academic_year, month)?),
        version: Set(0),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    match model.insert(db).await {
        Ok(created) => Ok(Some(created)),
        Err(err) => {
            let err = Error::from(err);
            if err.is_unique_violation() {
                debug!(
                    student_id = enrollment.student_id,
                    month, "Charge inserted concurrently, skipping"
                );
                Ok(None)
            } else {
                Err(err)
            }
        }
    }
}

/// Persists `MOROSO` on every unpaid `PENDIENTE` charge whose due date is before `today`.
///
/// # Returns
/// The number of charges that became delinquent.
#[instrument(skip(db, feed))]
pub async fn mark_overdue_charges(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    today: NaiveDate,
) -> Result<u64> {
    let overdue: Vec<i64> = Charge::find()
        .filter(charge::Column::Status.eq(ChargeStatus::Pendiente))
        .filter(charge::Column::DueDate.lt(today))
        .all(db)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect();
    if overdue.is_empty() {
        return Ok(0);
    }

    let result = Charge::update_many()
        .col_expr(charge::Column::Status, Expr::value(ChargeStatus::Moroso))
        .col_expr(
            charge::Column::Version,
            Expr::col(charge::Column::Version).add(1),
        )
        .filter(charge::Column::Id.is_in(overdue.clone()))
        .filter(charge::Column::Status.eq(ChargeStatus::Pendiente))
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        info!(count = result.rows_affected, "Charges marked delinquent");
        feed.publish_all(
            overdue
                .into_iter()
                .map(|id| ChangeEvent::updated(EntityKind::Charge, id)),
        );
    }
    Ok(result.rows_affected)
}

/// Writes a new paid amount on a charge if, and only if, the row is still at the
/// version that was read. The status is re-derived as of `today`.
pub async fn compare_and_swap_paid<C>(
    db: &C,
    current: &charge::Model,
    new_paid_amount: f64,
    today: NaiveDate,
) -> Result<charge::Model>
where
    C: ConnectionTrait,
{
    let new_paid_amount = round_money(new_paid_amount);
    if new_paid_amount < 0.0 || new_paid_amount > current.amount {
        return Err(Error::ExceedsBalance {
            tendered: round_money(new_paid_amount - current.paid_amount),
            remaining: current.outstanding(),
        });
    }
    let status = derive_status(new_paid_amount, current.amount, current.due_date, today);

    let result = Charge::update_many()
        .col_expr(charge::Column::PaidAmount, Expr::value(new_paid_amount))
        .col_expr(charge::Column::Status, Expr::value(status))
        .col_expr(
            charge::Column::Version,
            Expr::col(charge::Column::Version).add(1),
        )
        .filter(charge::Column::Id.eq(current.id))
        .filter(charge::Column::Version.eq(current.version))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::ConcurrentModification {
            entity: "charge",
            id: current.id,
        });
    }

    Ok(charge::Model {
        paid_amount: new_paid_amount,
        status,
        version: current.version + 1,
        ..current.clone()
    })
}

/// Finds a charge by id, failing when it does not exist.
pub async fn require_charge<C>(db: &C, charge_id: i64) -> Result<charge::Model>
where
    C: ConnectionTrait,
{
    Charge::find_by_id(charge_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "charge",
            id: charge_id,
        })
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Charges examined
    pub examined: usize,
    /// Charges whose stored paid amount or status disagreed with the ledger
    pub corrected: usize,
}

/// Re-derives every charge's paid amount and status from the payment ledger.
///
/// Repairs charges left inconsistent by a write that stored the payment but not the
/// status change (or the reverse).
#[instrument(skip(db, feed))]
pub async fn reconcile_charges(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    today: NaiveDate,
) -> Result<ReconcileResult> {
    let mut paid_by_charge: HashMap<i64, f64> = HashMap::new();
    for p in Payment::find()
        .filter(payment::Column::ChargeId.is_not_null())
        .all(db)
        .await?
    {
        if let Some(charge_id) = p.charge_id {
            *paid_by_charge.entry(charge_id).or_default() += p.amount;
        }
    }

    let charges = Charge::find().all(db).await?;
    let mut result = ReconcileResult {
        examined: charges.len(),
        ..Default::default()
    };
    let mut events = Vec::new();

    for charge in charges {
        let ledger_paid = round_money(paid_by_charge.get(&charge.id).copied().unwrap_or(0.0));
        let status = derive_status(ledger_paid, charge.amount, charge.due_date, today);
        // PENDIENTE and MOROSO only differ by date; leave that to mark_overdue_charges
        let status_agrees = status == charge.status
            || (matches!(status, ChargeStatus::Pendiente | ChargeStatus::Moroso)
                && matches!(charge.status, ChargeStatus::Pendiente | ChargeStatus::Moroso));
        if round_money(charge.paid_amount) == ledger_paid && status_agrees {
            continue;
        }

        warn!(
            charge_id = charge.id,
            stored = charge.paid_amount,
            ledger = ledger_paid,
            "Charge disagrees with payment ledger, correcting"
        );
        Charge::update_many()
            .col_expr(charge::Column::PaidAmount, Expr::value(ledger_paid))
            .col_expr(charge::Column::Status, Expr::value(status))
            .col_expr(
                charge::Column::Version,
                Expr::col(charge::Column::Version).add(1),
            )
            .filter(charge::Column::Id.eq(charge.id))
            .exec(db)
            .await?;
        result.corrected += 1;
        events.push(ChangeEvent::updated(EntityKind::Charge, charge.id));
    }

    feed.publish_all(events);
    Ok(result)
}

/// Charges of a student for a year, ordered by month.
pub async fn charges_for_student<C>(
    db: &C,
    student_id: i64,
    academic_year: i32,
) -> Result<Vec<charge::Model>>
where
    C: ConnectionTrait,
{
    Charge::find()
        .filter(charge::Column::StudentId.eq(student_id))
        .filter(charge::Column::AcademicYear.eq(academic_year))
        .order_by_asc(charge::Column::Month)
        .order_by_asc(charge::Column::Concept)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Charges of a student for a year that still have money owed.
pub async fn pending_charges_for_student<C>(
    db: &C,
    student_id: i64,
    academic_year: i32,
) -> Result<Vec<charge::Model>>
where
    C: ConnectionTrait,
{
    Ok(charges_for_student(db, student_id, academic_year)
        .await?
        .into_iter()
        .filter(|c| c.status.is_open())
        .collect())
}

/// Every charge of a year, ordered by student then month.
pub async fn charges_for_year<C>(db: &C, academic_year: i32) -> Result<Vec<charge::Model>>
where
    C: ConnectionTrait,
{
    Charge::find()
        .filter(charge::Column::AcademicYear.eq(academic_year))
        .order_by_asc(charge::Column::StudentId)
        .order_by_asc(charge::Column::Month)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Today's month number, as fed to [`generate_monthly_charges`].
#[must_use]
pub fn current_month(today: NaiveDate) -> u32 {
    today.month()
}
