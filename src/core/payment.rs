//! Payment Recorder - writes money received to the append-only payment ledger.
//!
//! A payment settles either one charge (tuition) or an enrollment's fee balance.
//! Each recording is one store transaction: all validation happens first, then the
//! balance is advanced with a version compare-and-swap and the ledger row is inserted.
//! A failure at any step leaves no partial state behind.

use crate::{
    core::{
        charge::{compare_and_swap_paid, require_charge},
        enrollment::{
            NewEnrollment, check_tender, compare_and_swap_balance, find_enrollment,
            insert_enrollment,
        },
        events::{ChangeEvent, ChangeFeed, EntityKind},
        validate_positive_amount,
    },
    entities::{
        Concept, Currency, Payment, PaymentMethod, Student, charge, enrollment, payment, student,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*};
use serde::Serialize;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{info, instrument, warn};

/// A tuition payment against one charge.
#[derive(Debug, Clone)]
pub struct ChargePayment {
    /// Student selected on the payment form
    pub student_id: Option<i64>,
    /// Charge being paid
    pub charge_id: i64,
    /// Amount tendered
    pub amount: f64,
    /// Currency tendered; must match the charge
    pub currency: Currency,
    /// How the money was received
    pub method: PaymentMethod,
    /// When the money was received; defaults to now
    pub paid_at: Option<DateTime<Utc>>,
}

/// An enrollment fee payment.
#[derive(Debug, Clone)]
pub struct EnrollmentPayment {
    /// Student selected on the payment form
    pub student_id: Option<i64>,
    /// Academic year of the enrollment
    pub academic_year: i32,
    /// Amount tendered
    pub amount: f64,
    /// Currency tendered; must match the enrollment
    pub currency: Currency,
    /// How the money was received
    pub method: PaymentMethod,
    /// When the money was received; defaults to now
    pub paid_at: Option<DateTime<Utc>>,
}

/// Money handed over while enrolling.
#[derive(Debug, Clone, Copy)]
pub struct InitialPayment {
    /// Amount tendered
    pub amount: f64,
    /// How the money was received
    pub method: PaymentMethod,
}

/// Result of a recorded charge payment.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeReceipt {
    /// The ledger entry
    pub payment: payment::Model,
    /// The charge after the payment was applied
    pub charge: charge::Model,
}

/// Result of a recorded enrollment payment.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentReceipt {
    /// The ledger entry
    pub payment: payment::Model,
    /// The enrollment after the payment was applied
    pub enrollment: enrollment::Model,
}

/// Records a tuition payment against a charge.
///
/// # Errors
/// - [`Error::NoStudentSelected`] when no student is given
/// - [`Error::InvalidInput`] when the charge belongs to another student
/// - [`Error::AlreadySettled`] when nothing is owed on the charge
/// - [`Error::CurrencyMismatch`] when the currency differs from the charge's
/// - [`Error::ExceedsBalance`] when the amount is above what is owed
/// - [`Error::ConcurrentModification`] when the charge changed while recording
#[instrument(skip(db, feed, request), fields(charge_id = request.charge_id, amount = request.amount))]
pub async fn record_charge_payment(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    request: ChargePayment,
) -> Result<ChargeReceipt> {
    let student_id = request.student_id.ok_or(Error::NoStudentSelected)?;
    let amount = validate_positive_amount(request.amount)?;
    let paid_at = request.paid_at.unwrap_or_else(Utc::now);

    let txn = db.begin().await?;
    let current = require_charge(&txn, request.charge_id).await?;
    if current.student_id != student_id {
        return Err(Error::InvalidInput {
            message: format!(
                "Charge {} does not belong to student {student_id}",
                current.id
            ),
        });
    }
    let outstanding = current.outstanding();
    if outstanding <= 0.0 {
        return Err(Error::AlreadySettled);
    }
    if request.currency != current.currency {
        return Err(Error::CurrencyMismatch {
            expected: current.currency.to_string(),
            actual: request.currency.to_string(),
        });
    }
    if amount > outstanding {
        return Err(Error::ExceedsBalance {
            tendered: amount,
            remaining: outstanding,
        });
    }

    let updated =
        compare_and_swap_paid(&txn, &current, current.paid_amount + amount, paid_at.date_naive())
            .await?;
    let payment = payment::ActiveModel {
        student_id: Set(student_id),
        charge_id: Set(Some(current.id)),
        enrollment_id: Set(None),
        concept: Set(current.concept),
        academic_year: Set(current.academic_year),
        month: Set(Some(current.month)),
        amount: Set(amount),
        currency: Set(request.currency),
        method: Set(request.method),
        paid_at: Set(paid_at),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    info!(
        payment_id = payment.id,
        status = ?updated.status,
        "Charge payment recorded"
    );
    feed.publish_all([
        ChangeEvent::inserted(EntityKind::Payment, payment.id),
        ChangeEvent::updated(EntityKind::Charge, updated.id),
    ]);
    Ok(ChargeReceipt {
        payment,
        charge: updated,
    })
}

/// Records an enrollment fee payment against the student's enrollment for the year.
///
/// # Errors
/// - [`Error::NoStudentSelected`] when no student is given
/// - [`Error::NotFound`] when the student is not enrolled for the year
/// - [`Error::CurrencyMismatch`] when the currency differs from the enrollment's
/// - [`Error::AlreadySettled`] when the fee is fully paid
/// - [`Error::ExceedsBalance`] when the amount is above the remaining balance
/// - [`Error::ConcurrentModification`] when the enrollment changed while recording
#[instrument(skip(db, feed, request), fields(year = request.academic_year, amount = request.amount))]
pub async fn record_enrollment_payment(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    request: EnrollmentPayment,
) -> Result<EnrollmentReceipt> {
    let student_id = request.student_id.ok_or(Error::NoStudentSelected)?;
    let paid_at = request.paid_at.unwrap_or_else(Utc::now);

    let txn = db.begin().await?;
    let current = find_enrollment(&txn, student_id, request.academic_year)
        .await?
        .ok_or(Error::NotFound {
            entity: "enrollment",
            id: student_id,
        })?;
    if request.currency != current.currency {
        return Err(Error::CurrencyMismatch {
            expected: current.currency.to_string(),
            actual: request.currency.to_string(),
        });
    }
    let receipt = apply_enrollment_payment(&txn, &current, request.amount, request.method, paid_at)
        .await?;
    txn.commit().await?;

    info!(
        payment_id = receipt.payment.id,
        status = ?receipt.enrollment.status,
        "Enrollment payment recorded"
    );
    feed.publish_all([
        ChangeEvent::inserted(EntityKind::Payment, receipt.payment.id),
        ChangeEvent::updated(EntityKind::Enrollment, receipt.enrollment.id),
    ]);
    Ok(receipt)
}

/// Enrolls a student and, when money is handed over, records it in the same transaction.
///
/// Either both rows are written or neither is.
#[instrument(skip(db, feed, new_enrollment, initial), fields(student_id = new_enrollment.student_id))]
pub async fn enroll_with_payment(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    new_enrollment: NewEnrollment,
    initial: Option<InitialPayment>,
) -> Result<(enrollment::Model, Option<payment::Model>)> {
    let paid_at = new_enrollment.enrolled_at.unwrap_or_else(Utc::now);

    let txn = db.begin().await?;
    let created = insert_enrollment(&txn, &new_enrollment).await?;
    let receipt = match initial {
        Some(initial) => Some(
            apply_enrollment_payment(&txn, &created, initial.amount, initial.method, paid_at)
                .await?,
        ),
        None => None,
    };
    txn.commit().await?;

    info!(enrollment_id = created.id, paid = receipt.is_some(), "Student enrolled");
    feed.publish(ChangeEvent::inserted(EntityKind::Enrollment, created.id));
    match receipt {
        Some(receipt) => {
            feed.publish(ChangeEvent::inserted(EntityKind::Payment, receipt.payment.id));
            Ok((receipt.enrollment, Some(receipt.payment)))
        }
        None => Ok((created, None)),
    }
}

async fn apply_enrollment_payment<C>(
    db: &C,
    current: &enrollment::Model,
    tendered: f64,
    method: PaymentMethod,
    paid_at: DateTime<Utc>,
) -> Result<EnrollmentReceipt>
where
    C: ConnectionTrait,
{
    let amount = check_tender(current, tendered)?;
    let updated = compare_and_swap_balance(db, current, current.paid_amount + amount).await?;
    let payment = payment::ActiveModel {
        student_id: Set(current.student_id),
        charge_id: Set(None),
        enrollment_id: Set(Some(current.id)),
        concept: Set(Concept::Matricula),
        academic_year: Set(current.academic_year),
        month: Set(None),
        amount: Set(amount),
        currency: Set(current.currency),
        method: Set(method),
        paid_at: Set(paid_at),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(EnrollmentReceipt {
        payment,
        enrollment: updated,
    })
}

/// What a pending submission is paying for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentTarget {
    /// A tuition charge
    Charge(i64),
    /// A student's enrollment fee for a year
    Enrollment {
        /// Student
        student_id: i64,
        /// Academic year
        academic_year: i32,
    },
}

/// Tracks payment submissions that have not finished yet.
///
/// A second submission for the same target is refused with
/// [`Error::PaymentInFlight`] until the first one's ticket is dropped.
#[derive(Debug, Clone, Default)]
pub struct InFlightPayments {
    pending: Arc<Mutex<HashSet<PaymentTarget>>>,
}

/// Held for the duration of one submission; releases the target on drop.
#[derive(Debug)]
pub struct InFlightTicket {
    pending: Arc<Mutex<HashSet<PaymentTarget>>>,
    target: PaymentTarget,
}

impl InFlightPayments {
    /// Claims `target`, failing if another submission holds it.
    pub fn begin(&self, target: PaymentTarget) -> Result<InFlightTicket> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if !pending.insert(target) {
            warn!(?target, "Duplicate payment submission refused");
            return Err(Error::PaymentInFlight);
        }
        Ok(InFlightTicket {
            pending: Arc::clone(&self.pending),
            target,
        })
    }

    /// True while a submission for `target` is running.
    #[must_use]
    pub fn is_pending(&self, target: PaymentTarget) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&target)
    }
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.target);
    }
}

/// A ledger entry joined with the student's name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRow {
    /// Payment id
    pub id: i64,
    /// Student id
    pub student_id: i64,
    /// Student name
    pub student_name: String,
    /// What was paid for
    pub concept: Concept,
    /// Academic year
    pub academic_year: i32,
    /// Billing month for tuition
    pub month: Option<i32>,
    /// Amount
    pub amount: f64,
    /// Currency
    pub currency: Currency,
    /// Method
    pub method: PaymentMethod,
    /// When received
    pub paid_at: DateTime<Utc>,
}

/// Payments of one student, newest first. `academic_year` narrows to one year.
pub async fn payments_for_student<C>(
    db: &C,
    student_id: i64,
    academic_year: Option<i32>,
) -> Result<Vec<payment::Model>>
where
    C: ConnectionTrait,
{
    let mut query = Payment::find().filter(payment::Column::StudentId.eq(student_id));
    if let Some(year) = academic_year {
        query = query.filter(payment::Column::AcademicYear.eq(year));
    }
    query
        .order_by_desc(payment::Column::PaidAt)
        .order_by_desc(payment::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// The latest `limit` payments across all students.
pub async fn recent_payments(db: &DatabaseConnection, limit: u64) -> Result<Vec<PaymentRow>> {
    let payments = Payment::find()
        .order_by_desc(payment::Column::PaidAt)
        .order_by_desc(payment::Column::Id)
        .limit(limit)
        .all(db)
        .await?;
    to_payment_rows(db, payments).await
}

/// Joins student names onto ledger entries.
pub async fn to_payment_rows<C>(db: &C, payments: Vec<payment::Model>) -> Result<Vec<PaymentRow>>
where
    C: ConnectionTrait,
{
    let ids: HashSet<i64> = payments.iter().map(|p| p.student_id).collect();
    let names: HashMap<i64, String> = Student::find()
        .filter(student::Column::Id.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .map(|s| (s.id, s.full_name))
        .collect();

    Ok(payments
        .into_iter()
        .map(|p| PaymentRow {
            id: p.id,
            student_name: names.get(&p.student_id).cloned().unwrap_or_default(),
            student_id: p.student_id,
            concept: p.concept,
            academic_year: p.academic_year,
            month: p.month,
            amount: p.amount,
            currency: p.currency,
            method: p.method,
            paid_at: p.paid_at,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::charge::charges_for_student;
    use crate::entities::{ChargeStatus, EnrollmentStatus};
    use crate::test_utils::*;
    use chrono::TimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn enrollment_request(student_id: Option<i64>, amount: f64) -> EnrollmentPayment {
        EnrollmentPayment {
            student_id,
            academic_year: 2025,
            amount,
            currency: Currency::Nio,
            method: PaymentMethod::Efectivo,
            paid_at: None,
        }
    }

    fn charge_request(student_id: i64, charge_id: i64, amount: f64) -> ChargePayment {
        ChargePayment {
            student_id: Some(student_id),
            charge_id,
            amount,
            currency: Currency::Nio,
            method: PaymentMethod::Transferencia,
            paid_at: None,
        }
    }

    #[tokio::test]
    async fn test_no_student_selected() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let feed = ChangeFeed::default();

        let result = record_enrollment_payment(&db, &feed, enrollment_request(None, 100.0)).await;
        assert!(matches!(result, Err(Error::NoStudentSelected)));

        let mut request = charge_request(1, 1, 100.0);
        request.student_id = None;
        let result = record_charge_payment(&db, &feed, request).await;
        assert!(matches!(result, Err(Error::NoStudentSelected)));
        Ok(())
    }

    #[tokio::test]
    async fn test_enrollment_payment_scenario() -> Result<()> {
        let (db, feed, student) = setup_with_student().await?;
        create_test_enrollment(&db, &feed, student.id, 2025, 300.0, Currency::Nio).await?;
        let id = Some(student.id);

        let first = record_enrollment_payment(&db, &feed, enrollment_request(id, 120.0)).await?;
        assert_eq!(first.enrollment.paid_amount, 120.0);
        assert_eq!(first.enrollment.status, EnrollmentStatus::Parcial);
        assert_eq!(first.enrollment.remaining(), 180.0);
        assert_eq!(first.payment.concept, Concept::Matricula);
        assert_eq!(first.payment.enrollment_id, Some(first.enrollment.id));

        let rejected = record_enrollment_payment(&db, &feed, enrollment_request(id, 200.0)).await;
        assert!(matches!(
            rejected,
            Err(Error::ExceedsBalance { tendered, remaining }) if tendered == 200.0 && remaining == 180.0
        ));
        let unchanged = find_enrollment(&db, student.id, 2025).await?.unwrap();
        assert_eq!(unchanged.paid_amount, 120.0);
        assert_eq!(unchanged.status, EnrollmentStatus::Parcial);
        assert_eq!(payments_for_student(&db, student.id, None).await?.len(), 1);

        let last = record_enrollment_payment(&db, &feed, enrollment_request(id, 180.0)).await?;
        assert_eq!(last.enrollment.paid_amount, 300.0);
        assert_eq!(last.enrollment.status, EnrollmentStatus::Pagado);

        let settled = record_enrollment_payment(&db, &feed, enrollment_request(id, 1.0)).await;
        assert!(matches!(settled, Err(Error::AlreadySettled)));
        Ok(())
    }

    #[tokio::test]
    async fn test_enrollment_payment_requires_enrollment() -> Result<()> {
        let (db, feed, student) = setup_with_student().await?;
        let result =
            record_enrollment_payment(&db, &feed, enrollment_request(Some(student.id), 100.0))
                .await;
        assert!(matches!(
            result,
            Err(Error::NotFound {
                entity: "enrollment",
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_enrollment_payment_currency_mismatch() -> Result<()> {
        let (db, feed, student) = setup_with_student().await?;
        create_test_enrollment(&db, &feed, student.id, 2025, 300.0, Currency::Nio).await?;

        let mut request = enrollment_request(Some(student.id), 100.0);
        request.currency = Currency::Usd;
        let result = record_enrollment_payment(&db, &feed, request).await;
        assert!(matches!(result, Err(Error::CurrencyMismatch { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_charge_payment_marks_paid() -> Result<()> {
        let (db, feed, student, charges) = setup_with_charges(2025, 3).await?;
        let mut rx = feed.subscribe();

        let receipt =
            record_charge_payment(&db, &feed, charge_request(student.id, charges[2].id, 1000.0))
                .await?;
        assert_eq!(receipt.charge.status, ChargeStatus::Pagado);
        assert_eq!(receipt.payment.charge_id, Some(charges[2].id));
        assert_eq!(receipt.payment.concept, Concept::Mensualidad);
        assert_eq!(receipt.payment.month, Some(3));

        let stored = charges_for_student(&db, student.id, 2025).await?;
        assert_eq!(stored[2].status, ChargeStatus::Pagado);
        assert_eq!(stored[2].paid_amount, 1000.0);

        assert_eq!(rx.try_recv().unwrap().entity, EntityKind::Payment);
        assert_eq!(rx.try_recv().unwrap().entity, EntityKind::Charge);
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_charge_payment() -> Result<()> {
        let (db, feed, student, charges) = setup_with_charges(2025, 1).await?;
        let charge_id = charges[0].id;

        let first =
            record_charge_payment(&db, &feed, charge_request(student.id, charge_id, 400.0)).await?;
        assert_eq!(first.charge.status, ChargeStatus::Parcial);
        assert_eq!(first.charge.outstanding(), 600.0);

        let over =
            record_charge_payment(&db, &feed, charge_request(student.id, charge_id, 700.0)).await;
        assert!(matches!(over, Err(Error::ExceedsBalance { .. })));

        let rest =
            record_charge_payment(&db, &feed, charge_request(student.id, charge_id, 600.0)).await?;
        assert_eq!(rest.charge.status, ChargeStatus::Pagado);

        let again =
            record_charge_payment(&db, &feed, charge_request(student.id, charge_id, 1.0)).await;
        assert!(matches!(again, Err(Error::AlreadySettled)));
        assert_eq!(payments_for_student(&db, student.id, Some(2025)).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_sub_cent_tender_rejected() -> Result<()> {
        let (db, feed, student, charges) = setup_with_charges(2025, 1).await?;

        let charge_payment =
            record_charge_payment(&db, &feed, charge_request(student.id, charges[0].id, 0.004))
                .await;
        assert!(matches!(charge_payment, Err(Error::InvalidAmount { .. })));

        let enrollment_payment =
            record_enrollment_payment(&db, &feed, enrollment_request(Some(student.id), 0.004))
                .await;
        assert!(matches!(enrollment_payment, Err(Error::InvalidAmount { .. })));

        assert!(payments_for_student(&db, student.id, None).await?.is_empty());
        let stored = charges_for_student(&db, student.id, 2025).await?;
        assert_eq!(stored[0].paid_amount, 0.0);
        assert_eq!(stored[0].status, ChargeStatus::Pendiente);
        Ok(())
    }

    #[tokio::test]
    async fn test_charge_payment_rejects_wrong_student_and_currency() -> Result<()> {
        let (db, feed, student, charges) = setup_with_charges(2025, 1).await?;
        let other = create_test_student(&db, &feed, "Carlos Ruiz", student.grade_id).await?;

        let wrong_owner =
            record_charge_payment(&db, &feed, charge_request(other.id, charges[0].id, 1000.0))
                .await;
        assert!(matches!(wrong_owner, Err(Error::InvalidInput { .. })));

        let mut usd = charge_request(student.id, charges[0].id, 1000.0);
        usd.currency = Currency::Usd;
        let mismatch = record_charge_payment(&db, &feed, usd).await;
        assert!(matches!(mismatch, Err(Error::CurrencyMismatch { .. })));

        assert!(payments_for_student(&db, student.id, None).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_enroll_with_payment_is_atomic() -> Result<()> {
        let (db, feed, student) = setup_with_student().await?;
        let new_enrollment = NewEnrollment {
            student_id: student.id,
            academic_year: 2025,
            total_amount: 300.0,
            currency: Currency::Nio,
            start_month: None,
            enrolled_at: None,
        };

        // Overpaying aborts the whole enrollment
        let result = enroll_with_payment(
            &db,
            &feed,
            new_enrollment.clone(),
            Some(InitialPayment {
                amount: 500.0,
                method: PaymentMethod::Pos,
            }),
        )
        .await;
        assert!(matches!(result, Err(Error::ExceedsBalance { .. })));
        assert!(find_enrollment(&db, student.id, 2025).await?.is_none());

        let (enrollment, payment) = enroll_with_payment(
            &db,
            &feed,
            new_enrollment,
            Some(InitialPayment {
                amount: 300.0,
                method: PaymentMethod::Pos,
            }),
        )
        .await?;
        assert_eq!(enrollment.status, EnrollmentStatus::Pagado);
        assert_eq!(payment.unwrap().method, PaymentMethod::Pos);
        Ok(())
    }

    #[tokio::test]
    async fn test_in_flight_guard() {
        let guard = InFlightPayments::default();
        let target = PaymentTarget::Charge(7);

        let ticket = guard.begin(target).unwrap();
        assert!(guard.is_pending(target));
        assert!(matches!(guard.begin(target), Err(Error::PaymentInFlight)));
        // Other targets are independent
        let other = guard.begin(PaymentTarget::Charge(8)).unwrap();

        drop(ticket);
        assert!(!guard.is_pending(target));
        assert!(guard.begin(target).is_ok());
        drop(other);
    }

    #[tokio::test]
    async fn test_recent_payments_newest_first() -> Result<()> {
        let (db, feed, student, charges) = setup_with_charges(2025, 2).await?;
        for (charge, day) in charges.iter().zip([5, 6]) {
            let mut request = charge_request(student.id, charge.id, 1000.0);
            request.paid_at = Some(Utc.with_ymd_and_hms(2025, 2, day, 10, 0, 0).unwrap());
            record_charge_payment(&db, &feed, request).await?;
        }

        let rows = recent_payments(&db, 1).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].month, Some(2));
        assert_eq!(rows[0].student_name, student.full_name);
        Ok(())
    }
}
