//! Solvency Evaluator - where a student stands for a billing period.
//!
//! Precedence, first match wins:
//! 1. `Solvente`: the period's tuition charge is paid
//! 2. `Parcial`: a charge up to the period is partly paid
//! 3. `Moroso`: an unpaid charge up to the period is past its due date
//! 4. `Pendiente`: otherwise
//!
//! Students without an enrollment for the year have no solvency status at all.

use crate::{
    core::{
        charge::{charges_for_student, charges_for_year, is_overdue},
        enrollment::{enrollments_for_year, find_enrollment},
        payment::payments_for_student,
        round_money,
        student::{StudentRow, require_student, to_rows},
    },
    entities::{
        ChargeStatus, Concept, Currency, Student, charge, enrollment, payment, student,
    },
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Standing of one student for one billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolvencyStatus {
    /// Period tuition paid
    Solvente,
    /// Something partly paid
    Parcial,
    /// Nothing overdue, period not yet paid
    Pendiente,
    /// Unpaid past the due date
    Moroso,
}

/// Derives a student's status for `month` from their charges of the year.
#[must_use]
pub fn evaluate(charges: &[charge::Model], month: u32, today: NaiveDate) -> SolvencyStatus {
    let month = i32::try_from(month).unwrap_or(12);
    let period_paid = charges.iter().any(|c| {
        c.month == month && c.concept == Concept::Mensualidad && c.status == ChargeStatus::Pagado
    });
    if period_paid {
        return SolvencyStatus::Solvente;
    }

    let due_so_far = || charges.iter().filter(move |c| c.month <= month);
    if due_so_far().any(|c| c.status == ChargeStatus::Parcial) {
        SolvencyStatus::Parcial
    } else if due_so_far().any(|c| is_overdue(c, today)) {
        SolvencyStatus::Moroso
    } else {
        SolvencyStatus::Pendiente
    }
}

/// A student's status for a period, or `None` when not enrolled that year.
pub async fn student_solvency<C>(
    db: &C,
    student_id: i64,
    academic_year: i32,
    month: u32,
    today: NaiveDate,
) -> Result<Option<SolvencyStatus>>
where
    C: ConnectionTrait,
{
    if find_enrollment(db, student_id, academic_year)
        .await?
        .is_none()
    {
        return Ok(None);
    }
    let charges = charges_for_student(db, student_id, academic_year).await?;
    Ok(Some(evaluate(&charges, month, today)))
}

/// Status of every student enrolled in `academic_year`, keyed by student id.
pub async fn solvency_by_student<C>(
    db: &C,
    academic_year: i32,
    month: u32,
    today: NaiveDate,
) -> Result<HashMap<i64, SolvencyStatus>>
where
    C: ConnectionTrait,
{
    let enrolled: HashSet<i64> = enrollments_for_year(db, academic_year)
        .await?
        .into_iter()
        .map(|e| e.student_id)
        .collect();
    let mut by_student: HashMap<i64, Vec<charge::Model>> = HashMap::new();
    for c in charges_for_year(db, academic_year).await? {
        by_student.entry(c.student_id).or_default().push(c);
    }

    Ok(enrolled
        .into_iter()
        .map(|id| {
            let charges = by_student.get(&id).map_or(&[][..], Vec::as_slice);
            (id, evaluate(charges, month, today))
        })
        .collect())
}

/// Student counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SolvencyCounts {
    /// Students enrolled
    pub matriculados: usize,
    /// Period paid
    pub solventes: usize,
    /// Partly paid
    pub parciales: usize,
    /// Awaiting payment
    pub pendientes: usize,
    /// Delinquent
    pub morosos: usize,
}

impl SolvencyCounts {
    /// Counts statuses, one per enrolled student.
    pub fn tally<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = SolvencyStatus>,
    {
        statuses.into_iter().fold(Self::default(), |mut counts, s| {
            counts.matriculados += 1;
            match s {
                SolvencyStatus::Solvente => counts.solventes += 1,
                SolvencyStatus::Parcial => counts.parciales += 1,
                SolvencyStatus::Pendiente => counts.pendientes += 1,
                SolvencyStatus::Moroso => counts.morosos += 1,
            }
            counts
        })
    }
}

/// Counts for every student enrolled in `academic_year`.
pub async fn solvency_counts<C>(
    db: &C,
    academic_year: i32,
    month: u32,
    today: NaiveDate,
) -> Result<SolvencyCounts>
where
    C: ConnectionTrait,
{
    let statuses = solvency_by_student(db, academic_year, month, today).await?;
    Ok(SolvencyCounts::tally(statuses.into_values()))
}

/// A delinquent student, for the morosos report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelinquentRow {
    /// Student with display names
    #[serde(flatten)]
    pub student: StudentRow,
    /// Months with an overdue unpaid charge
    pub overdue_months: Vec<i32>,
    /// Amount owed on those charges, per currency
    pub amount_due: BTreeMap<Currency, f64>,
}

/// Students whose status for the period is `Moroso`, by name.
pub async fn delinquent_students(
    db: &DatabaseConnection,
    academic_year: i32,
    month: u32,
    today: NaiveDate,
) -> Result<Vec<DelinquentRow>> {
    let statuses = solvency_by_student(db, academic_year, month, today).await?;
    let delinquent: Vec<i64> = statuses
        .into_iter()
        .filter(|(_, s)| *s == SolvencyStatus::Moroso)
        .map(|(id, _)| id)
        .collect();
    if delinquent.is_empty() {
        return Ok(Vec::new());
    }

    let students = Student::find()
        .filter(student::Column::Id.is_in(delinquent))
        .all(db)
        .await?;
    let period = i32::try_from(month).unwrap_or(12);
    let mut rows = Vec::with_capacity(students.len());
    for row in to_rows(db, students).await? {
        let overdue: Vec<charge::Model> = charges_for_student(db, row.id, academic_year)
            .await?
            .into_iter()
            .filter(|c| c.month <= period && is_overdue(c, today))
            .collect();
        let mut amount_due = BTreeMap::new();
        for c in &overdue {
            let due: &mut f64 = amount_due.entry(c.currency).or_default();
            *due = round_money(*due + c.outstanding());
        }
        rows.push(DelinquentRow {
            student: row,
            overdue_months: overdue.iter().map(|c| c.month).collect(),
            amount_due,
        });
    }
    rows.sort_by(|a, b| a.student.full_name.cmp(&b.student.full_name));
    Ok(rows)
}

/// Everything on record for one student in one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentHistory {
    /// The student
    pub student: student::Model,
    /// Enrollment for the year, if any
    pub enrollment: Option<enrollment::Model>,
    /// Charges of the year by month
    pub charges: Vec<charge::Model>,
    /// Payments of the year, newest first
    pub payments: Vec<payment::Model>,
    /// Standing for the requested month, `None` when not enrolled
    pub status: Option<SolvencyStatus>,
}

/// Gathers a student's enrollment, charges, payments and current standing.
pub async fn student_history<C>(
    db: &C,
    student_id: i64,
    academic_year: i32,
    month: u32,
    today: NaiveDate,
) -> Result<StudentHistory>
where
    C: ConnectionTrait,
{
    let student = require_student(db, student_id).await?;
    let enrollment = find_enrollment(db, student_id, academic_year).await?;
    let charges = charges_for_student(db, student_id, academic_year).await?;
    let payments = payments_for_student(db, student_id, Some(academic_year)).await?;
    let status = enrollment
        .as_ref()
        .map(|_| evaluate(&charges, month, today));
    Ok(StudentHistory {
        student,
        enrollment,
        charges,
        payments,
        status,
    })
}
