//! Aggregation Reporter - read-side projections over enrollments, charges and payments.
//!
//! Nothing here writes to the store; every function can be re-run at any time and
//! gives the same answer for the same data. Money is always totalled per currency
//! and never converted: NIO and USD are reported side by side.

use crate::{
    core::{
        enrollment::enrollments_for_year,
        round_money,
        solvency::{SolvencyCounts, solvency_by_student},
    },
    entities::{
        Concept, Currency, Payment, PaymentMethod, Student, StudentStatus, payment, student,
    },
    errors::Result,
};
use chrono::{Datelike, NaiveDate};
use sea_orm::{Select, prelude::*};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::instrument;

/// Which slice of the school a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportScope {
    /// Academic year
    pub academic_year: i32,
    /// Billing month; `None` covers the whole year
    pub month: Option<u32>,
    /// Only students of this grade
    pub grade_id: Option<i64>,
    /// Only students of this section
    pub section_id: Option<i64>,
    /// Only amounts in this currency
    pub currency: Option<Currency>,
}

impl ReportScope {
    /// Whole school, whole year.
    #[must_use]
    pub fn year(academic_year: i32) -> Self {
        Self {
            academic_year,
            ..Default::default()
        }
    }

    /// Narrows the scope to one month.
    #[must_use]
    pub const fn with_month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    /// Month used for solvency: the scoped month, else the running month of the
    /// year (December for past years, January for future ones).
    #[must_use]
    pub fn period_month(&self, today: NaiveDate) -> u32 {
        self.month.unwrap_or_else(|| {
            match today.year().cmp(&self.academic_year) {
                std::cmp::Ordering::Equal => today.month(),
                std::cmp::Ordering::Greater => 12,
                std::cmp::Ordering::Less => 1,
            }
        })
    }

    fn includes_currency(&self, currency: Currency) -> bool {
        self.currency.is_none_or(|c| c == currency)
    }

    /// Month a payment counts toward: tuition by billing month, anything else
    /// by the calendar month it was received in.
    fn payment_month(payment: &payment::Model) -> u32 {
        match (payment.concept, payment.month) {
            (Concept::Mensualidad, Some(month)) => u32::try_from(month).unwrap_or_default(),
            _ => payment.paid_at.month(),
        }
    }

    fn includes_payment(&self, payment: &payment::Model) -> bool {
        self.includes_currency(payment.currency)
            && self
                .month
                .is_none_or(|m| Self::payment_month(payment) == m)
    }
}

/// Revenue per concept and currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RevenueTotals {
    /// Amount received, by concept then currency
    pub by_concept: BTreeMap<Concept, BTreeMap<Currency, f64>>,
}

impl RevenueTotals {
    fn add(&mut self, concept: Concept, currency: Currency, amount: f64) {
        let total = self
            .by_concept
            .entry(concept)
            .or_default()
            .entry(currency)
            .or_default();
        *total = round_money(*total + amount);
    }

    /// Total received for a concept in one currency.
    #[must_use]
    pub fn total(&self, concept: Concept, currency: Currency) -> f64 {
        self.by_concept
            .get(&concept)
            .and_then(|per_currency| per_currency.get(&currency))
            .copied()
            .unwrap_or(0.0)
    }

    /// Tuition received in one currency.
    #[must_use]
    pub fn mensualidades(&self, currency: Currency) -> f64 {
        self.total(Concept::Mensualidad, currency)
    }

    /// Enrollment fees received in one currency.
    #[must_use]
    pub fn matriculas(&self, currency: Currency) -> f64 {
        self.total(Concept::Matricula, currency)
    }
}

/// Headline numbers for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardSummary {
    /// Academic year covered
    pub academic_year: i32,
    /// Month used for solvency
    pub period_month: u32,
    /// Active students in scope
    pub total_students: usize,
    /// Per-status counts (includes the enrolled count)
    pub solvency: SolvencyCounts,
    /// Revenue in scope
    pub revenue: RevenueTotals,
    /// Tuition payments received today
    pub mensualidad_payments_today: usize,
    /// Enrollment fee payments received today
    pub matricula_payments_today: usize,
}

/// Ids of the students in the scope's grade and section, whatever their status.
///
/// Money already received stays in the totals after a student is deactivated.
async fn students_in_scope<C>(db: &C, scope: &ReportScope) -> Result<HashSet<i64>>
where
    C: ConnectionTrait,
{
    Ok(scoped_students(scope).all(db).await?.into_iter().map(|s| s.id).collect())
}

/// Ids of the active students the scope covers.
async fn active_students_in_scope<C>(db: &C, scope: &ReportScope) -> Result<HashSet<i64>>
where
    C: ConnectionTrait,
{
    Ok(scoped_students(scope)
        .filter(student::Column::Status.eq(StudentStatus::Activo))
        .all(db)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect())
}

fn scoped_students(scope: &ReportScope) -> Select<Student> {
    let mut query = Student::find();
    if let Some(grade_id) = scope.grade_id {
        query = query.filter(student::Column::GradeId.eq(grade_id));
    }
    if let Some(section_id) = scope.section_id {
        query = query.filter(student::Column::SectionId.eq(section_id));
    }
    query
}

/// Payments of the scoped year and students, before month and currency filtering.
async fn year_payments<C>(
    db: &C,
    scope: &ReportScope,
    students: &HashSet<i64>,
) -> Result<Vec<payment::Model>>
where
    C: ConnectionTrait,
{
    Ok(Payment::find()
        .filter(payment::Column::AcademicYear.eq(scope.academic_year))
        .all(db)
        .await?
        .into_iter()
        .filter(|p| students.contains(&p.student_id))
        .collect())
}

/// Revenue in scope, split by concept and currency.
pub async fn revenue_totals<C>(db: &C, scope: &ReportScope) -> Result<RevenueTotals>
where
    C: ConnectionTrait,
{
    let students = students_in_scope(db, scope).await?;
    let mut totals = RevenueTotals::default();
    for p in year_payments(db, scope, &students).await? {
        if scope.includes_payment(&p) {
            totals.add(p.concept, p.currency, p.amount);
        }
    }
    Ok(totals)
}

/// Number of payments of `concept` received on `today`.
pub async fn payments_today<C>(
    db: &C,
    scope: &ReportScope,
    today: NaiveDate,
    concept: Concept,
) -> Result<usize>
where
    C: ConnectionTrait,
{
    let students = students_in_scope(db, scope).await?;
    Ok(Payment::find()
        .filter(payment::Column::Concept.eq(concept))
        .all(db)
        .await?
        .into_iter()
        .filter(|p| {
            p.paid_at.date_naive() == today
                && students.contains(&p.student_id)
                && scope.includes_currency(p.currency)
        })
        .count())
}

/// Computes the dashboard for a scope.
#[instrument(skip(db))]
pub async fn dashboard_summary<C>(
    db: &C,
    scope: &ReportScope,
    today: NaiveDate,
) -> Result<DashboardSummary>
where
    C: ConnectionTrait,
{
    let students = active_students_in_scope(db, scope).await?;
    let period_month = scope.period_month(today);
    let statuses = solvency_by_student(db, scope.academic_year, period_month, today).await?;
    let solvency = SolvencyCounts::tally(
        statuses
            .into_iter()
            .filter(|(id, _)| students.contains(id))
            .map(|(_, status)| status),
    );

    Ok(DashboardSummary {
        academic_year: scope.academic_year,
        period_month,
        total_students: students.len(),
        solvency,
        revenue: revenue_totals(db, scope).await?,
        mensualidad_payments_today: payments_today(db, scope, today, Concept::Mensualidad)
            .await?,
        matricula_payments_today: payments_today(db, scope, today, Concept::Matricula).await?,
    })
}

/// One month of revenue in one currency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRevenueRow {
    /// Month, 1-12
    pub month: u32,
    /// Currency
    pub currency: Currency,
    /// Tuition received
    pub mensualidades: f64,
    /// Enrollment fees received
    pub matriculas: f64,
    /// Everything received
    pub total: f64,
}

/// Revenue of every month of the scoped year, per currency that saw any payment.
pub async fn monthly_revenue<C>(db: &C, scope: &ReportScope) -> Result<Vec<MonthlyRevenueRow>>
where
    C: ConnectionTrait,
{
    let students = students_in_scope(db, scope).await?;
    let mut by_month: BTreeMap<(Currency, u32), RevenueTotals> = BTreeMap::new();
    let mut currencies = HashSet::new();
    for p in year_payments(db, scope, &students).await? {
        if !scope.includes_currency(p.currency) {
            continue;
        }
        currencies.insert(p.currency);
        by_month
            .entry((p.currency, ReportScope::payment_month(&p)))
            .or_default()
            .add(p.concept, p.currency, p.amount);
    }

    let mut currencies: Vec<Currency> = currencies.into_iter().collect();
    currencies.sort();
    let mut rows = Vec::new();
    for currency in currencies {
        for month in 1..=12 {
            let totals = by_month.remove(&(currency, month)).unwrap_or_default();
            let all: f64 = totals
                .by_concept
                .values()
                .filter_map(|per_currency| per_currency.get(&currency))
                .sum();
            rows.push(MonthlyRevenueRow {
                month,
                currency,
                mensualidades: totals.mensualidades(currency),
                matriculas: totals.matriculas(currency),
                total: round_money(all),
            });
        }
    }
    Ok(rows)
}

/// Revenue received through one payment method in one currency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodRevenueRow {
    /// Payment method
    pub method: PaymentMethod,
    /// Currency
    pub currency: Currency,
    /// Number of payments
    pub count: usize,
    /// Amount received
    pub amount: f64,
}

/// Revenue in scope grouped by payment method.
pub async fn revenue_by_method<C>(db: &C, scope: &ReportScope) -> Result<Vec<MethodRevenueRow>>
where
    C: ConnectionTrait,
{
    let students = students_in_scope(db, scope).await?;
    let mut grouped: BTreeMap<(PaymentMethod, Currency), (usize, f64)> = BTreeMap::new();
    for p in year_payments(db, scope, &students).await? {
        if scope.includes_payment(&p) {
            let (count, amount) = grouped.entry((p.method, p.currency)).or_default();
            *count += 1;
            *amount = round_money(*amount + p.amount);
        }
    }
    Ok(grouped
        .into_iter()
        .map(|((method, currency), (count, amount))| MethodRevenueRow {
            method,
            currency,
            count,
            amount,
        })
        .collect())
}

/// Number of active students enrolled for the scoped year.
pub async fn enrolled_count<C>(db: &C, scope: &ReportScope) -> Result<usize>
where
    C: ConnectionTrait,
{
    let students = active_students_in_scope(db, scope).await?;
    Ok(enrollments_for_year(db, scope.academic_year)
        .await?
        .iter()
        .filter(|e| students.contains(&e.student_id))
        .count())
}

/// Formats an amount with its currency symbol, e.g. `C$1,250.50`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_money(amount: f64, currency: Currency) -> String {
    let symbol = match currency {
        Currency::Nio => "C$",
        Currency::Usd => "$",
    };
    let cents = (round_money(amount.abs()) * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{sign}{symbol}{grouped}.{:02}", cents % 100)
}
