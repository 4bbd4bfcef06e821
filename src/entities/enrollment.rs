//! Enrollment entity - a student's registration for one academic year.
//!
//! Carries the annual enrollment fee balance. At most one row exists per
//! (`student_id`, `academic_year`); a unique index enforces it.

use super::enums::{Currency, EnrollmentStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Enrollment database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "enrollments")]
pub struct Model {
    /// Unique identifier for the enrollment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Enrolled student
    pub student_id: i64,
    /// Academic year, e.g. 2025
    pub academic_year: i32,
    /// Enrollment fee owed for the year
    pub total_amount: f64,
    /// Amount received so far
    pub paid_amount: f64,
    /// Currency of both amounts
    pub currency: Currency,
    /// Derived from `paid_amount` against `total_amount`
    pub status: EnrollmentStatus,
    /// First month (1-12) for which tuition is billed
    pub start_month: i32,
    /// When the enrollment was registered
    pub enrolled_at: DateTimeUtc,
    /// Optimistic concurrency counter, bumped on every update
    pub version: i32,
}

impl Model {
    /// Amount still owed, never negative.
    #[must_use]
    pub fn remaining(&self) -> f64 {
        crate::core::round_money((self.total_amount - self.paid_amount).max(0.0))
    }
}

/// Defines relationships between Enrollment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each enrollment belongs to one student
    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::StudentId",
        to = "super::student::Column::Id"
    )]
    Student,
    /// Monthly charges generated for this enrollment
    #[sea_orm(has_many = "super::charge::Entity")]
    Charges,
    /// Enrollment fee payments
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl Related<super::charge::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Charges.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
