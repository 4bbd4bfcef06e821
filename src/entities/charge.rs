//! Charge entity - an amount owed for one month and concept.
//!
//! One row per (`student_id`, `academic_year`, `month`, `concept`). Charges are
//! never deleted; their status moves forward as payments arrive or due dates pass.

use super::enums::{ChargeStatus, Concept, Currency};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Charge database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "charges")]
pub struct Model {
    /// Unique identifier for the charge
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Student who owes the charge
    pub student_id: i64,
    /// Enrollment the charge was generated from
    pub enrollment_id: i64,
    /// Academic year of the billing month
    pub academic_year: i32,
    /// Billing month, 1-12
    pub month: i32,
    /// What the charge is for
    pub concept: Concept,
    /// Amount owed
    pub amount: f64,
    /// Amount received against this charge
    pub paid_amount: f64,
    /// Currency of both amounts
    pub currency: Currency,
    /// Settlement state
    pub status: ChargeStatus,
    /// Last day of the billing month
    pub due_date: Date,
    /// Optimistic concurrency counter, bumped on every update
    pub version: i32,
    /// When the charge was generated
    pub created_at: DateTimeUtc,
}

impl Model {
    /// Amount still owed, never negative.
    #[must_use]
    pub fn outstanding(&self) -> f64 {
        crate::core::round_money((self.amount - self.paid_amount).max(0.0))
    }
}

/// Defines relationships between Charge and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each charge belongs to one student
    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::StudentId",
        to = "super::student::Column::Id"
    )]
    Student,
    /// Each charge comes from one enrollment
    #[sea_orm(
        belongs_to = "super::enrollment::Entity",
        from = "Column::EnrollmentId",
        to = "super::enrollment::Column::Id"
    )]
    Enrollment,
    /// Payments applied to the charge
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl Related<super::enrollment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Enrollment.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
