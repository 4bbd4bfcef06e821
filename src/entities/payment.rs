//! Payment entity - an immutable ledger entry.
//!
//! Rows are inserted once per received payment and never updated or deleted.
//! A payment references either the charge or the enrollment it settles.

use super::enums::{Concept, Currency, PaymentMethod};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payment database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    /// Unique identifier for the payment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Paying student
    pub student_id: i64,
    /// Charge settled by this payment, for tuition
    pub charge_id: Option<i64>,
    /// Enrollment settled by this payment, for the enrollment fee
    pub enrollment_id: Option<i64>,
    /// What was paid for
    pub concept: Concept,
    /// Academic year the payment applies to
    pub academic_year: i32,
    /// Billing month for tuition payments
    pub month: Option<i32>,
    /// Amount received
    pub amount: f64,
    /// Currency received
    pub currency: Currency,
    /// How it was received
    pub method: PaymentMethod,
    /// When it was received
    pub paid_at: DateTimeUtc,
}

/// Defines relationships between Payment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each payment belongs to one student
    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::StudentId",
        to = "super::student::Column::Id"
    )]
    Student,
    /// Tuition payments reference their charge
    #[sea_orm(
        belongs_to = "super::charge::Entity",
        from = "Column::ChargeId",
        to = "super::charge::Column::Id"
    )]
    Charge,
    /// Enrollment fee payments reference their enrollment
    #[sea_orm(
        belongs_to = "super::enrollment::Entity",
        from = "Column::EnrollmentId",
        to = "super::enrollment::Column::Id"
    )]
    Enrollment,
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl Related<super::charge::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Charge.def()
    }
}

impl Related<super::enrollment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Enrollment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
