//! Student entity - a registered pupil.
//!
//! Each student references exactly one guardian (possibly shared with siblings),
//! one grade and an optional section.

use super::enums::StudentStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Student database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "students")]
pub struct Model {
    /// Unique identifier for the student
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Full name
    pub full_name: String,
    /// School-issued code such as `2024-0001`
    pub enrollment_code: Option<String>,
    /// Active or inactive
    pub status: StudentStatus,
    /// Responsible guardian
    pub guardian_id: i64,
    /// Current grade
    pub grade_id: i64,
    /// Current section, if the grade is split
    pub section_id: Option<i64>,
    /// When the student was registered
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Student and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each student has one guardian
    #[sea_orm(
        belongs_to = "super::guardian::Entity",
        from = "Column::GuardianId",
        to = "super::guardian::Column::Id"
    )]
    Guardian,
    /// Each student is in one grade
    #[sea_orm(
        belongs_to = "super::grade::Entity",
        from = "Column::GradeId",
        to = "super::grade::Column::Id"
    )]
    Grade,
    /// Each student may be in one section
    #[sea_orm(
        belongs_to = "super::section::Entity",
        from = "Column::SectionId",
        to = "super::section::Column::Id"
    )]
    Section,
    /// One enrollment per academic year
    #[sea_orm(has_many = "super::enrollment::Entity")]
    Enrollments,
    /// Monthly and other charges
    #[sea_orm(has_many = "super::charge::Entity")]
    Charges,
    /// Payment ledger entries
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::guardian::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Guardian.def()
    }
}

impl Related<super::grade::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Grade.def()
    }
}

impl Related<super::section::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Section.def()
    }
}

impl Related<super::enrollment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Enrollments.def()
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
