//! Section entity - a class group within a grade ("A", "B").

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Section database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sections")]
pub struct Model {
    /// Unique identifier for the section
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Grade this section belongs to
    pub grade_id: i64,
    /// Display name
    pub name: String,
}

/// Defines relationships between Section and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each section belongs to one grade
    #[sea_orm(
        belongs_to = "super::grade::Entity",
        from = "Column::GradeId",
        to = "super::grade::Column::Id"
    )]
    Grade,
    /// One section has many students
    #[sea_orm(has_many = "super::student::Entity")]
    Students,
}

impl Related<super::grade::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Grade.def()
    }
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Students.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
