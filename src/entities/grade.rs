//! Grade entity - a school year level ("1er Grado", "5to Grado", ...).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Grade database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "grades")]
pub struct Model {
    /// Unique identifier for the grade
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name
    pub name: String,
    /// Position in listings, lowest first
    pub sort_order: i32,
}

/// Defines relationships between Grade and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One grade has many sections
    #[sea_orm(has_many = "super::section::Entity")]
    Sections,
    /// One grade has many students
    #[sea_orm(has_many = "super::student::Entity")]
    Students,
}

impl Related<super::section::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sections.def()
    }
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Students.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
