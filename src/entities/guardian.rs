//! Guardian entity - the adult responsible for one or more students.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Guardian database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "guardians")]
pub struct Model {
    /// Unique identifier for the guardian
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Full name as written on receipts
    pub full_name: String,
    /// Contact phone
    pub phone: String,
}

/// Defines relationships between Guardian and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One guardian can be shared by several students
    #[sea_orm(has_many = "super::student::Entity")]
    Students,
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Students.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
