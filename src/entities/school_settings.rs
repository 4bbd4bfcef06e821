//! School settings entity - a single row holding the billing configuration.
//!
//! Seeded from `config.toml` on first run and edited afterwards through
//! [`crate::core::settings::update_settings`].

use super::enums::Currency;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// School settings database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "school_settings")]
pub struct Model {
    /// Always 1
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    /// School name printed on reports
    pub school_name: String,
    /// Academic year currently being billed
    pub current_academic_year: i32,
    /// Fixed monthly tuition amount
    pub monthly_amount: f64,
    /// Currency of monthly tuition
    pub monthly_currency: Currency,
    /// Default annual enrollment fee
    pub enrollment_amount: f64,
    /// Currency of the enrollment fee
    pub enrollment_currency: Currency,
    /// When the settings were last modified
    pub updated_at: DateTime,
}

/// `SchoolSettings` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
