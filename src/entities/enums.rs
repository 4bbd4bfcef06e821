//! String-backed enums shared by several tables.
//!
//! Values are stored exactly as the school's staff read them (`PENDIENTE`, `NIO`, ...),
//! so rows stay legible when inspected directly in the database.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currencies the school bills in. Totals are never converted between them.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Currency {
    /// Nicaraguan córdoba
    #[sea_orm(string_value = "NIO")]
    Nio,
    /// US dollar
    #[sea_orm(string_value = "USD")]
    Usd,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nio => f.write_str("NIO"),
            Self::Usd => f.write_str("USD"),
        }
    }
}

/// Whether a student is currently attending.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StudentStatus {
    /// Attending
    #[sea_orm(string_value = "ACTIVO")]
    Activo,
    /// Withdrawn or suspended
    #[sea_orm(string_value = "INACTIVO")]
    Inactivo,
}

/// Settlement state of an enrollment fee. Always derived from paid vs. total.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    /// Nothing paid
    #[sea_orm(string_value = "PENDIENTE")]
    Pendiente,
    /// Partly paid
    #[sea_orm(string_value = "PARCIAL")]
    Parcial,
    /// Fully paid
    #[sea_orm(string_value = "PAGADO")]
    Pagado,
}

/// Settlement state of a monthly charge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeStatus {
    /// Nothing paid, not yet due
    #[sea_orm(string_value = "PENDIENTE")]
    Pendiente,
    /// Partly paid
    #[sea_orm(string_value = "PARCIAL")]
    Parcial,
    /// Fully paid
    #[sea_orm(string_value = "PAGADO")]
    Pagado,
    /// Nothing paid and past its due date
    #[sea_orm(string_value = "MOROSO")]
    Moroso,
}

impl ChargeStatus {
    /// True for every state that still leaves money owed.
    #[must_use]
    pub const fn is_open(self) -> bool {
        !matches!(self, Self::Pagado)
    }
}

/// What an amount is owed or paid for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Concept {
    /// Annual enrollment fee
    #[sea_orm(string_value = "MATRICULA")]
    Matricula,
    /// Monthly tuition
    #[sea_orm(string_value = "MENSUALIDAD")]
    Mensualidad,
    /// Anything else (uniforms, trips, ...)
    #[sea_orm(string_value = "OTRO")]
    Otro,
}

/// How money was received.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Cash at the front desk
    #[sea_orm(string_value = "EFECTIVO")]
    Efectivo,
    /// Bank transfer
    #[sea_orm(string_value = "TRANSFERENCIA")]
    Transferencia,
    /// Card terminal
    #[sea_orm(string_value = "POS")]
    Pos,
    /// Pocket LAFISE mobile wallet
    #[sea_orm(string_value = "POCKET_LAFISE")]
    PocketLafise,
}
