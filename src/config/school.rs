//! School configuration loading from config.toml
//!
//! The configuration names the school, the academic year currently being billed
//! and the tuition policy (monthly fee and enrollment fee, each with its currency).
//! It is used to seed the persisted school settings on first run.

use crate::core::round_money;
use crate::entities::Currency;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// School identity and calendar
    pub school: SchoolConfig,
    /// Fees
    pub tuition: TuitionConfig,
}

/// School identity and the academic year in force
#[derive(Debug, Deserialize, Clone)]
pub struct SchoolConfig {
    /// Name printed on reports
    pub name: String,
    /// Academic year currently being billed
    pub current_academic_year: i32,
}

/// Fixed fees charged to every enrolled student
#[derive(Debug, Deserialize, Clone)]
pub struct TuitionConfig {
    /// Monthly tuition amount
    pub monthly_amount: f64,
    /// Currency of monthly tuition
    #[serde(default = "default_currency")]
    pub monthly_currency: Currency,
    /// Annual enrollment fee
    pub enrollment_amount: f64,
    /// Currency of the enrollment fee
    #[serde(default = "default_currency")]
    pub enrollment_currency: Currency,
}

const fn default_currency() -> Currency {
    Currency::Nio
}

impl Config {
    /// Rejects a monthly fee that is not positive once rounded to cents, and an
    /// enrollment fee that is negative. Non-finite amounts are always rejected.
    pub fn validate(&self) -> Result<()> {
        if self.school.name.trim().is_empty() {
            return Err(Error::Config {
                message: "school.name cannot be empty".to_string(),
            });
        }
        let monthly = self.tuition.monthly_amount;
        if !monthly.is_finite() || round_money(monthly) <= 0.0 {
            return Err(Error::Config {
                message: format!("tuition.monthly_amount must be a positive number, got {monthly}"),
            });
        }
        let enrollment = self.tuition.enrollment_amount;
        if !enrollment.is_finite() || enrollment < 0.0 {
            return Err(Error::Config {
                message: format!(
                    "tuition.enrollment_amount must be a non-negative number, got {enrollment}"
                ),
            });
        }
        Ok(())
    }
}

/// Loads school configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing or fees are invalid
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    parse_config(&contents)
}

/// Parses and validates configuration from a TOML string
pub fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads configuration from `SCHOOL_CONFIG`, or ./config.toml when unset
pub fn load_default_config() -> Result<Config> {
    let path = std::env::var("SCHOOL_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    load_config(path)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_parse_school_config() {
        let toml_str = r#"
            [school]
            name = "Colegio Padre Bruno Martínez"
            current_academic_year = 2025

            [tuition]
            monthly_amount = 1000.0
            monthly_currency = "NIO"
            enrollment_amount = 300.0
            enrollment_currency = "USD"
        "#;

        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.school.current_academic_year, 2025);
        assert_eq!(config.tuition.monthly_amount, 1000.0);
        assert_eq!(config.tuition.monthly_currency, Currency::Nio);
        assert_eq!(config.tuition.enrollment_currency, Currency::Usd);
    }

    #[test]
    fn test_currency_defaults_to_cordobas() {
        let toml_str = r#"
            [school]
            name = "Colegio"
            current_academic_year = 2025

            [tuition]
            monthly_amount = 1500.0
            enrollment_amount = 3000.0
        "#;

        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.tuition.monthly_currency, Currency::Nio);
        assert_eq!(config.tuition.enrollment_currency, Currency::Nio);
    }

    #[test]
    fn test_negative_fee_rejected() {
        let toml_str = r#"
            [school]
            name = "Colegio"
            current_academic_year = 2025

            [tuition]
            monthly_amount = -1.0
            enrollment_amount = 3000.0
        "#;

        let result = parse_config(toml_str);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_zero_monthly_fee_rejected() {
        let toml_str = r#"
            [school]
            name = "Colegio"
            current_academic_year = 2025

            [tuition]
            monthly_amount = 0.0
            enrollment_amount = 0.0
        "#;

        let result = parse_config(toml_str);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_free_enrollment_allowed() {
        let toml_str = r#"
            [school]
            name = "Colegio"
            current_academic_year = 2025

            [tuition]
            monthly_amount = 800.0
            enrollment_amount = 0.0
        "#;

        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.tuition.enrollment_amount, 0.0);
    }

    #[test]
    fn test_unknown_currency_rejected() {
        let toml_str = r#"
            [school]
            name = "Colegio"
            current_academic_year = 2025

            [tuition]
            monthly_amount = 1.0
            monthly_currency = "EUR"
            enrollment_amount = 3000.0
        "#;

        assert!(parse_config(toml_str).is_err());
    }
}
