//! School settings business logic
//!
//! The settings row holds the academic year currently being billed and the fixed
//! fees. It is seeded once from `config.toml`; after that the stored row is the
//! source of truth and can be edited without touching the file.

use crate::{
    config::school::Config,
    core::{
        events::{ChangeEvent, ChangeFeed, EntityKind},
        round_money,
    },
    entities::{Currency, SchoolSettings, school_settings},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, prelude::*};
use tracing::{info, instrument};

const SETTINGS_ID: i32 = 1;

/// Monthly tuition billed to every enrolled student.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuitionPolicy {
    /// Amount of each monthly charge
    pub monthly_amount: f64,
    /// Currency of each monthly charge
    pub currency: Currency,
}

impl From<&school_settings::Model> for TuitionPolicy {
    fn from(settings: &school_settings::Model) -> Self {
        Self {
            monthly_amount: settings.monthly_amount,
            currency: settings.monthly_currency,
        }
    }
}

/// Fields an administrator may change. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    /// New school name
    pub school_name: Option<String>,
    /// New academic year in force
    pub current_academic_year: Option<i32>,
    /// New monthly tuition amount and currency
    pub monthly_fee: Option<(f64, Currency)>,
    /// New enrollment fee amount and currency
    pub enrollment_fee: Option<(f64, Currency)>,
}

/// Retrieves the stored settings, if they were ever seeded.
pub async fn get_settings<C>(db: &C) -> Result<Option<school_settings::Model>>
where
    C: ConnectionTrait,
{
    SchoolSettings::find_by_id(SETTINGS_ID)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves the stored settings, failing when they were never seeded.
pub async fn require_settings<C>(db: &C) -> Result<school_settings::Model>
where
    C: ConnectionTrait,
{
    get_settings(db).await?.ok_or(Error::NotFound {
        entity: "school settings",
        id: i64::from(SETTINGS_ID),
    })
}

/// Writes the settings row from configuration unless one already exists.
///
/// # Returns
/// The settings now in force (existing row or freshly seeded one).
#[instrument(skip(db, config))]
pub async fn seed_settings(
    db: &DatabaseConnection,
    config: &Config,
) -> Result<school_settings::Model> {
    if let Some(existing) = get_settings(db).await? {
        return Ok(existing);
    }

    let settings = school_settings::ActiveModel {
        id: Set(SETTINGS_ID),
        school_name: Set(config.school.name.trim().to_string()),
        current_academic_year: Set(config.school.current_academic_year),
        monthly_amount: Set(round_money(config.tuition.monthly_amount)),
        monthly_currency: Set(config.tuition.monthly_currency),
        enrollment_amount: Set(round_money(config.tuition.enrollment_amount)),
        enrollment_currency: Set(config.tuition.enrollment_currency),
        updated_at: Set(Utc::now().naive_utc()),
    };
    let seeded = settings.insert(db).await?;
    info!(
        year = seeded.current_academic_year,
        "School settings seeded from configuration"
    );
    Ok(seeded)
}

/// Applies an administrator's edit to the stored settings.
pub async fn update_settings(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    update: SettingsUpdate,
) -> Result<school_settings::Model> {
    let current = require_settings(db).await?;
    let mut active_model: school_settings::ActiveModel = current.into();

    if let Some(name) = update.school_name {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput {
                message: "School name cannot be empty".to_string(),
            });
        }
        active_model.school_name = Set(name.trim().to_string());
    }
    if let Some(year) = update.current_academic_year {
        active_model.current_academic_year = Set(year);
    }
    if let Some((amount, currency)) = update.monthly_fee {
        let amount = validate_fee(amount)?;
        if amount <= 0.0 {
            return Err(Error::InvalidAmount { amount });
        }
        active_model.monthly_amount = Set(amount);
        active_model.monthly_currency = Set(currency);
    }
    if let Some((amount, currency)) = update.enrollment_fee {
        active_model.enrollment_amount = Set(validate_fee(amount)?);
        active_model.enrollment_currency = Set(currency);
    }
    active_model.updated_at = Set(Utc::now().naive_utc());

    let updated = active_model.update(db).await?;
    feed.publish(ChangeEvent::updated(
        EntityKind::Settings,
        i64::from(SETTINGS_ID),
    ));
    Ok(updated)
}

fn validate_fee(amount: f64) -> Result<f64> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(round_money(amount))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_get_settings_none_before_seeding() -> Result<()> {
        let db = setup_test_db().await?;
        assert!(get_settings(&db).await?.is_none());
        assert!(matches!(
            require_settings(&db).await,
            Err(Error::NotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_seed_settings_from_config() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = seed_settings(&db, &test_config()).await?;

        assert_eq!(settings.current_academic_year, 2025);
        assert_eq!(settings.monthly_amount, 1000.0);
        assert_eq!(settings.monthly_currency, Currency::Nio);
        assert_eq!(settings.enrollment_amount, 300.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_seed_settings_never_overwrites() -> Result<()> {
        let db = setup_test_db().await?;
        let feed = ChangeFeed::default();
        seed_settings(&db, &test_config()).await?;
        update_settings(
            &db,
            &feed,
            SettingsUpdate {
                current_academic_year: Some(2026),
                ..Default::default()
            },
        )
        .await?;

        let settings = seed_settings(&db, &test_config()).await?;
        assert_eq!(settings.current_academic_year, 2026);

        let count = SchoolSettings::find().count(&db).await?;
        assert_eq!(count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_settings_changes_fees() -> Result<()> {
        let db = setup_test_db().await?;
        let feed = ChangeFeed::default();
        let mut rx = feed.subscribe();
        seed_settings(&db, &test_config()).await?;

        let updated = update_settings(
            &db,
            &feed,
            SettingsUpdate {
                monthly_fee: Some((1500.0, Currency::Nio)),
                enrollment_fee: Some((3000.0, Currency::Nio)),
                ..Default::default()
            },
        )
        .await?;

        assert_eq!(updated.monthly_amount, 1500.0);
        assert_eq!(updated.enrollment_amount, 3000.0);
        assert_eq!(TuitionPolicy::from(&updated).monthly_amount, 1500.0);
        assert_eq!(rx.try_recv().unwrap().entity, EntityKind::Settings);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_settings_rejects_negative_fee() -> Result<()> {
        let db = setup_test_db().await?;
        let feed = ChangeFeed::default();
        seed_settings(&db, &test_config()).await?;

        let result = update_settings(
            &db,
            &feed,
            SettingsUpdate {
                monthly_fee: Some((-1.0, Currency::Nio)),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));

        let settings = require_settings(&db).await?;
        assert_eq!(settings.monthly_amount, 1000.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_settings_rejects_free_tuition() -> Result<()> {
        let db = setup_test_db().await?;
        let feed = ChangeFeed::default();
        seed_settings(&db, &test_config()).await?;

        let result = update_settings(
            &db,
            &feed,
            SettingsUpdate {
                monthly_fee: Some((0.0, Currency::Nio)),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));
        assert_eq!(require_settings(&db).await?.monthly_amount, 1000.0);
        Ok(())
    }
}
