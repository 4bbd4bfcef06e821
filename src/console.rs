//! Administrative console context.
//!
//! [`Console`] bundles what every screen of the administrative console needs: the
//! store connection, the change feed and the in-flight payment guard. Its methods
//! are the entry points a front end calls; they wire the guard and the feed around
//! the plain functions in [`crate::core`].

use crate::{
    core::{
        charge::{ChargeGenerationResult, generate_monthly_charges, mark_overdue_charges},
        dashboard::LiveDashboard,
        enrollment::NewEnrollment,
        events::{ChangeEvent, ChangeFeed},
        payment::{
            ChargePayment, ChargeReceipt, EnrollmentPayment, EnrollmentReceipt, InFlightPayments,
            InitialPayment, PaymentTarget, enroll_with_payment, record_charge_payment,
            record_enrollment_payment,
        },
        report::{DashboardSummary, ReportScope, dashboard_summary},
        settings::{TuitionPolicy, require_settings},
    },
    entities::{enrollment, payment},
    errors::{Error, Result},
};
use chrono::{Datelike, NaiveDate};
use sea_orm::DatabaseConnection;
use tokio::sync::broadcast;
use tracing::{debug, instrument};

/// Shared state of a console session.
///
/// Not `Clone`: share it behind an `Arc` when several tasks need it.
#[derive(Debug)]
pub struct Console {
    db: DatabaseConnection,
    feed: ChangeFeed,
    in_flight: InFlightPayments,
}

/// What a page-load refresh did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRefresh {
    /// Charge generation outcome; `None` when the billed year is not the running year
    pub charges: Option<ChargeGenerationResult>,
    /// Charges newly marked delinquent
    pub newly_overdue: u64,
}

impl Console {
    /// Wraps an open connection with a fresh change feed and guard.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            feed: ChangeFeed::default(),
            in_flight: InFlightPayments::default(),
        }
    }

    /// The store connection.
    #[must_use]
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// The change feed writers publish to.
    #[must_use]
    pub const fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Subscribes to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    /// Runs on every page load: backfills the running year's monthly charges and
    /// marks past-due ones delinquent.
    #[instrument(skip(self))]
    pub async fn refresh_page(&self, today: NaiveDate) -> Result<PageRefresh> {
        let settings = require_settings(&self.db).await?;
        let charges = if settings.current_academic_year == today.year() {
            Some(
                generate_monthly_charges(
                    &self.db,
                    &self.feed,
                    &TuitionPolicy::from(&settings),
                    settings.current_academic_year,
                    today.month(),
                )
                .await?,
            )
        } else {
            debug!(
                billed_year = settings.current_academic_year,
                "Billed year is not the running year, skipping charge generation"
            );
            None
        };
        let newly_overdue = mark_overdue_charges(&self.db, &self.feed, today).await?;
        Ok(PageRefresh {
            charges,
            newly_overdue,
        })
    }

    /// Records a tuition payment, refusing a second submission for the same charge
    /// while one is running.
    pub async fn pay_charge(&self, request: ChargePayment) -> Result<ChargeReceipt> {
        let _ticket = self.in_flight.begin(PaymentTarget::Charge(request.charge_id))?;
        record_charge_payment(&self.db, &self.feed, request).await
    }

    /// Records an enrollment fee payment, refusing a second submission for the same
    /// enrollment while one is running.
    pub async fn pay_enrollment(&self, request: EnrollmentPayment) -> Result<EnrollmentReceipt> {
        let student_id = request.student_id.ok_or(Error::NoStudentSelected)?;
        let _ticket = self.in_flight.begin(PaymentTarget::Enrollment {
            student_id,
            academic_year: request.academic_year,
        })?;
        record_enrollment_payment(&self.db, &self.feed, request).await
    }

    /// Enrolls a student at the configured enrollment fee, with an optional payment.
    pub async fn enroll(
        &self,
        student_id: i64,
        academic_year: i32,
        start_month: Option<u32>,
        initial: Option<InitialPayment>,
    ) -> Result<(enrollment::Model, Option<payment::Model>)> {
        let settings = require_settings(&self.db).await?;
        let _ticket = self.in_flight.begin(PaymentTarget::Enrollment {
            student_id,
            academic_year,
        })?;
        enroll_with_payment(
            &self.db,
            &self.feed,
            NewEnrollment {
                student_id,
                academic_year,
                total_amount: settings.enrollment_amount,
                currency: settings.enrollment_currency,
                start_month,
                enrolled_at: None,
            },
            initial,
        )
        .await
    }

    /// Computes the dashboard once.
    pub async fn dashboard(&self, scope: &ReportScope, today: NaiveDate) -> Result<DashboardSummary> {
        dashboard_summary(&self.db, scope, today).await
    }

    /// Creates a live dashboard for `scope`, filled and subscribed to the feed.
    ///
    /// Drive it with [`LiveDashboard::run`] or [`LiveDashboard::refresh_on_change`].
    pub async fn live_dashboard(
        &self,
        scope: ReportScope,
        today: NaiveDate,
    ) -> Result<(LiveDashboard, broadcast::Receiver<ChangeEvent>)> {
        let rx = self.subscribe();
        let dashboard = LiveDashboard::new(scope);
        dashboard.refresh(&self.db, today).await?;
        Ok((dashboard, rx))
    }
}
