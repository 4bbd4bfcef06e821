//! Live dashboard - a cached [`DashboardSummary`] kept fresh by the change feed.
//!
//! The cache is only ever replaced wholesale with a summary recomputed from the
//! store. Notifications carry no data; a burst of them triggers one recompute.

use crate::{
    core::{
        events::ChangeEvent,
        report::{DashboardSummary, ReportScope, dashboard_summary},
    },
    errors::Result,
};
use chrono::{NaiveDate, Utc};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error, info, trace, warn};

/// Shared, refreshable dashboard view.
#[derive(Debug, Clone)]
pub struct LiveDashboard {
    scope: ReportScope,
    summary: Arc<RwLock<Option<DashboardSummary>>>,
}

impl LiveDashboard {
    /// Creates an empty view for `scope`; call [`Self::refresh`] to fill it.
    #[must_use]
    pub fn new(scope: ReportScope) -> Self {
        Self {
            scope,
            summary: Arc::new(RwLock::new(None)),
        }
    }

    /// Scope the view covers.
    #[must_use]
    pub const fn scope(&self) -> &ReportScope {
        &self.scope
    }

    /// Last computed summary, if any.
    pub async fn current(&self) -> Option<DashboardSummary> {
        self.summary.read().await.clone()
    }

    /// Recomputes the summary from the store and replaces the cached one.
    pub async fn refresh(&self, db: &DatabaseConnection, today: NaiveDate) -> Result<()> {
        let summary = dashboard_summary(db, &self.scope, today).await?;
        let mut cache_writer = self.summary.write().await;
        trace!(?summary, "Dashboard recomputed");
        *cache_writer = Some(summary);
        Ok(())
    }

    /// Waits for the next notification, drains any queued behind it, then refreshes once.
    ///
    /// # Returns
    /// `false` once the feed is closed and no more notifications will arrive.
    pub async fn refresh_on_change(
        &self,
        db: &DatabaseConnection,
        rx: &mut broadcast::Receiver<ChangeEvent>,
        today: NaiveDate,
    ) -> Result<bool> {
        match rx.recv().await {
            Ok(event) => trace!(?event, "Change received"),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Dashboard fell behind the change feed");
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(false),
        }

        let mut coalesced = 0_usize;
        loop {
            match rx.try_recv() {
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => coalesced += 1,
                Err(broadcast::error::TryRecvError::Empty) => break,
                Err(broadcast::error::TryRecvError::Closed) => {
                    self.refresh(db, today).await?;
                    return Ok(false);
                }
            }
        }
        if coalesced > 0 {
            debug!(coalesced, "Coalesced change notifications");
        }

        self.refresh(db, today).await?;
        Ok(true)
    }

    /// Keeps the view fresh until the feed closes. Refresh failures are logged and
    /// the loop carries on; the next notification retries.
    pub async fn run(&self, db: DatabaseConnection, mut rx: broadcast::Receiver<ChangeEvent>) {
        info!("Live dashboard started");
        loop {
            let today = Utc::now().date_naive();
            match self.refresh_on_change(&db, &mut rx, today).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => error!("Dashboard refresh failed: {}", e),
            }
        }
        info!("Live dashboard stopped");
    }
}
