//! Proactive access token renewal.
//!
//! While the session is authenticated a periodic check refreshes the
//! access token before it expires and forces a logout when it no longer
//! can.

use crate::claims::{decode_claims, now_millis};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// What the scheduler needs from the session.
#[async_trait]
pub trait RefreshDriver: Send + Sync {
    fn access_token(&self) -> Option<String>;

    /// Returns whether a new access token was obtained.
    async fn refresh(&self) -> bool;

    async fn force_logout(&self);
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Period of the expiry check.
    pub check_interval: Duration,
    /// Refresh at least this often, whatever the token says.
    pub proactive_interval: Duration,
    /// Refresh when expiry is closer than this.
    pub expiry_lead: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            proactive_interval: Duration::from_secs(14 * 60),
            expiry_lead: Duration::from_secs(5 * 60),
        }
    }
}

/// Result of one periodic check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No access token; logged out.
    NoToken,
    /// Token could not be decoded; logged out.
    CorruptToken,
    RefreshedExpired,
    /// Token expired and could not be renewed; logged out.
    ExpiredRefreshFailed,
    Refreshed,
    /// Proactive refresh failed. The session is kept until the token
    /// actually expires.
    RefreshFailed,
    Fresh,
}

impl TickOutcome {
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            TickOutcome::NoToken | TickOutcome::CorruptToken | TickOutcome::ExpiredRefreshFailed
        )
    }
}

struct Inner {
    driver: Arc<dyn RefreshDriver>,
    config: SchedulerConfig,
    /// Last successful proactive refresh, or activation.
    last_refresh: Mutex<Instant>,
}

impl Inner {
    async fn on_activate(&self) {
        *self.last_refresh.lock() = Instant::now();

        let Some(claims) = self.driver.access_token().as_deref().and_then(decode_claims) else {
            return;
        };
        if claims.expires_within(self.config.expiry_lead, now_millis()) {
            info!(expires_at = claims.expires_at, "Token expiring soon, refreshing on activation");
            let refreshed = self.driver.refresh().await;
            debug!(refreshed, "Activation refresh finished");
            *self.last_refresh.lock() = Instant::now();
        }
    }

    async fn tick(&self) -> TickOutcome {
        let Some(token) = self.driver.access_token() else {
            warn!("No access token while authenticated, logging out");
            self.driver.force_logout().await;
            return TickOutcome::NoToken;
        };

        let Some(claims) = decode_claims(&token) else {
            warn!("Access token could not be decoded, logging out");
            self.driver.force_logout().await;
            return TickOutcome::CorruptToken;
        };

        let now = now_millis();
        if claims.is_expired(now) {
            info!(expires_at = claims.expires_at, "Access token expired, refreshing");
            if self.driver.refresh().await {
                return TickOutcome::RefreshedExpired;
            }
            warn!("Refresh of expired token failed, logging out");
            self.driver.force_logout().await;
            return TickOutcome::ExpiredRefreshFailed;
        }

        let since_refresh = self.last_refresh.lock().elapsed();
        if since_refresh >= self.config.proactive_interval
            || claims.expires_within(self.config.expiry_lead, now)
        {
            debug!(
                since_refresh_secs = since_refresh.as_secs(),
                expires_at = claims.expires_at,
                "Refreshing access token proactively"
            );
            if self.driver.refresh().await {
                *self.last_refresh.lock() = Instant::now();
                return TickOutcome::Refreshed;
            }
            warn!("Proactive refresh failed, keeping session until expiry");
            return TickOutcome::RefreshFailed;
        }

        TickOutcome::Fresh
    }
}

/// Runs the periodic check while active.
pub struct TokenRefreshScheduler {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TokenRefreshScheduler {
    pub fn new(driver: Arc<dyn RefreshDriver>, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                driver,
                config,
                last_refresh: Mutex::new(Instant::now()),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Start the periodic check. No-op while already active.
    pub fn activate(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let inner = self.inner.clone();
        *task = Some(tokio::spawn(async move {
            inner.on_activate().await;

            let period = inner.config.check_interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let outcome = inner.tick().await;
                debug!(outcome = ?outcome, "Token check");
                if outcome.ends_session() {
                    info!(outcome = ?outcome, "Session ended, stopping token refresh");
                    break;
                }
            }
        }));
        debug!(
            check_interval_secs = self.inner.config.check_interval.as_secs(),
            "Token refresh scheduler activated"
        );
    }

    /// Stop the periodic check. A refresh already in flight is abandoned.
    pub fn deactivate(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!("Token refresh scheduler deactivated");
        }
    }

    /// Run one check immediately.
    pub async fn tick(&self) -> TickOutcome {
        self.inner.tick().await
    }

    /// Activate while `authenticated` is true and deactivate otherwise.
    pub fn bind(self: &Arc<Self>, mut authenticated: watch::Receiver<bool>) -> JoinHandle<()> {
        let scheduler = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let active = *authenticated.borrow_and_update();
                let Some(this) = scheduler.upgrade() else {
                    break;
                };
                if active {
                    this.activate();
                } else {
                    this.deactivate();
                }
                drop(this);

                if authenticated.changed().await.is_err() {
                    if let Some(this) = scheduler.upgrade() {
                        this.deactivate();
                    }
                    break;
                }
            }
        })
    }
}

impl Drop for TokenRefreshScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}
