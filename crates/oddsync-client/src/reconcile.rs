// Reconciliation: pull fresh state for a domain and swap it into its store.
// Bets additionally get diffed against the last snapshot to find new wins.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use oddsync_core::model::{Bet, LeaderboardUser};
use oddsync_core::protocol::Domain;
use oddsync_core::wins::{detect_wins, status_map, total_won, IntensityScale, StatusMap, WinEvent};

use crate::api::{ApiError, SyncBackend};
use crate::store::{DomainStore, Stores};

/// Where celebration requests go.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, intensity: u32);
}

/// Sink that only logs. Used when nothing richer is attached.
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, intensity: u32) {
        info!(intensity, "New winning bets");
    }
}

/// Outcome of one bets reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub snapshot: Vec<Bet>,
    pub new_wins: Vec<WinEvent>,
}

// ---------------------------------------------------------------------------
// BetReconciler
// ---------------------------------------------------------------------------

/// Owns the win-detection baseline. Nothing else mutates it.
pub struct BetReconciler {
    /// `None` until the first successful fetch after activation.
    baseline: Mutex<Option<StatusMap>>,
    scale: IntensityScale,
    sink: Arc<dyn NotificationSink>,
}

impl BetReconciler {
    pub fn new(scale: IntensityScale, sink: Arc<dyn NotificationSink>) -> Self {
        BetReconciler {
            baseline: Mutex::new(None),
            scale,
            sink,
        }
    }

    pub async fn has_baseline(&self) -> bool {
        self.baseline.lock().await.is_some()
    }

    /// Fetch bets, replace the store snapshot, and report bets that turned
    /// `won` since the previous snapshot. A failed fetch leaves the baseline
    /// exactly as it was.
    pub async fn reconcile(
        &self,
        backend: &dyn SyncBackend,
        store: &DomainStore<Vec<Bet>>,
        loading_delay: Duration,
    ) -> Result<Reconciliation, ApiError> {
        let fresh = store.reconcile(backend.my_bets(), loading_delay).await?;

        let new_wins = {
            let mut baseline = self.baseline.lock().await;
            let wins = detect_wins(baseline.as_ref(), &fresh);
            *baseline = Some(status_map(&fresh));
            wins
        };

        if !new_wins.is_empty() {
            let total = total_won(&new_wins);
            let intensity = self.scale.intensity(total);
            info!(count = new_wins.len(), total, intensity, "Detected newly won bets");
            self.sink.notify(intensity);
        }

        Ok(Reconciliation {
            snapshot: fresh,
            new_wins,
        })
    }
}

// ---------------------------------------------------------------------------
// Refresher
// ---------------------------------------------------------------------------

/// Runs reconciliations per domain. Cheap to clone; every clone shares the
/// same stores and win baseline.
#[derive(Clone)]
pub struct Refresher {
    inner: Arc<RefresherInner>,
}

struct RefresherInner {
    backend: Arc<dyn SyncBackend>,
    stores: Arc<Stores>,
    bets: BetReconciler,
    loading_delay: Duration,
}

impl Refresher {
    pub fn new(
        backend: Arc<dyn SyncBackend>,
        stores: Arc<Stores>,
        bets: BetReconciler,
        loading_delay: Duration,
    ) -> Self {
        Refresher {
            inner: Arc::new(RefresherInner {
                backend,
                stores,
                bets,
                loading_delay,
            }),
        }
    }

    pub fn stores(&self) -> &Arc<Stores> {
        &self.inner.stores
    }

    pub fn bets(&self) -> &BetReconciler {
        &self.inner.bets
    }

    /// Reconcile one domain. Failures are already recorded in the domain's
    /// store by the time this returns.
    pub async fn refresh(&self, domain: Domain) -> Result<(), ApiError> {
        let inner = &*self.inner;
        let backend = inner.backend.as_ref();
        let stores = &inner.stores;
        let delay = inner.loading_delay;

        match domain {
            Domain::Predictions => {
                let fresh = stores.predictions.reconcile(backend.predictions(), delay).await?;
                debug!(count = fresh.len(), "Predictions refreshed");
            }
            Domain::Bets => {
                let outcome = inner.bets.reconcile(backend, &stores.bets, delay).await?;
                debug!(
                    count = outcome.snapshot.len(),
                    new_wins = outcome.new_wins.len(),
                    "Bets refreshed"
                );
            }
            Domain::Leaderboard => {
                let rows = stores.leaderboard.reconcile(backend.leaderboard(), delay).await?;
                debug!(count = rows.len(), "Leaderboard refreshed");
                self.sync_session_tokens(&rows);
            }
            Domain::Session => {
                let user = stores
                    .session
                    .reconcile(async { backend.me().await.map(Some) }, delay)
                    .await?;
                debug!(user = ?user.as_ref().map(|u| &u.id), "Session refreshed");
            }
        }
        Ok(())
    }

    /// Spawn one independent refresh task per domain and return right away.
    pub fn spawn(&self, domains: &[Domain]) -> Vec<JoinHandle<()>> {
        domains
            .iter()
            .map(|&domain| {
                let this = self.clone();
                tokio::spawn(async move {
                    // The store already holds the error for display.
                    let _ = this.refresh(domain).await;
                })
            })
            .collect()
    }

    pub fn spawn_all(&self) -> Vec<JoinHandle<()>> {
        self.spawn(&Domain::ALL)
    }

    fn sync_session_tokens(&self, rows: &[LeaderboardUser]) {
        let session = &self.inner.stores.session;
        let Some(user_id) = session.snapshot().map(|u| u.id) else {
            return;
        };
        if let Some(row) = rows.iter().find(|row| row.id == user_id) {
            if session.update_tokens(&row.id, row.tokens) {
                debug!(tokens = row.tokens, "Session balance updated from leaderboard");
            }
        }
    }
}
