// Domain stores: the latest snapshot of each reconcilable domain together
// with its loading flag and error slot, all observable through watch channels.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use oddsync_core::model::{Bet, LeaderboardUser, PredictionWithOdds, User};
use oddsync_core::protocol::Domain;

use crate::api::ApiError;

pub struct DomainStore<T> {
    domain: Domain,
    snapshot: watch::Sender<T>,
    error: watch::Sender<Option<String>>,
    loading: watch::Sender<bool>,
    /// Reconciliations currently showing the loading flag.
    slow_in_flight: AtomicUsize,
}

impl<T: Clone> DomainStore<T> {
    pub fn new(domain: Domain, initial: T) -> Self {
        DomainStore {
            domain,
            snapshot: watch::channel(initial).0,
            error: watch::channel(None).0,
            loading: watch::channel(false).0,
            slow_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn snapshot(&self) -> T {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.snapshot.subscribe()
    }

    pub fn error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    pub fn errors(&self) -> watch::Receiver<Option<String>> {
        self.error.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub fn loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    /// Fetch-and-replace.
    ///
    /// Clears the error slot, then awaits `fetch`. The loading flag only goes
    /// up if the fetch is still outstanding after `loading_delay`. On success
    /// the snapshot is replaced wholesale; on failure the previous snapshot
    /// stays and the error slot gets the message.
    pub async fn reconcile<F>(&self, fetch: F, loading_delay: Duration) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        self.error.send_if_modified(|slot| slot.take().is_some());

        tokio::pin!(fetch);
        let result = tokio::select! {
            biased;
            result = &mut fetch => result,
            _ = tokio::time::sleep(loading_delay) => {
                let _loading = LoadingGuard::raise(&self.slow_in_flight, &self.loading);
                fetch.await
            }
        };

        match result {
            Ok(fresh) => {
                self.snapshot.send_replace(fresh.clone());
                debug!(domain = %self.domain, "Snapshot replaced");
                Ok(fresh)
            }
            Err(err) => {
                warn!(domain = %self.domain, error = %err, "Refresh failed, keeping previous snapshot");
                self.error.send_replace(Some(err.to_string()));
                Err(err)
            }
        }
    }
}

impl DomainStore<Option<User>> {
    /// Overwrite the session's token balance if `user_id` is the session user.
    /// Returns whether anything changed.
    pub fn update_tokens(&self, user_id: &str, tokens: i64) -> bool {
        self.snapshot.send_if_modified(|session| match session {
            Some(user) if user.id == user_id && user.tokens != tokens => {
                user.tokens = tokens;
                true
            }
            _ => false,
        })
    }
}

/// Holds the loading flag up while at least one slow reconciliation runs.
struct LoadingGuard<'a> {
    count: &'a AtomicUsize,
    flag: &'a watch::Sender<bool>,
}

impl<'a> LoadingGuard<'a> {
    fn raise(count: &'a AtomicUsize, flag: &'a watch::Sender<bool>) -> Self {
        if count.fetch_add(1, Ordering::SeqCst) == 0 {
            flag.send_replace(true);
        }
        LoadingGuard { count, flag }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.flag.send_replace(false);
        }
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// Every store the engine keeps current.
pub struct Stores {
    pub predictions: DomainStore<Vec<PredictionWithOdds>>,
    pub leaderboard: DomainStore<Vec<LeaderboardUser>>,
    pub bets: DomainStore<Vec<Bet>>,
    pub session: DomainStore<Option<User>>,
}

impl Stores {
    pub fn new() -> Self {
        Stores {
            predictions: DomainStore::new(Domain::Predictions, Vec::new()),
            leaderboard: DomainStore::new(Domain::Leaderboard, Vec::new()),
            bets: DomainStore::new(Domain::Bets, Vec::new()),
            session: DomainStore::new(Domain::Session, None),
        }
    }

    /// Current error per domain, skipping domains with none.
    pub fn errors(&self) -> Vec<(Domain, String)> {
        [
            (Domain::Predictions, self.predictions.error()),
            (Domain::Bets, self.bets.error()),
            (Domain::Leaderboard, self.leaderboard.error()),
            (Domain::Session, self.session.error()),
        ]
        .into_iter()
        .filter_map(|(domain, error)| error.map(|e| (domain, e)))
        .collect()
    }
}

impl Default for Stores {
    fn default() -> Self {
        Self::new()
    }
}
