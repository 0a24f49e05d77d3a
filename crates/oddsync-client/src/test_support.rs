// Fakes shared by the unit tests in this crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use oddsync_core::model::{Bet, BetStatus, LeaderboardUser, PredictionWithOdds, User};
use oddsync_core::protocol::Domain;

use crate::api::{ApiError, SyncBackend};
use crate::reconcile::NotificationSink;
use crate::transport::{PushStream, PushTransport, TransportError};

// ---------------------------------------------------------------------------
// FakeTransport
// ---------------------------------------------------------------------------

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scripted transport: each `open` pops the next outcome (default: succeed)
/// and tracks how many subscriptions are alive at once.
#[derive(Default)]
pub struct FakeTransport {
    pub script: Mutex<VecDeque<Result<(), TransportError>>>,
    pub open_delay: Duration,
    pub(crate) opens: AtomicUsize,
    pub(crate) live: Arc<AtomicUsize>,
    pub(crate) max_live: AtomicUsize,
    pub credentials: Mutex<Vec<Option<String>>>,
    pub(crate) feed: Mutex<Option<mpsc::UnboundedSender<Result<String, TransportError>>>>,
}

impl FakeTransport {
    pub fn with_script(outcomes: Vec<Result<(), TransportError>>) -> Self {
        FakeTransport {
            script: Mutex::new(outcomes.into()),
            ..Default::default()
        }
    }

    pub fn push(&self, item: Result<String, TransportError>) {
        let feed = self.feed.lock().unwrap();
        feed.as_ref().expect("no live stream").send(item).unwrap();
    }

    pub fn push_message(&self, raw: &str) {
        self.push(Ok(raw.to_string()));
    }

    pub fn close_current(&self) {
        self.feed.lock().unwrap().take();
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for FakeTransport {
    async fn open(&self, credential: Option<&str>) -> Result<PushStream, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.credentials
            .lock()
            .unwrap()
            .push(credential.map(str::to_string));
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }

        let outcome = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
        outcome?;

        let (tx, rx) = mpsc::unbounded_channel();
        *self.feed.lock().unwrap() = Some(tx);
        let now_live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(now_live, Ordering::SeqCst);
        let guard = LiveGuard(Arc::clone(&self.live));

        let stream = futures_util::stream::unfold((rx, guard), |(mut rx, guard)| async move {
            rx.recv().await.map(|item| (item, (rx, guard)))
        });
        Ok(stream.boxed())
    }
}

pub fn refused() -> Result<(), TransportError> {
    Err(TransportError::Network("connection refused".into()))
}

// ---------------------------------------------------------------------------
// FakeBackend
// ---------------------------------------------------------------------------

/// Backend with per-domain call counters. Bets responses are queued; once the
/// queue is empty `my_bets` returns an empty list.
#[derive(Default)]
pub struct FakeBackend {
    pub bets: Mutex<VecDeque<Result<Vec<Bet>, ApiError>>>,
    pub leaderboard: Vec<LeaderboardUser>,
    pub fetch_delay: Duration,
    pub(crate) me_calls: AtomicUsize,
    pub(crate) prediction_calls: AtomicUsize,
    pub(crate) leaderboard_calls: AtomicUsize,
    pub(crate) bet_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn queue_bets(&self, response: Result<Vec<Bet>, ApiError>) {
        self.bets.lock().unwrap().push_back(response);
    }

    pub fn calls(&self, domain: Domain) -> usize {
        let counter = match domain {
            Domain::Predictions => &self.prediction_calls,
            Domain::Leaderboard => &self.leaderboard_calls,
            Domain::Bets => &self.bet_calls,
            Domain::Session => &self.me_calls,
        };
        counter.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        Domain::ALL.iter().map(|&d| self.calls(d)).sum()
    }

    async fn pause(&self) {
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
    }
}

#[async_trait]
impl SyncBackend for FakeBackend {
    async fn me(&self) -> Result<User, ApiError> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(User {
            id: "u1".into(),
            name: "Ada".into(),
            admin: false,
            tokens: 100,
        })
    }

    async fn predictions(&self) -> Result<Vec<PredictionWithOdds>, ApiError> {
        self.prediction_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(Vec::new())
    }

    async fn my_bets(&self) -> Result<Vec<Bet>, ApiError> {
        self.bet_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.bets.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn leaderboard(&self) -> Result<Vec<LeaderboardUser>, ApiError> {
        self.leaderboard_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(self.leaderboard.clone())
    }
}

// ---------------------------------------------------------------------------
// RecordingSink and builders
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink(Mutex<Vec<u32>>);

impl NotificationSink for RecordingSink {
    fn notify(&self, intensity: u32) {
        self.0.lock().unwrap().push(intensity);
    }
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<u32> {
        self.0.lock().unwrap().clone()
    }
}

pub fn bet(id: &str, status: BetStatus, won_amount: Option<i64>) -> Bet {
    Bet {
        id: id.into(),
        created_at: "2026-03-01T12:00:00Z".into(),
        user_id: "u1".into(),
        prediction_id: "p1".into(),
        prediction_choice_id: "c1".into(),
        amount: 10,
        status,
        won_amount,
    }
}

pub fn row(id: &str, tokens: i64) -> LeaderboardUser {
    LeaderboardUser {
        id: id.into(),
        name: id.to_uppercase(),
        tokens,
        score: tokens,
        rank: 1,
        achievements: Vec::new(),
    }
}

pub fn http_error(status: u16, message: &str) -> ApiError {
    ApiError::Http {
        status,
        message: message.into(),
    }
}

/// Run spawned refresh tasks to completion.
pub async fn join_all(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        handle.await.unwrap();
    }
}
