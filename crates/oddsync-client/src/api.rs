// REST backend the stores pull fresh state from.
//
// Push messages never carry data; every refresh ends up here.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use oddsync_core::model::{Bet, LeaderboardUser, PredictionWithOdds, User};

#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response. `message` is what the backend put in its `error`
    /// field, or `HTTP <status>` when the body had none.
    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
}

// ---------------------------------------------------------------------------
// SyncBackend
// ---------------------------------------------------------------------------

/// Fetch operations for every reconcilable domain.
#[async_trait]
pub trait SyncBackend: Send + Sync {
    /// The session's own profile.
    async fn me(&self) -> Result<User, ApiError>;
    async fn predictions(&self) -> Result<Vec<PredictionWithOdds>, ApiError>;
    async fn my_bets(&self) -> Result<Vec<Bet>, ApiError>;
    async fn leaderboard(&self) -> Result<Vec<LeaderboardUser>, ApiError>;
}

// ---------------------------------------------------------------------------
// HttpBackend
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// `SyncBackend` over the backend's JSON API, authenticated with a bearer
/// session token when one is present.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(http: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            http,
            base_url: format!("{}/api", base_url.trim_end_matches('/')),
            token,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "GET");

        let mut request = self.http.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) if !body.error.is_empty() => body.error,
                _ => format!("HTTP {}", status.as_u16()),
            };
            return Err(ApiError::Http {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl SyncBackend for HttpBackend {
    async fn me(&self) -> Result<User, ApiError> {
        self.get_json("/me").await
    }

    async fn predictions(&self) -> Result<Vec<PredictionWithOdds>, ApiError> {
        self.get_json("/predictions").await
    }

    async fn my_bets(&self) -> Result<Vec<Bet>, ApiError> {
        self.get_json("/my-bets").await
    }

    async fn leaderboard(&self) -> Result<Vec<LeaderboardUser>, ApiError> {
        self.get_json("/leaderboard").await
    }
}
