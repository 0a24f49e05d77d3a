// Wire models for the state the backend owns: bets, predictions with odds,
// the leaderboard, and the signed-in user's profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Bets
// ---------------------------------------------------------------------------

/// Lifecycle of a single bet. The backend spells the unresolved and refunded
/// states `placed` and `voided`; both spellings are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BetStatus {
    #[serde(rename = "pending", alias = "placed")]
    Pending,
    #[serde(rename = "won")]
    Won,
    #[serde(rename = "lost")]
    Lost,
    #[serde(rename = "void", alias = "voided")]
    Void,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub prediction_id: String,
    #[serde(default)]
    pub prediction_choice_id: String,
    pub amount: i64,
    pub status: BetStatus,
    #[serde(default)]
    pub won_amount: Option<i64>,
}

impl Bet {
    /// Parsed creation time, `None` when the backend sent something that is
    /// not RFC 3339.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Bets ordered newest first. Bets with an unparseable timestamp go last,
/// keeping their relative order.
pub fn newest_first(bets: &[Bet]) -> Vec<Bet> {
    let mut sorted = bets.to_vec();
    sorted.sort_by(|a, b| match (a.created_at(), b.created_at()) {
        (Some(ta), Some(tb)) => tb.cmp(&ta),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    sorted
}

/// The caller's bets on one prediction.
pub fn bets_for_prediction<'a>(bets: &'a [Bet], prediction_id: &str) -> Vec<&'a Bet> {
    bets.iter()
        .filter(|b| b.prediction_id == prediction_id)
        .collect()
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    /// Bets can still be placed.
    Open,
    /// Betting closed, outcome not decided yet.
    Closed,
    /// Outcome decided and winners paid out.
    Decided,
    /// Invalidated; every bet refunded.
    Void,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionChoice {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    #[serde(default)]
    pub created_at: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub closes_at: String,
    #[serde(default)]
    pub choices: Vec<PredictionChoice>,
    #[serde(default)]
    pub winning_choice_id: String,
    #[serde(default)]
    pub odds_visible_before_bet: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionChoiceOdds {
    pub prediction_choice_id: String,
    pub tokens_placed: i64,
    pub bets_placed: u32,
    /// Payout multiplier in basis points (100 = 1x, 250 = 2.5x). Zero when
    /// nobody has bet on this choice yet.
    pub odds_basis_points: i64,
}

impl PredictionChoiceOdds {
    /// Payout multiplier, or `None` before anyone has bet on the choice.
    pub fn multiplier(&self) -> Option<f64> {
        (self.odds_basis_points > 0).then(|| self.odds_basis_points as f64 / 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOdds {
    pub total_tokens_placed: i64,
    pub total_bets_placed: u32,
    #[serde(default)]
    pub choices: Vec<PredictionChoiceOdds>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionWithOdds {
    pub prediction: Prediction,
    pub odds: PredictionOdds,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// The signed-in user's own profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub admin: bool,
    pub tokens: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardUser {
    pub id: String,
    pub name: String,
    pub tokens: i64,
    #[serde(default)]
    pub score: i64,
    pub rank: u32,
    #[serde(default)]
    pub achievements: Vec<String>,
}
