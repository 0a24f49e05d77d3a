// Win detection: diff two bet snapshots to find bets that just resolved as
// won, and scale the combined payout into a celebration intensity.

use std::collections::HashMap;

use serde::Deserialize;

use crate::model::{Bet, BetStatus};

/// Bet id -> last observed status.
pub type StatusMap = HashMap<String, BetStatus>;

/// A bet that transitioned into `won` between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinEvent {
    pub id: String,
    pub won_amount: Option<i64>,
}

/// Build the id -> status baseline for the next diff.
pub fn status_map(bets: &[Bet]) -> StatusMap {
    bets.iter().map(|b| (b.id.clone(), b.status)).collect()
}

/// Find bets in `fresh` that are `won` now and were not `won` in `previous`.
///
/// `previous` is `None` on a cold start (no baseline yet), which never yields
/// wins: whatever is already won at activation was won before we were
/// watching. Once a baseline exists, a bet missing from it counts as not won.
pub fn detect_wins(previous: Option<&StatusMap>, fresh: &[Bet]) -> Vec<WinEvent> {
    let Some(previous) = previous else {
        return Vec::new();
    };

    fresh
        .iter()
        .filter(|bet| bet.status == BetStatus::Won)
        .filter(|bet| previous.get(&bet.id) != Some(&BetStatus::Won))
        .map(|bet| WinEvent {
            id: bet.id.clone(),
            won_amount: bet.won_amount,
        })
        .collect()
}

/// Combined payout of a batch of wins. Missing amounts count as zero.
pub fn total_won(wins: &[WinEvent]) -> i64 {
    wins.iter().filter_map(|w| w.won_amount).sum()
}

// ---------------------------------------------------------------------------
// Intensity scaling
// ---------------------------------------------------------------------------

/// Linear map from a total payout to a notification intensity, clamped at
/// both ends.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct IntensityScale {
    pub floor_amount: i64,
    pub ceiling_amount: i64,
    pub floor_intensity: u32,
    pub ceiling_intensity: u32,
}

impl Default for IntensityScale {
    fn default() -> Self {
        IntensityScale {
            floor_amount: 10,
            ceiling_amount: 300,
            floor_intensity: 30,
            ceiling_intensity: 200,
        }
    }
}

impl IntensityScale {
    pub fn intensity(&self, total_won: i64) -> u32 {
        let floor = f64::from(self.floor_intensity);
        let ceiling = f64::from(self.ceiling_intensity);
        let span = (self.ceiling_amount - self.floor_amount) as f64;
        if span <= 0.0 {
            return self.floor_intensity;
        }

        let fraction = (total_won - self.floor_amount) as f64 / span;
        let raw = floor + fraction * (ceiling - floor);
        raw.clamp(floor, ceiling).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bet(id: &str, status: BetStatus, won_amount: Option<i64>) -> Bet {
        Bet {
            id: id.into(),
            created_at: String::new(),
            user_id: "u1".into(),
            prediction_id: "p1".into(),
            prediction_choice_id: "c1".into(),
            amount: 10,
            status,
            won_amount,
        }
    }

    fn ids(wins: &[WinEvent]) -> Vec<&str> {
        let mut ids: Vec<&str> = wins.iter().map(|w| w.id.as_str()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn cold_start_never_reports_wins() {
        let fresh = vec![
            bet("a", BetStatus::Won, Some(100)),
            bet("b", BetStatus::Won, Some(5)),
        ];
        assert!(detect_wins(None, &fresh).is_empty());
    }

    #[test]
    fn only_transitions_into_won_are_reported() {
        let previous = status_map(&[
            bet("A", BetStatus::Pending, None),
            bet("B", BetStatus::Won, Some(20)),
            bet("C", BetStatus::Lost, None),
        ]);
        let fresh = vec![
            bet("A", BetStatus::Won, Some(30)),
            bet("B", BetStatus::Won, Some(20)),
            bet("C", BetStatus::Won, Some(40)),
        ];

        let wins = detect_wins(Some(&previous), &fresh);
        assert_eq!(ids(&wins), vec!["A", "C"]);
        assert_eq!(total_won(&wins), 70);
    }

    #[test]
    fn bet_unseen_in_baseline_counts_once_baseline_exists() {
        let previous = status_map(&[bet("A", BetStatus::Pending, None)]);
        let fresh = vec![
            bet("A", BetStatus::Pending, None),
            bet("N", BetStatus::Won, Some(12)),
        ];
        assert_eq!(ids(&detect_wins(Some(&previous), &fresh)), vec!["N"]);

        // An empty baseline is still a baseline.
        let empty = StatusMap::new();
        assert_eq!(ids(&detect_wins(Some(&empty), &fresh)), vec!["N"]);
    }

    #[test]
    fn lost_and_void_transitions_are_not_wins() {
        let previous = status_map(&[
            bet("A", BetStatus::Pending, None),
            bet("B", BetStatus::Pending, None),
        ]);
        let fresh = vec![
            bet("A", BetStatus::Lost, None),
            bet("B", BetStatus::Void, None),
        ];
        assert!(detect_wins(Some(&previous), &fresh).is_empty());
    }

    #[test]
    fn missing_won_amount_contributes_zero() {
        let wins = vec![
            WinEvent { id: "a".into(), won_amount: None },
            WinEvent { id: "b".into(), won_amount: Some(25) },
        ];
        assert_eq!(total_won(&wins), 25);
    }

    #[test]
    fn intensity_matches_reference_points() {
        let scale = IntensityScale::default();
        assert_eq!(scale.intensity(10), 30);
        assert_eq!(scale.intensity(300), 200);
        assert_eq!(scale.intensity(155), 115);
    }

    #[test]
    fn intensity_clamps_outside_range() {
        let scale = IntensityScale::default();
        assert_eq!(scale.intensity(5), 30);
        assert_eq!(scale.intensity(0), 30);
        assert_eq!(scale.intensity(-40), 30);
        assert_eq!(scale.intensity(1000), 200);
    }

    #[test]
    fn intensity_rounds_to_nearest() {
        let scale = IntensityScale::default();
        // 30 + (11 - 10) / 290 * 170 = 30.586...
        assert_eq!(scale.intensity(11), 31);
        // 30 + (20 - 10) / 290 * 170 = 35.862...
        assert_eq!(scale.intensity(20), 36);
    }

    #[test]
    fn degenerate_scale_falls_back_to_floor() {
        let scale = IntensityScale {
            floor_amount: 50,
            ceiling_amount: 50,
            floor_intensity: 30,
            ceiling_intensity: 200,
        };
        assert_eq!(scale.intensity(500), 30);
    }
}
