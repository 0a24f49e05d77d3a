// Push-stream message types and the topic-to-domain dispatch table.
//
// Every message the backend pushes is a change hint: it names what changed,
// never the new value. Receivers pull fresh state for the affected domains.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// What a push message says has changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Predictions,
    Leaderboard,
    Bets,
    /// Any `type` this client does not know about (e.g. `achievement`).
    #[serde(other)]
    Unknown,
}

/// A single decoded push message.
///
/// Wire shape: `{ "type": "bets", "user_id": "u_123" }` where `user_id` is
/// only present for user-scoped events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type")]
    pub topic: Topic,
    #[serde(default, rename = "user_id", skip_serializing_if = "Option::is_none")]
    pub subject_user_id: Option<String>,
}

impl InboundEvent {
    /// Decode a raw push payload.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

// ---------------------------------------------------------------------------
// Domains
// ---------------------------------------------------------------------------

/// A locally cached slice of server state that can be reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Predictions,
    Leaderboard,
    Bets,
    /// The signed-in user's own profile (token balance).
    Session,
}

impl Domain {
    /// Every domain, in the order a full refresh fetches them.
    pub const ALL: [Domain; 4] = [
        Domain::Predictions,
        Domain::Bets,
        Domain::Leaderboard,
        Domain::Session,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Predictions => "predictions",
            Domain::Leaderboard => "leaderboard",
            Domain::Bets => "bets",
            Domain::Session => "session",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which domains must be refreshed when a message with `topic` arrives.
///
/// A leaderboard change is almost always a token-balance change, so it also
/// refreshes the session profile.
pub fn domains_for(topic: Topic) -> &'static [Domain] {
    match topic {
        Topic::Predictions => &[Domain::Predictions],
        Topic::Leaderboard => &[Domain::Session, Domain::Leaderboard],
        Topic::Bets => &[Domain::Bets],
        Topic::Unknown => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_broadcast_event() {
        let event = InboundEvent::parse(r#"{"type":"predictions"}"#).unwrap();
        assert_eq!(event.topic, Topic::Predictions);
        assert!(event.subject_user_id.is_none());
    }

    #[test]
    fn parses_user_scoped_event() {
        let event = InboundEvent::parse(r#"{"type":"bets","user_id":"u_42"}"#).unwrap();
        assert_eq!(event.topic, Topic::Bets);
        assert_eq!(event.subject_user_id.as_deref(), Some("u_42"));
    }

    #[test]
    fn unknown_type_decodes_to_unknown_topic() {
        let event =
            InboundEvent::parse(r#"{"type":"achievement","user_id":"u_1","achievement_id":"x"}"#)
                .unwrap();
        assert_eq!(event.topic, Topic::Unknown);
        assert!(domains_for(event.topic).is_empty());
    }

    #[test]
    fn rejects_non_json_and_missing_type() {
        assert!(InboundEvent::parse("not json").is_err());
        assert!(InboundEvent::parse(r#"{"user_id":"u_1"}"#).is_err());
        assert!(InboundEvent::parse(r#"{"type":7}"#).is_err());
    }

    #[test]
    fn leaderboard_refreshes_session_and_leaderboard() {
        assert_eq!(
            domains_for(Topic::Leaderboard),
            &[Domain::Session, Domain::Leaderboard]
        );
        assert_eq!(domains_for(Topic::Bets), &[Domain::Bets]);
        assert_eq!(domains_for(Topic::Predictions), &[Domain::Predictions]);
    }

    #[test]
    fn full_refresh_covers_every_domain_once() {
        let mut all = Domain::ALL.to_vec();
        all.sort_by_key(|d| d.as_str());
        all.dedup();
        assert_eq!(all.len(), 4);
    }
}
