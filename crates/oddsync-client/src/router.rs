// Event router: turns raw push payloads into refresh tasks.

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use oddsync_core::protocol::{domains_for, InboundEvent};

use crate::reconcile::Refresher;

pub struct EventRouter {
    refresher: Refresher,
}

impl EventRouter {
    pub fn new(refresher: Refresher) -> Self {
        EventRouter { refresher }
    }

    /// Dispatch one push payload. Spawns the refreshes it asks for and
    /// returns immediately; a payload that does not parse is dropped.
    pub fn on_message(&self, raw: &str) -> Vec<JoinHandle<()>> {
        let event = match InboundEvent::parse(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, raw, "Dropping malformed push message");
                return Vec::new();
            }
        };

        let domains = domains_for(event.topic);
        if domains.is_empty() {
            debug!(topic = ?event.topic, "Ignoring push message with no handler");
            return Vec::new();
        }

        debug!(
            topic = ?event.topic,
            subject = event.subject_user_id.as_deref().unwrap_or("-"),
            ?domains,
            "Push message received"
        );
        self.refresher.spawn(domains)
    }
}
