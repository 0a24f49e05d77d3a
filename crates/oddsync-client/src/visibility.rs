// Visibility recovery: coming back to the foreground forces a fresh push
// subscription and a full refresh, since anything pushed while hidden (or
// while the stream was silently dead) is lost.

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::connection::ConnectionManager;
use crate::reconcile::Refresher;

pub struct VisibilityPolicy {
    visible: bool,
    refresher: Refresher,
}

impl VisibilityPolicy {
    /// Starts out visible.
    pub fn new(refresher: Refresher) -> Self {
        VisibilityPolicy {
            visible: true,
            refresher,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Apply a visibility signal. Only a hidden -> visible transition does
    /// anything: the connection restarts whatever state it was in and every
    /// domain is refreshed once. That refresh also covers any outage the
    /// connection was in, so the reopened stream does not count as resumed.
    pub fn on_visibility_change(
        &mut self,
        visible: bool,
        connection: &mut ConnectionManager,
    ) -> Vec<JoinHandle<()>> {
        let was_visible = std::mem::replace(&mut self.visible, visible);

        match (was_visible, visible) {
            (false, true) => {
                info!(
                    state = ?connection.state(),
                    "Back in foreground, reconnecting and refreshing everything"
                );
                connection.restart_fresh();
                self.refresher.spawn_all()
            }
            (true, false) => {
                debug!("Moved to background");
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}
