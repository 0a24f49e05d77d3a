// Sync engine: owns the connection manager, router and visibility policy,
// and drives all of them from one `tokio::select!` loop.
//
// Inputs:
// 1. Push subscription events (open / message / lost)
// 2. Visibility signals from the host
// 3. Commands (manual refresh, stop)

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use oddsync_core::config::Config;
use oddsync_core::wins::IntensityScale;

use crate::api::SyncBackend;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState};
use crate::reconcile::{BetReconciler, NotificationSink, Refresher};
use crate::router::EventRouter;
use crate::store::Stores;
use crate::transport::PushTransport;
use crate::visibility::VisibilityPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    /// Refresh every domain now.
    RefreshAll,
    /// Tear down and return from `run`.
    Stop,
}

/// Tunables the engine needs, usually taken from the loaded config.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub retry_delay: Duration,
    pub loading_delay: Duration,
    pub scale: IntensityScale,
    pub credential: Option<String>,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        EngineSettings {
            retry_delay: config.connection.retry_delay(),
            loading_delay: config.reconcile.loading_delay(),
            scale: config.celebration,
            credential: config.credentials.session_token.clone(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            retry_delay: Duration::from_millis(3000),
            loading_delay: Duration::from_millis(70),
            scale: IntensityScale::default(),
            credential: None,
        }
    }
}

pub struct SyncEngine {
    connection: ConnectionManager,
    router: EventRouter,
    visibility: VisibilityPolicy,
    refresher: Refresher,
    credential: Option<String>,
}

impl SyncEngine {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        backend: Arc<dyn SyncBackend>,
        sink: Arc<dyn NotificationSink>,
        settings: EngineSettings,
    ) -> Self {
        let stores = Arc::new(Stores::new());
        let refresher = Refresher::new(
            backend,
            stores,
            BetReconciler::new(settings.scale, sink),
            settings.loading_delay,
        );

        SyncEngine {
            connection: ConnectionManager::new(transport, settings.retry_delay),
            router: EventRouter::new(refresher.clone()),
            visibility: VisibilityPolicy::new(refresher.clone()),
            refresher,
            credential: settings.credential,
        }
    }

    pub fn stores(&self) -> Arc<Stores> {
        Arc::clone(self.refresher.stores())
    }

    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connection.connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Activate and run until `SyncCommand::Stop` arrives or the command
    /// channel closes. Activation refreshes every domain once, which also
    /// sets the win-detection baseline.
    pub async fn run(
        mut self,
        mut visibility_rx: mpsc::Receiver<bool>,
        mut cmd_rx: mpsc::Receiver<SyncCommand>,
    ) -> anyhow::Result<()> {
        info!("Sync engine started");
        self.refresher.spawn_all();
        self.connection.start(self.credential.clone());

        // Once the visibility channel closes, stop polling it so select!
        // never spins on a finished branch.
        let mut visibility_open = true;

        loop {
            tokio::select! {
                event = self.connection.next_event() => {
                    self.handle_connection_event(event);
                }

                signal = visibility_rx.recv(), if visibility_open => {
                    match signal {
                        Some(visible) => {
                            self.visibility.on_visibility_change(visible, &mut self.connection);
                        }
                        None => {
                            debug!("Visibility channel closed");
                            visibility_open = false;
                        }
                    }
                }

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SyncCommand::RefreshAll) => {
                            info!("Manual refresh requested");
                            self.refresher.spawn_all();
                        }
                        Some(SyncCommand::Stop) => {
                            info!("Stop requested");
                            break;
                        }
                        None => {
                            info!("Command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        self.connection.stop();
        info!("Sync engine stopped");
        Ok(())
    }

    fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened { resumed: true } => {
                info!("Push subscription recovered, refreshing everything");
                self.refresher.spawn_all();
            }
            ConnectionEvent::Opened { resumed: false } => {}
            ConnectionEvent::Message(raw) => {
                self.router.on_message(&raw);
            }
            // Already logged by the connection manager.
            ConnectionEvent::Lost(_) => {}
        }
    }
}
