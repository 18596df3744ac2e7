use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::protocol::ServerMessage;

use super::registry::ConnectionRegistry;
use super::rooms::RoomIndex;

/// Background sweep that evicts silent connections and keeps live ones
/// informed.
///
/// A connection is considered dead after two missed intervals of silence;
/// one missed heartbeat is absorbed without eviction. Survivors of each
/// sweep receive a `heartbeat` frame, and a failure to deliver that frame is
/// never itself an eviction reason. The loop only terminates on the shutdown
/// signal; per-connection errors are logged and the cycle continues.
pub struct HeartbeatMonitor {
    interval: Duration,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomIndex>,
}

/// Handle to a spawned monitor. Stopping is explicit and owned by the hub's
/// connect/disconnect paths.
pub struct MonitorHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn stop(self) {
        let _ = self.shutdown.send(());
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration, registry: Arc<ConnectionRegistry>, rooms: Arc<RoomIndex>) -> Self {
        Self {
            interval,
            registry,
            rooms,
        }
    }

    /// Spawn the monitor loop on the runtime.
    pub fn spawn(
        interval: Duration,
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomIndex>,
    ) -> MonitorHandle {
        let (shutdown, rx) = broadcast::channel(1);
        let monitor = Self::new(interval, registry, rooms);
        let task = tokio::spawn(monitor.run(rx));
        MonitorHandle { shutdown, task }
    }

    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut timer = tokio::time::interval(self.interval);
        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(interval_secs = self.interval.as_secs(), "Heartbeat monitor started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Heartbeat monitor received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.sweep().await;
                }
            }
        }

        tracing::info!("Heartbeat monitor stopped");
    }

    /// One monitor cycle: evict timed-out connections, then heartbeat the
    /// survivors.
    pub async fn sweep(&self) {
        let timeout = self.interval * 2;
        let stale = self.registry.find_stale(timeout).await;
        let evicted = stale.len();

        for connection_id in stale {
            tracing::info!(
                connection_id = %connection_id,
                timeout_secs = timeout.as_secs(),
                "Evicting silent connection"
            );
            self.evict(connection_id).await;
        }

        let heartbeat = ServerMessage::heartbeat().into();
        let survivors = self.registry.connection_ids();
        let mut failed = 0usize;
        for connection_id in &survivors {
            if !self.registry.send(*connection_id, &heartbeat).await {
                // Silence past the timeout is the only eviction trigger;
                // the reaping happens on a later cycle or mid-broadcast.
                failed += 1;
            }
        }

        if evicted > 0 || failed > 0 {
            tracing::debug!(
                evicted = evicted,
                survivors = survivors.len(),
                failed_heartbeats = failed,
                "Heartbeat sweep completed"
            );
        }
    }

    async fn evict(&self, connection_id: Uuid) {
        if let Some(handle) = self.registry.get(connection_id) {
            if let Some(room_id) = handle.room_id.clone() {
                self.rooms.leave(connection_id, &room_id).await;
            }
        }
        self.registry.unregister(connection_id);
    }
}
