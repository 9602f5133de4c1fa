//! Synthetic structural-sensor feed, one periodic task per occupied project.
//!
//! The registry is an explicit object owned by the session server and
//! injected into handlers; timer handles are keyed by project id. At most
//! one live timer exists per project. Cancellation is idempotent — the last
//! member leaving, a disconnect race, and a server shutdown may all try to
//! cancel the same timer.
//!
//! Each tick picks one wall at random from the project's current geometry
//! and emits a stress factor in [0, 1) to the whole room.

use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::broadcast::RoomGroup;
use crate::protocol::ServerEvent;
use crate::storage::ProjectStore;

/// Default tick period.
pub const DEFAULT_TELEMETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Registry of per-project telemetry timers.
pub struct TelemetryRegistry {
    timers: Mutex<HashMap<Uuid, JoinHandle<()>>>,
    interval: Duration,
}

impl TelemetryRegistry {
    pub fn new(interval: Duration) -> Self {
        Self {
            timers: Mutex::new(HashMap::new()),
            interval,
        }
    }

    /// Start the timer for a project unless one is already live.
    pub async fn ensure_started(
        &self,
        project_id: Uuid,
        store: Arc<ProjectStore>,
        room: Arc<RoomGroup>,
    ) {
        let mut timers = self.timers.lock().await;
        if let Some(handle) = timers.get(&project_id) {
            if !handle.is_finished() {
                return;
            }
        }

        let interval = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // interval() fires immediately; consume the zeroth tick.
            ticker.tick().await;
            loop {
                ticker.tick().await;

                let project = match store.load_project(project_id) {
                    Ok(p) => p,
                    Err(e) => {
                        log::debug!("Telemetry tick skipped for {project_id}: {e}");
                        continue;
                    }
                };

                let event = {
                    let wall_ids = project.data.wall_ids();
                    if wall_ids.is_empty() {
                        continue;
                    }
                    let mut rng = rand::thread_rng();
                    let wall_id = wall_ids[rng.gen_range(0..wall_ids.len())].clone();
                    ServerEvent::IotDataUpdate {
                        wall_id,
                        stress_factor: rng.gen_range(0.0..1.0),
                    }
                };

                if let Err(e) = room.broadcast(&event, None) {
                    log::warn!("Telemetry broadcast failed for {project_id}: {e}");
                }
            }
        });

        timers.insert(project_id, handle);
        log::info!("Telemetry timer started for project {project_id}");
    }

    /// Cancel and deregister a project's timer. Idempotent.
    pub async fn cancel(&self, project_id: &Uuid) {
        if let Some(handle) = self.timers.lock().await.remove(project_id) {
            handle.abort();
            log::info!("Telemetry timer cancelled for project {project_id}");
        }
    }

    /// True if a live timer exists for the project.
    pub async fn is_active(&self, project_id: &Uuid) -> bool {
        self.timers
            .lock()
            .await
            .get(project_id)
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Number of live timers.
    pub async fn active_count(&self) -> usize {
        self.timers
            .lock()
            .await
            .values()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Cancel every timer (server shutdown).
    pub async fn cancel_all(&self) {
        let mut timers = self.timers.lock().await;
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }
}
