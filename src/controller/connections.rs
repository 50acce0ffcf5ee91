//! Connects, disconnects and per-driver events

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::RaceControl;
use crate::Result;
use crate::registry::DisconnectOutcome;
use crate::standings;
use crate::types::{
    CarId, CarInfo, Collision, CollisionKind, CollisionWithCar, CollisionWithEnvironment,
    DriverGuid, EventType, LapCompleted, LiveTimingSnapshot, SessionCarInfo,
};

impl RaceControl {
    pub(super) fn connect(&self, info: &SessionCarInfo) {
        self.registry.connect(CarInfo::from(info), Utc::now());
    }

    /// Disconnect a driver and tear down its car's update lane.
    pub(super) fn disconnect(&self, car_id: CarId, guid: &DriverGuid) -> Result<DisconnectOutcome> {
        let outcome = self.registry.disconnect(car_id, guid)?;
        self.lanes.close(car_id);
        Ok(outcome)
    }

    pub(super) fn client_loaded(&self, car_id: CarId) -> Result<()> {
        let driver = self.registry.resolve_or_err(car_id, "client loaded")?;
        driver.lock().loaded_at = Some(Utc::now());
        debug!(car_id, "Client loaded");
        Ok(())
    }

    pub(super) fn collision_with_car(&self, collision: &CollisionWithCar) -> Result<()> {
        let driver = self.registry.resolve_or_err(collision.car_id, "collision with car")?;
        let other = self.registry.guid_for(collision.other_car_id);
        if other.is_none() {
            warn!(
                car_id = collision.car_id,
                other_car_id = collision.other_car_id,
                "Collision with unmapped car"
            );
        }

        let record = Collision::new(CollisionKind::Car, Utc::now(), other, collision.impact_speed);
        driver.lock().collisions.push(record);
        Ok(())
    }

    pub(super) fn collision_with_environment(&self, collision: &CollisionWithEnvironment) -> Result<()> {
        let driver = self.registry.resolve_or_err(collision.car_id, "collision with environment")?;
        let record = Collision::new(CollisionKind::Environment, Utc::now(), None, collision.impact_speed);
        driver.lock().collisions.push(record);
        Ok(())
    }

    /// Record a lap, then re-sort and recompute positions and splits.
    pub(super) fn lap_completed(&self, lap: &LapCompleted) -> Result<()> {
        let driver = self.registry.resolve_or_err(lap.car_id, "lap completed")?;
        let personal_best = standings::complete_lap(&mut driver.lock(), lap, Utc::now());
        debug!(car_id = lap.car_id, lap_time_ms = lap.lap_time_ms, cuts = lap.cuts, personal_best, "Lap completed");

        let session_type = self.session_type();
        self.registry
            .connected()
            .sort_with(|drivers| standings::update_positions_and_splits(session_type, drivers));
        Ok(())
    }

    /// Force-disconnect drivers silent for longer than the driver timeout.
    ///
    /// Waits for any event being dispatched, so a driver cannot reconnect
    /// between the scan and its eviction.
    pub async fn sweep_timeouts(&self) -> usize {
        self.sweep_timeouts_at(Utc::now()).await
    }

    /// [`sweep_timeouts`](Self::sweep_timeouts) against an explicit clock.
    pub async fn sweep_timeouts_at(&self, now: DateTime<Utc>) -> usize {
        let _dispatch = self.dispatch.lock().await;
        let timeout = chrono::Duration::from_std(self.config.driver_timeout)
            .unwrap_or(chrono::Duration::MAX);

        let mut stale = Vec::new();
        self.registry.connected().for_each(|driver| {
            if now.signed_duration_since(driver.last_activity()) > timeout {
                stale.push((driver.car_info.car_id, driver.guid().clone()));
            }
        });

        let mut evicted = 0;
        for (car_id, guid) in stale {
            match self.disconnect(car_id, &guid) {
                Ok(_) => {
                    info!(car_id, guid = %guid, "Driver timed out");
                    evicted += 1;
                }
                Err(e) => debug!(car_id, error = %e, "Timed out driver already gone"),
            }
        }

        if evicted > 0 {
            self.broadcast(EventType::ConnectionClosed);
        }
        evicted
    }

    /// Run [`source_stopped`](Self::source_stopped) once `done` fires.
    ///
    /// Dropping the sender without sending means shutdown, not a stopped server.
    pub fn watch_source_stopped(self: &Arc<Self>, done: oneshot::Receiver<()>) -> JoinHandle<()> {
        let controller = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let fired = tokio::select! {
                _ = cancel.cancelled() => false,
                result = done => result.is_ok(),
            };
            if !fired {
                return;
            }
            if let Some(controller) = controller.upgrade() {
                controller.source_stopped().await;
            }
        })
    }

    /// Persist every known driver, then disconnect everyone still connected.
    pub async fn source_stopped(&self) {
        info!("Race server stopped");

        match self.current_signature() {
            Some(signature) => {
                let snapshot =
                    LiveTimingSnapshot::new(signature, self.registry.all_drivers(), Utc::now());
                if let Err(e) = self.store.save(&snapshot).await {
                    warn!(error = %e, "Failed to save live timing snapshot");
                }
            }
            None => debug!("No session running, nothing to persist"),
        }

        let _dispatch = self.dispatch.lock().await;
        for (car_id, guid) in self.registry.connected_cars() {
            if let Err(e) = self.disconnect(car_id, &guid) {
                debug!(car_id, error = %e, "Driver already disconnected");
            }
        }
        self.lanes.close_all();
        self.stop_session_poll();
        self.broadcast(EventType::ConnectionClosed);
    }
}
