//! Per-car update lanes
//!
//! Position and velocity telemetry arrives far more often than anything else.
//! Each car id gets its own task fed by an unbounded queue, so updates for one
//! car are applied strictly in order while different cars proceed in
//! parallel with each other and with event dispatch.
//!
//! Lanes are created on a car's first update and torn down on disconnect by
//! dropping the queue's sender. Each queued update carries the guid of the
//! driver in the car when it was sent, so anything still draining after a
//! disconnect never lands on the car's next occupant.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::broadcast::BroadcastHub;
use crate::registry::DriverRegistry;
use crate::types::{CarId, CarUpdate, Driver, DriverGuid, EventType};
use crate::{RaceControlError, Result};

/// Apply one telemetry sample to the driver in the car.
pub fn apply_car_update(driver: &mut Driver, update: &CarUpdate, now: DateTime<Utc>) {
    let speed = update.velocity.horizontal_magnitude();
    let car = driver.ensure_current_car(now);
    if speed > car.top_speed_this_lap {
        car.top_speed_this_lap = speed;
    }
    driver.last_seen = Some(now);
    driver.last_pos = update.pos;
}

/// The set of live per-car lanes.
pub struct CarLanes {
    registry: Arc<DriverRegistry>,
    hub: Arc<BroadcastHub>,
    senders: Mutex<HashMap<CarId, mpsc::UnboundedSender<(DriverGuid, CarUpdate)>>>,
    cancel: CancellationToken,
}

impl CarLanes {
    pub fn new(registry: Arc<DriverRegistry>, hub: Arc<BroadcastHub>, cancel: CancellationToken) -> Self {
        Self { registry, hub, senders: Mutex::new(HashMap::new()), cancel }
    }

    /// Queue an update on its car's lane.
    ///
    /// Updates for unmapped cars are rejected here, before a lane is created.
    pub fn dispatch(&self, update: CarUpdate) -> Result<()> {
        let car_id = update.car_id;
        let Some(guid) = self.registry.guid_for(car_id) else {
            return Err(RaceControlError::unknown_car(car_id, "car update"));
        };

        let mut senders = self.senders.lock();
        let queued = match senders.get(&car_id) {
            Some(sender) => match sender.send((guid, update)) {
                Ok(()) => return Ok(()),
                // Lane task is gone (shutdown), start over.
                Err(mpsc::error::SendError(queued)) => queued,
            },
            None => (guid, update),
        };

        let sender = self.spawn_lane(car_id);
        let result = sender
            .send(queued)
            .map_err(|_| RaceControlError::unknown_car(car_id, "car update lane closed"));
        senders.insert(car_id, sender);
        result
    }

    /// Tear down the lane for `car_id`. Queued updates still drain.
    pub fn close(&self, car_id: CarId) -> bool {
        let closed = self.senders.lock().remove(&car_id).is_some();
        if closed {
            debug!(car_id, "Closed car update lane");
        }
        closed
    }

    pub fn close_all(&self) {
        self.senders.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.senders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spawn_lane(&self, car_id: CarId) -> mpsc::UnboundedSender<(DriverGuid, CarUpdate)> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let registry = self.registry.clone();
        let hub = self.hub.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            run_lane(car_id, receiver, registry, hub, cancel).await;
        });
        debug!(car_id, "Opened car update lane");
        sender
    }
}

async fn run_lane(
    car_id: CarId,
    mut updates: mpsc::UnboundedReceiver<(DriverGuid, CarUpdate)>,
    registry: Arc<DriverRegistry>,
    hub: Arc<BroadcastHub>,
    cancel: CancellationToken,
) {
    let mut applied = 0u64;
    loop {
        let (guid, update) = tokio::select! {
            _ = cancel.cancelled() => break,
            queued = updates.recv() => match queued {
                Some(queued) => queued,
                None => break,
            },
        };

        let Some(driver) = registry.connected().get(&guid) else {
            debug!(car_id, guid = %guid, "Dropping car update for departed driver");
            continue;
        };
        {
            let mut driver = driver.lock();
            if driver.car_info.car_id != car_id {
                debug!(car_id, guid = %guid, "Dropping car update for driver now in another car");
                continue;
            }
            apply_car_update(&mut driver, &update, Utc::now());
        }
        applied += 1;
        trace!(car_id, applied, "Applied car update");

        if let Err(e) = hub.send(EventType::CarUpdate, &update) {
            warn!(car_id, error = %e, "Failed to broadcast car update");
        }
    }
    debug!(car_id, applied, "Car update lane ended");
}
