//! Driver registry
//!
//! Two ordered collections of drivers, "connected" and "disconnected", plus
//! the car id to driver identity mapping.
//!
//! # Locking
//!
//! Each collection has an outer [`RwLock`] guarding membership and order, and
//! every driver sits behind its own [`Mutex`] guarding its fields. Per-car
//! lanes therefore update different drivers in parallel while structural
//! changes stay exclusive.
//!
//! Locks are always taken in this order, and no lock is held across an
//! `.await`:
//!
//! 1. car id map
//! 2. connected collection
//! 3. disconnected collection
//! 4. individual drivers (in collection order when several are needed)

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::standings::{self, DriverGroup};
use crate::types::{CarId, CarInfo, Driver, DriverGuid, SessionType};
use crate::{RaceControlError, Result};

/// A driver record that can be locked independently of its collection.
pub type SharedDriver = Arc<Mutex<Driver>>;

/// Ordering used to sort a collection; `Less` means the first driver ranks higher.
pub type Comparator = Box<dyn Fn(&Driver, &Driver) -> Ordering + Send + Sync>;

/// Comparator for a session type and group, see [`standings::compare`].
pub fn comparator(session_type: SessionType, group: DriverGroup) -> Comparator {
    Box::new(move |a: &Driver, b: &Driver| standings::compare(session_type, group, a, b))
}

#[derive(Default)]
struct Members {
    drivers: HashMap<DriverGuid, SharedDriver>,
    order: Vec<DriverGuid>,
}

/// An ordered set of drivers keyed by identity.
///
/// Iteration reflects the order computed by the last sort. Inserts re-apply
/// the comparator; removals keep the remaining order.
pub struct DriverCollection {
    members: RwLock<Members>,
    comparator: RwLock<Comparator>,
}

impl DriverCollection {
    pub fn new(comparator: Comparator) -> Self {
        Self { members: RwLock::new(Members::default()), comparator: RwLock::new(comparator) }
    }

    /// Replace the comparator and re-sort.
    pub fn set_comparator(&self, comparator: Comparator) {
        *self.comparator.write() = comparator;
        self.sort();
    }

    /// Insert (or replace) a driver and re-sort.
    pub fn insert(&self, driver: SharedDriver) {
        let guid = driver.lock().guid().clone();
        {
            let mut members = self.members.write();
            if members.drivers.insert(guid.clone(), driver).is_none() {
                members.order.push(guid);
            }
        }
        self.sort();
    }

    pub fn remove(&self, guid: &DriverGuid) -> Option<SharedDriver> {
        let mut members = self.members.write();
        let removed = members.drivers.remove(guid)?;
        members.order.retain(|g| g != guid);
        Some(removed)
    }

    pub fn get(&self, guid: &DriverGuid) -> Option<SharedDriver> {
        self.members.read().drivers.get(guid).cloned()
    }

    pub fn contains(&self, guid: &DriverGuid) -> bool {
        self.members.read().drivers.contains_key(guid)
    }

    pub fn len(&self) -> usize {
        self.members.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every driver.
    pub fn clear(&self) -> usize {
        let mut members = self.members.write();
        let evicted = members.order.len();
        members.drivers.clear();
        members.order.clear();
        evicted
    }

    /// Handles to every driver, in standings order.
    pub fn ordered(&self) -> Vec<SharedDriver> {
        let members = self.members.read();
        members.order.iter().filter_map(|guid| members.drivers.get(guid).cloned()).collect()
    }

    /// Copies of every driver, in standings order.
    pub fn snapshot(&self) -> Vec<Driver> {
        let members = self.members.read();
        members
            .order
            .iter()
            .filter_map(|guid| members.drivers.get(guid))
            .map(|driver| driver.lock().clone())
            .collect()
    }

    /// Run `f` on every driver in standings order, with each driver locked in turn.
    pub fn for_each(&self, mut f: impl FnMut(&mut Driver)) {
        let members = self.members.read();
        for guid in &members.order {
            if let Some(driver) = members.drivers.get(guid) {
                f(&mut *driver.lock());
            }
        }
    }

    pub fn sort(&self) {
        self.sort_with(|_| ());
    }

    /// Sort, then hand every driver to `after` in the new order.
    ///
    /// All driver locks are held for the duration, so `after` sees (and can
    /// write) a consistent set of standings.
    pub fn sort_with<R>(&self, after: impl FnOnce(&mut [&mut Driver]) -> R) -> R {
        let comparator = self.comparator.read();
        let mut members = self.members.write();
        let Members { drivers, order } = &mut *members;

        let mut locked: Vec<(DriverGuid, MutexGuard<'_, Driver>)> = order
            .iter()
            .filter_map(|guid| drivers.get(guid).map(|driver| (guid.clone(), driver.lock())))
            .collect();
        locked.sort_by(|(_, a), (_, b)| (**comparator)(&**a, &**b));

        *order = locked.iter().map(|(guid, _)| guid.clone()).collect();
        let mut refs: Vec<&mut Driver> = locked.iter_mut().map(|(_, driver)| &mut **driver).collect();
        after(&mut refs)
    }
}

/// What happened to a driver on disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// Moved to the disconnected collection with its lap history.
    Retained,
    /// Dropped because it never completed a lap.
    Discarded,
}

/// Connected and disconnected drivers plus the car id mapping.
pub struct DriverRegistry {
    car_ids: RwLock<HashMap<CarId, DriverGuid>>,
    connected: DriverCollection,
    disconnected: DriverCollection,
}

impl DriverRegistry {
    pub fn new(session_type: SessionType) -> Self {
        Self {
            car_ids: RwLock::new(HashMap::new()),
            connected: DriverCollection::new(comparator(session_type, DriverGroup::Connected)),
            disconnected: DriverCollection::new(comparator(session_type, DriverGroup::Disconnected)),
        }
    }

    pub fn connected(&self) -> &DriverCollection {
        &self.connected
    }

    pub fn disconnected(&self) -> &DriverCollection {
        &self.disconnected
    }

    /// Switch both collections to the scoring rules of `session_type`.
    pub fn set_session_type(&self, session_type: SessionType) {
        self.connected.set_comparator(comparator(session_type, DriverGroup::Connected));
        self.disconnected.set_comparator(comparator(session_type, DriverGroup::Disconnected));
    }

    pub fn guid_for(&self, car_id: CarId) -> Option<DriverGuid> {
        self.car_ids.read().get(&car_id).cloned()
    }

    pub fn car_ids(&self) -> BTreeMap<CarId, DriverGuid> {
        self.car_ids.read().iter().map(|(car_id, guid)| (*car_id, guid.clone())).collect()
    }

    /// Connected driver currently in `car_id`.
    pub fn resolve(&self, car_id: CarId) -> Option<SharedDriver> {
        let car_ids = self.car_ids.read();
        let guid = car_ids.get(&car_id)?;
        self.connected.get(guid)
    }

    /// Like [`resolve`](Self::resolve), as an inconsistency error when unmapped.
    pub fn resolve_or_err(&self, car_id: CarId, context: &'static str) -> Result<SharedDriver> {
        self.resolve(car_id).ok_or_else(|| RaceControlError::unknown_car(car_id, context))
    }

    /// Car ids of every connected driver.
    pub fn connected_car_ids(&self) -> Vec<CarId> {
        let mut car_ids = Vec::with_capacity(self.connected.len());
        self.connected.for_each(|driver| car_ids.push(driver.car_info.car_id));
        car_ids
    }

    /// Connect a car. Reuses the disconnected record for a returning driver.
    pub fn connect(&self, car_info: CarInfo, now: DateTime<Utc>) -> SharedDriver {
        let mut car_ids = self.car_ids.write();
        let guid = car_info.driver_guid.clone();
        car_ids.retain(|car_id, mapped| *car_id == car_info.car_id || *mapped != guid);
        car_ids.insert(car_info.car_id, guid.clone());

        let existing = self.connected.get(&guid);
        let (shared, returning) = match existing.or_else(|| self.disconnected.remove(&guid)) {
            Some(driver) => (driver, true),
            None => (Arc::new(Mutex::new(Driver::new(car_info.clone(), now))), false),
        };

        {
            let mut driver = shared.lock();
            driver.car_info = car_info;
            driver.connected_at = now;
            driver.last_seen = None;
            driver.ensure_current_car(now).last_lap_completed = now;
        }
        self.connected.insert(shared.clone());

        info!(guid = %guid, returning, connected = self.connected.len(), "Driver connected");
        shared
    }

    /// Disconnect the driver `guid` from `car_id`.
    ///
    /// Fails without touching any state when the driver is not connected.
    pub fn disconnect(&self, car_id: CarId, guid: &DriverGuid) -> Result<DisconnectOutcome> {
        let mut car_ids = self.car_ids.write();
        let Some(shared) = self.connected.remove(guid) else {
            return Err(RaceControlError::DisconnectWithoutConnect { car_id, guid: guid.clone() });
        };
        let (seated_in, has_laps) = {
            let driver = shared.lock();
            (driver.car_info.car_id, driver.has_completed_lap())
        };
        for id in [car_id, seated_in] {
            if car_ids.get(&id) == Some(guid) {
                car_ids.remove(&id);
            }
        }

        let outcome = if has_laps {
            self.disconnected.insert(shared);
            DisconnectOutcome::Retained
        } else {
            DisconnectOutcome::Discarded
        };

        info!(guid = %guid, car_id, ?outcome, "Driver disconnected");
        Ok(outcome)
    }

    /// Car id and identity of every connected driver.
    pub fn connected_cars(&self) -> Vec<(CarId, DriverGuid)> {
        let mut cars = Vec::with_capacity(self.connected.len());
        self.connected.for_each(|driver| cars.push((driver.car_info.car_id, driver.guid().clone())));
        cars
    }

    /// Connected driver by identity.
    pub fn connected_driver(&self, guid: &DriverGuid) -> Result<SharedDriver> {
        self.connected
            .get(guid)
            .ok_or_else(|| RaceControlError::DriverNotConnected { guid: guid.clone() })
    }

    pub fn contains(&self, guid: &DriverGuid) -> bool {
        self.connected.contains(guid) || self.disconnected.contains(guid)
    }

    pub fn is_empty(&self) -> bool {
        self.connected.is_empty() && self.disconnected.is_empty()
    }

    /// Looped session: keep every record, restart lap clocks at `now`.
    pub fn restart_lap_clocks(&self, now: DateTime<Utc>) {
        let restart = |driver: &mut Driver| {
            for car in driver.cars.values_mut() {
                car.last_lap_completed = now;
            }
        };
        self.connected.for_each(restart);
        self.disconnected.for_each(restart);
    }

    /// Fresh session: blank every connected driver and evict the disconnected ones.
    pub fn reset_for_fresh_session(&self, now: DateTime<Utc>) {
        self.connected.for_each(|driver| driver.clear_session_data(now));
        self.connected.sort();
        let evicted = self.disconnected.clear();
        debug!(evicted, "Cleared driver records for fresh session");
    }

    /// Insert recovered drivers not already known. Returns how many were added.
    pub fn restore(&self, drivers: impl IntoIterator<Item = Driver>) -> usize {
        let _car_ids = self.car_ids.write();
        let mut restored = 0;
        for driver in drivers {
            if self.contains(driver.guid()) {
                continue;
            }
            self.disconnected.insert(Arc::new(Mutex::new(driver)));
            restored += 1;
        }
        restored
    }

    /// Every known driver keyed by identity, for persistence.
    pub fn all_drivers(&self) -> BTreeMap<DriverGuid, Driver> {
        let _car_ids = self.car_ids.read();
        self.connected
            .snapshot()
            .into_iter()
            .chain(self.disconnected.snapshot())
            .map(|driver| (driver.guid().clone(), driver))
            .collect()
    }
}
