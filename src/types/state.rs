//! Full live timing state as seen by clients

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::driver::{CarId, Driver, DriverGuid};
use super::session::Session;
use super::track::{TrackInfo, TrackMap};

/// Point-in-time copy of everything race control knows.
///
/// Drivers are listed in standings order for their group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveTimingState {
    pub session: Option<Session>,
    pub track_info: Option<TrackInfo>,
    pub track_map: Option<TrackMap>,
    pub connected: Vec<Driver>,
    pub disconnected: Vec<Driver>,
    pub car_ids: BTreeMap<CarId, DriverGuid>,
}

impl LiveTimingState {
    /// Connected driver with `guid`, if any.
    pub fn connected_driver(&self, guid: &DriverGuid) -> Option<&Driver> {
        self.connected.iter().find(|driver| driver.guid() == guid)
    }

    /// Disconnected driver with `guid`, if any.
    pub fn disconnected_driver(&self, guid: &DriverGuid) -> Option<&Driver> {
        self.disconnected.iter().find(|driver| driver.guid() == guid)
    }
}
