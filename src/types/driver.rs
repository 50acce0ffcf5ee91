//! Live timing records for participants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::message::{SessionCarInfo, Vec3};
use super::millis;

/// Car slot identifier assigned by the server. Reused across connects.
pub type CarId = u8;

/// Stable identity of a participant across connects and disconnects.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverGuid(String);

impl DriverGuid {
    pub fn new(guid: impl Into<String>) -> Self {
        Self(guid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DriverGuid {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for DriverGuid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for DriverGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static information about the car a driver is in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarInfo {
    pub car_id: CarId,
    pub driver_name: String,
    pub driver_guid: DriverGuid,
    pub driver_initials: String,
    pub car_model: String,
    pub car_skin: String,
}

impl From<&SessionCarInfo> for CarInfo {
    fn from(info: &SessionCarInfo) -> Self {
        Self {
            car_id: info.car_id,
            driver_name: info.driver_name.clone(),
            driver_guid: info.driver_guid.clone(),
            driver_initials: initials_for(&info.driver_name),
            car_model: info.car_model.clone(),
            car_skin: info.car_skin.clone(),
        }
    }
}

/// Up to three initials for a display name, e.g. "Max Verstappen" → "MVE".
///
/// Single-word names use their first three letters.
pub fn initials_for(name: &str) -> String {
    let words: Vec<&str> = name.split_whitespace().collect();
    let initials: String = match words.as_slice() {
        [] => String::new(),
        [single] => single.chars().take(3).collect(),
        [first, .., last] => {
            first.chars().take(1).chain(last.chars().take(2)).collect()
        }
    };
    initials.to_uppercase()
}

/// Lap statistics for one car model driven by a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarLapRecord {
    pub laps: u32,
    #[serde(with = "millis")]
    pub total_lap_time: Duration,
    #[serde(with = "millis")]
    pub last_lap: Duration,
    #[serde(with = "millis::option", default)]
    pub best_lap: Option<Duration>,
    pub top_speed_best_lap: f32,
    pub top_speed_this_lap: f32,
    pub last_lap_completed: DateTime<Utc>,
}

impl CarLapRecord {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            laps: 0,
            total_lap_time: Duration::ZERO,
            last_lap: Duration::ZERO,
            best_lap: None,
            top_speed_best_lap: 0.0,
            top_speed_this_lap: 0.0,
            last_lap_completed: now,
        }
    }
}

/// What a collision was with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionKind {
    Car,
    Environment,
}

/// A recorded collision. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collision {
    pub id: uuid::Uuid,
    pub kind: CollisionKind,
    pub time: DateTime<Utc>,
    pub other_driver: Option<DriverGuid>,
    pub speed: f32,
}

impl Collision {
    pub fn new(
        kind: CollisionKind,
        time: DateTime<Utc>,
        other_driver: Option<DriverGuid>,
        speed: f32,
    ) -> Self {
        Self { id: uuid::Uuid::new_v4(), kind, time, other_driver, speed }
    }
}

/// Live timing record for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub car_info: CarInfo,
    pub total_laps: u32,
    pub connected_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub position: u32,
    pub split: String,
    pub last_pos: Vec3,
    /// Lap statistics keyed by car model.
    pub cars: BTreeMap<String, CarLapRecord>,
    pub collisions: Vec<Collision>,
}

impl Driver {
    pub fn new(car_info: CarInfo, now: DateTime<Utc>) -> Self {
        Self {
            car_info,
            total_laps: 0,
            connected_at: now,
            last_seen: None,
            loaded_at: None,
            position: 0,
            split: String::new(),
            last_pos: Vec3::default(),
            cars: BTreeMap::new(),
            collisions: Vec::new(),
        }
    }

    pub fn guid(&self) -> &DriverGuid {
        &self.car_info.driver_guid
    }

    /// Lap record for the model currently driven.
    pub fn current_car(&self) -> Option<&CarLapRecord> {
        self.cars.get(&self.car_info.car_model)
    }

    pub fn current_car_mut(&mut self) -> Option<&mut CarLapRecord> {
        self.cars.get_mut(&self.car_info.car_model)
    }

    /// Lap record for the current model, created if missing.
    pub fn ensure_current_car(&mut self, now: DateTime<Utc>) -> &mut CarLapRecord {
        self.cars.entry(self.car_info.car_model.clone()).or_insert_with(|| CarLapRecord::new(now))
    }

    /// Sum of completed lap times across every model.
    pub fn total_lap_time(&self) -> Duration {
        self.cars.values().map(|car| car.total_lap_time).sum()
    }

    pub fn best_lap(&self) -> Option<Duration> {
        self.current_car().and_then(|car| car.best_lap)
    }

    pub fn last_lap_completed(&self) -> Option<DateTime<Utc>> {
        self.current_car().map(|car| car.last_lap_completed)
    }

    pub fn has_completed_lap(&self) -> bool {
        self.total_laps > 0
    }

    /// Most recent sign of life: last telemetry sample, else the connect time.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_seen.unwrap_or(self.connected_at)
    }

    /// Reset everything that belongs to a session, keeping identity and car.
    pub fn clear_session_data(&mut self, now: DateTime<Utc>) {
        self.total_laps = 0;
        self.loaded_at = None;
        self.position = 0;
        self.split.clear();
        self.last_pos = Vec3::default();
        self.collisions.clear();
        self.cars.clear();
        self.ensure_current_car(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car_info(car_id: CarId, name: &str, guid: &str) -> CarInfo {
        CarInfo {
            car_id,
            driver_name: name.into(),
            driver_guid: guid.into(),
            driver_initials: initials_for(name),
            car_model: "ks_porsche_911_gt3_cup_2017".into(),
            car_skin: "00_white".into(),
        }
    }

    #[test]
    fn initials_from_names() {
        assert_eq!(initials_for("Max Verstappen"), "MVE");
        assert_eq!(initials_for("Jean-Éric Vergne"), "JVE");
        assert_eq!(initials_for("kimi"), "KIM");
        assert_eq!(initials_for("  "), "");
    }

    #[test]
    fn clearing_keeps_identity_and_car() {
        let now = Utc::now();
        let mut driver = Driver::new(car_info(7, "Ana Costa", "7656111"), now);
        let car = driver.ensure_current_car(now);
        car.laps = 4;
        car.best_lap = Some(Duration::from_millis(61_200));
        driver.total_laps = 4;
        driver.position = 2;
        driver.split = "1.2s".into();
        driver.collisions.push(Collision::new(CollisionKind::Environment, now, None, 40.0));

        driver.clear_session_data(now);

        assert_eq!(driver.guid().as_str(), "7656111");
        assert_eq!(driver.car_info.car_id, 7);
        assert_eq!(driver.total_laps, 0);
        assert_eq!(driver.position, 0);
        assert!(driver.split.is_empty());
        assert!(driver.collisions.is_empty());
        assert_eq!(driver.best_lap(), None);
        assert!(driver.current_car().is_some());
    }

    #[test]
    fn activity_falls_back_to_connect_time() {
        let now = Utc::now();
        let mut driver = Driver::new(car_info(1, "Ana Costa", "1"), now);
        assert_eq!(driver.last_activity(), now);

        let later = now + chrono::Duration::seconds(30);
        driver.last_seen = Some(later);
        assert_eq!(driver.last_activity(), later);
    }
}
