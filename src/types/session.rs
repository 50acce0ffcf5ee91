//! Session metadata

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use super::message::SessionInfo;

/// Kind of session running on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Booking,
    Practice,
    Qualifying,
    Race,
}

impl SessionType {
    /// Decode the protocol's session type code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SessionType::Booking),
            1 => Some(SessionType::Practice),
            2 => Some(SessionType::Qualifying),
            3 => Some(SessionType::Race),
            _ => None,
        }
    }

    /// Races are scored on elapsed time, everything else on best lap.
    pub fn is_race(self) -> bool {
        self == SessionType::Race
    }

    /// Sessions that may loop back to back with the same configuration.
    pub fn is_practice_like(self) -> bool {
        self == SessionType::Practice
    }
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionType::Booking => "Booking",
            SessionType::Practice => "Practice",
            SessionType::Qualifying => "Qualifying",
            SessionType::Race => "Race",
        };
        f.write_str(name)
    }
}

/// Identity of a session configuration.
///
/// Two sessions with the same signature are considered the same session
/// restarted, which is how looped practice sessions are detected and how a
/// persisted snapshot is matched to the session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionSignature {
    pub session_type: SessionType,
    pub track: String,
    pub layout: String,
    pub name: String,
}

/// The session currently running on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub version: u8,
    pub server_name: String,
    pub track: String,
    pub layout: String,
    pub name: String,
    pub session_type: SessionType,
    pub session_index: u8,
    pub current_session_index: u8,
    pub session_count: u8,
    pub time: u16,
    pub laps: u16,
    pub wait_time: u16,
    pub ambient_temp: u8,
    pub road_temp: u8,
    pub weather_id: String,
    pub elapsed_ms: i32,
    pub start_time: DateTime<Utc>,
}

impl Session {
    /// Build a session from a new-session event received at `now`.
    pub fn from_info(info: &SessionInfo, now: DateTime<Utc>) -> Self {
        Self {
            version: info.version,
            server_name: info.server_name.clone(),
            track: info.track.clone(),
            layout: info.track_layout.clone(),
            name: info.name.clone(),
            session_type: info.session_type,
            session_index: info.session_index,
            current_session_index: info.current_session_index,
            session_count: info.session_count,
            time: info.time,
            laps: info.laps,
            wait_time: info.wait_time,
            ambient_temp: info.ambient_temp,
            road_temp: info.road_temp,
            weather_id: info.weather_graphics.clone(),
            elapsed_ms: info.elapsed_ms,
            start_time: now - ChronoDuration::milliseconds(i64::from(info.elapsed_ms)),
        }
    }

    pub fn signature(&self) -> SessionSignature {
        SessionSignature {
            session_type: self.session_type,
            track: self.track.clone(),
            layout: self.layout.clone(),
            name: self.name.clone(),
        }
    }

    /// Patch the fields a session update may change.
    ///
    /// Returns `true` when any of them actually changed.
    pub fn apply_update(&mut self, info: &SessionInfo) -> bool {
        let changed = self.ambient_temp != info.ambient_temp
            || self.road_temp != info.road_temp
            || self.weather_id != info.weather_graphics
            || self.elapsed_ms != info.elapsed_ms;

        self.ambient_temp = info.ambient_temp;
        self.road_temp = info.road_temp;
        self.weather_id.clone_from(&info.weather_graphics);
        self.elapsed_ms = info.elapsed_ms;

        changed
    }
}

impl SessionInfo {
    pub fn signature(&self) -> SessionSignature {
        SessionSignature {
            session_type: self.session_type,
            track: self.track.clone(),
            layout: self.track_layout.clone(),
            name: self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionInfoKind;

    fn info() -> SessionInfo {
        SessionInfo {
            kind: SessionInfoKind::New,
            version: 4,
            session_index: 0,
            current_session_index: 0,
            session_count: 3,
            server_name: "Friday Night Club".into(),
            track: "ks_brands_hatch".into(),
            track_layout: "indy".into(),
            name: "Practice".into(),
            session_type: SessionType::Practice,
            time: 30,
            laps: 0,
            wait_time: 60,
            ambient_temp: 18,
            road_temp: 24,
            weather_graphics: "3_clear".into(),
            elapsed_ms: 5_000,
        }
    }

    #[test]
    fn session_codes_decode() {
        assert_eq!(SessionType::from_code(3), Some(SessionType::Race));
        assert_eq!(SessionType::from_code(9), None);
        assert!(SessionType::Race.is_race());
        assert!(SessionType::Practice.is_practice_like());
        assert!(!SessionType::Qualifying.is_practice_like());
    }

    #[test]
    fn start_time_accounts_for_elapsed() {
        let now = Utc::now();
        let session = Session::from_info(&info(), now);
        assert_eq!(now - session.start_time, ChronoDuration::milliseconds(5_000));
        assert_eq!(session.signature(), info().signature());
    }

    #[test]
    fn updates_report_changes_only() {
        let mut session = Session::from_info(&info(), Utc::now());
        assert!(!session.apply_update(&info()));

        let mut warmer = info();
        warmer.road_temp = 31;
        assert!(session.apply_update(&warmer));
        assert_eq!(session.road_temp, 31);
        assert!(!session.apply_update(&warmer));
    }
}
