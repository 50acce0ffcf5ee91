//! Telemetry events emitted by a race server.
//!
//! Decoding the server's wire format is the job of the transport that feeds
//! race control; by the time an event reaches this crate it is one of the
//! [`Message`] variants below.

use serde::{Deserialize, Serialize};

use super::driver::{CarId, DriverGuid};

/// A position or velocity in world space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Magnitude of the horizontal (x/z) components.
    ///
    /// The vertical axis is ignored so that crests and compressions do not
    /// inflate recorded top speeds.
    pub fn horizontal_magnitude(&self) -> f32 {
        (self.x * self.x + self.z * self.z).sqrt()
    }
}

/// Protocol version announcement, sent when the server starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub protocol: u8,
}

/// Whether a session info event starts a new session or patches the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionInfoKind {
    New,
    Update,
}

/// Session description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub kind: SessionInfoKind,
    pub version: u8,
    pub session_index: u8,
    pub current_session_index: u8,
    pub session_count: u8,
    pub server_name: String,
    pub track: String,
    pub track_layout: String,
    pub name: String,
    pub session_type: super::SessionType,
    /// Session length in minutes (timed sessions).
    pub time: u16,
    /// Session length in laps (lap-limited races).
    pub laps: u16,
    pub wait_time: u16,
    pub ambient_temp: u8,
    pub road_temp: u8,
    pub weather_graphics: String,
    /// Milliseconds since the session started. Negative during the wait time.
    pub elapsed_ms: i32,
}

/// Position and velocity sample for one car.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarUpdate {
    pub car_id: CarId,
    pub pos: Vec3,
    pub velocity: Vec3,
    pub gear: u8,
    pub engine_rpm: u16,
    pub normalised_spline_pos: f32,
}

/// Whether a car info event is a connect or a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Connect,
    Disconnect,
}

/// A driver joining or leaving a car slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCarInfo {
    pub kind: ConnectionKind,
    pub car_id: CarId,
    pub driver_name: String,
    pub driver_guid: DriverGuid,
    pub car_model: String,
    pub car_skin: String,
}

/// The client for a car finished loading and is on track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientLoaded {
    pub car_id: CarId,
}

/// Contact between two cars, reported by `car_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionWithCar {
    pub car_id: CarId,
    pub other_car_id: CarId,
    pub impact_speed: f32,
    pub world_pos: Vec3,
    pub rel_pos: Vec3,
}

/// Contact between a car and the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionWithEnvironment {
    pub car_id: CarId,
    pub impact_speed: f32,
    pub world_pos: Vec3,
    pub rel_pos: Vec3,
}

/// A completed lap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapCompleted {
    pub car_id: CarId,
    pub lap_time_ms: u32,
    /// Number of track-limit cuts. Any cut invalidates the lap for best-lap purposes.
    pub cuts: u8,
}

/// The session ended and the server wrote its results file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndSession {
    pub results_path: String,
}

/// A chat line sent by a driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub car_id: CarId,
    pub message: String,
}

/// Telemetry event emitted by a race server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Message {
    Version(Version),
    SessionInfo(SessionInfo),
    CarUpdate(CarUpdate),
    SessionCarInfo(SessionCarInfo),
    ClientLoaded(ClientLoaded),
    CollisionWithCar(CollisionWithCar),
    CollisionWithEnvironment(CollisionWithEnvironment),
    LapCompleted(LapCompleted),
    EndSession(EndSession),
    Chat(Chat),
    /// Any event race control does not act on, identified by its protocol code.
    Other { code: u8 },
}

/// Event tag attached to every broadcast frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Full state sent to a client when it subscribes.
    RaceControl,
    Version,
    NewSession,
    SessionInfo,
    EndSession,
    CarUpdate,
    NewConnection,
    ConnectionClosed,
    ClientLoaded,
    CollisionWithCar,
    CollisionWithEnvironment,
    LapCompleted,
    Chat,
    Other,
}

impl EventType {
    /// Stable lowercase name, used in logs and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::RaceControl => "race_control",
            EventType::Version => "version",
            EventType::NewSession => "new_session",
            EventType::SessionInfo => "session_info",
            EventType::EndSession => "end_session",
            EventType::CarUpdate => "car_update",
            EventType::NewConnection => "new_connection",
            EventType::ConnectionClosed => "connection_closed",
            EventType::ClientLoaded => "client_loaded",
            EventType::CollisionWithCar => "collision_with_car",
            EventType::CollisionWithEnvironment => "collision_with_environment",
            EventType::LapCompleted => "lap_completed",
            EventType::Chat => "chat",
            EventType::Other => "other",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Message {
    /// Event type of this message.
    pub fn event_type(&self) -> EventType {
        match self {
            Message::Version(_) => EventType::Version,
            Message::SessionInfo(info) => match info.kind {
                SessionInfoKind::New => EventType::NewSession,
                SessionInfoKind::Update => EventType::SessionInfo,
            },
            Message::CarUpdate(_) => EventType::CarUpdate,
            Message::SessionCarInfo(info) => match info.kind {
                ConnectionKind::Connect => EventType::NewConnection,
                ConnectionKind::Disconnect => EventType::ConnectionClosed,
            },
            Message::ClientLoaded(_) => EventType::ClientLoaded,
            Message::CollisionWithCar(_) => EventType::CollisionWithCar,
            Message::CollisionWithEnvironment(_) => EventType::CollisionWithEnvironment,
            Message::LapCompleted(_) => EventType::LapCompleted,
            Message::EndSession(_) => EventType::EndSession,
            Message::Chat(_) => EventType::Chat,
            Message::Other { .. } => EventType::Other,
        }
    }

    /// Car this message refers to, if any.
    pub fn car_id(&self) -> Option<CarId> {
        match self {
            Message::CarUpdate(update) => Some(update.car_id),
            Message::SessionCarInfo(info) => Some(info.car_id),
            Message::ClientLoaded(loaded) => Some(loaded.car_id),
            Message::CollisionWithCar(collision) => Some(collision.car_id),
            Message::CollisionWithEnvironment(collision) => Some(collision.car_id),
            Message::LapCompleted(lap) => Some(lap.car_id),
            Message::Chat(chat) => Some(chat.car_id),
            Message::Version(_)
            | Message::SessionInfo(_)
            | Message::EndSession(_)
            | Message::Other { .. } => None,
        }
    }
}
