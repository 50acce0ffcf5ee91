//! Core data types for race control.
//!
//! This module holds the plain data that flows through the engine:
//!
//! - [`Message`] is the closed set of telemetry events a race server emits
//! - [`Session`] describes the session currently running on the server
//! - [`Driver`] is the live timing record for one participant
//! - [`LiveTimingSnapshot`] is the persisted projection used for crash recovery
//! - [`LiveTimingState`] is the full state streamed to clients
//!
//! All types serialize with `serde`. Durations are written as integer
//! milliseconds so that clients never deal with `{secs, nanos}` pairs.

mod driver;
mod message;
mod session;
mod snapshot;
mod state;
mod track;
mod update_rate;

pub use driver::{
    CarId, CarInfo, CarLapRecord, Collision, CollisionKind, Driver, DriverGuid, initials_for,
};
pub use message::{
    Chat, ClientLoaded, CollisionWithCar, CollisionWithEnvironment, ConnectionKind, EndSession,
    EventType, LapCompleted, Message, SessionCarInfo, SessionInfo, SessionInfoKind, CarUpdate,
    Vec3, Version,
};
pub use session::{Session, SessionSignature, SessionType};
pub use snapshot::LiveTimingSnapshot;
pub use state::LiveTimingState;
pub use track::{TrackInfo, TrackMap};
pub use update_rate::UpdateRate;

/// Serde helpers writing [`std::time::Duration`] as integer milliseconds.
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    /// Same encoding for optional durations; `None` is written as `null`.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }
}
