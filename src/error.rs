//! Error types for race control.
//!
//! Every failure the engine can produce is a [`RaceControlError`]. Errors are
//! grouped into a small taxonomy (see [`ErrorCategory`]) which decides how the
//! controller reacts:
//!
//! - **Inconsistency**: telemetry that contradicts current state (a disconnect
//!   without a connect, a lap for an unmapped car). Logged and dropped.
//! - **Collaborator**: track data or persistence failures. Track metadata
//!   failures abort a new-session transition, everything else degrades.
//! - **Transport**: a streaming client or control channel could not be
//!   written to. The client is evicted.
//! - **Policy**: a request that is valid but not allowed right now, such as
//!   starting a second weather transition.
//! - **Configuration**: invalid settings detected at startup.
//!
//! ```rust
//! use race_control::{ErrorCategory, RaceControlError};
//!
//! let error = RaceControlError::unknown_car(4, "lap completed");
//! assert_eq!(error.category(), ErrorCategory::Inconsistency);
//! assert!(!error.is_fatal());
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{CarId, DriverGuid};

/// Result type alias for race control operations.
pub type Result<T, E = RaceControlError> = std::result::Result<T, E>;

/// Boxed source error carried by collaborator failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for race control.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RaceControlError {
    #[error("car {car_id} ({guid}) disconnected without a prior connect")]
    DisconnectWithoutConnect { car_id: CarId, guid: DriverGuid },

    #[error("car {car_id} is not mapped to a driver ({context})")]
    UnknownCar { car_id: CarId, context: &'static str },

    #[error("driver {guid} is not connected")]
    DriverNotConnected { guid: DriverGuid },

    #[error("failed to load track info for {track} ({layout})")]
    TrackInfo {
        track: String,
        layout: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to load track map for {track} ({layout})")]
    TrackMap {
        track: String,
        layout: String,
        #[source]
        source: BoxError,
    },

    #[error("snapshot persistence failed at {path}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("failed to serialize {what}")]
    Serialization {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("control channel rejected {command}: {reason}")]
    Control { command: &'static str, reason: String },

    #[error("a weather transition is already in progress")]
    AlreadyTransitioning,

    #[error("invalid weather transition: {reason}")]
    InvalidWeatherTransition { reason: String },

    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    #[error("telemetry source failed: {reason}")]
    Source {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },
}

/// Coarse classification of errors, used to decide how a failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Telemetry contradicts current state; the event is dropped.
    Inconsistency,
    /// An external collaborator (track data, persistence) failed.
    Collaborator,
    /// A client or control channel could not be written to.
    Transport,
    /// The request is not permitted in the current state.
    Policy,
    /// Settings are invalid.
    Configuration,
}

impl RaceControlError {
    /// Category of this error in the race control error taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            RaceControlError::DisconnectWithoutConnect { .. }
            | RaceControlError::UnknownCar { .. }
            | RaceControlError::DriverNotConnected { .. } => ErrorCategory::Inconsistency,
            RaceControlError::TrackInfo { .. }
            | RaceControlError::TrackMap { .. }
            | RaceControlError::Persistence { .. }
            | RaceControlError::Source { .. } => ErrorCategory::Collaborator,
            RaceControlError::Serialization { .. } | RaceControlError::Control { .. } => {
                ErrorCategory::Transport
            }
            RaceControlError::AlreadyTransitioning
            | RaceControlError::InvalidWeatherTransition { .. } => ErrorCategory::Policy,
            RaceControlError::Config { .. } => ErrorCategory::Configuration,
        }
    }

    /// Whether this error aborts the operation that produced it.
    ///
    /// Only missing track metadata is fatal to a new-session transition;
    /// everything else is logged and the controller carries on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RaceControlError::TrackInfo { .. })
    }

    /// Helper constructor for events referencing an unmapped car.
    pub fn unknown_car(car_id: CarId, context: &'static str) -> Self {
        RaceControlError::UnknownCar { car_id, context }
    }

    /// Helper constructor for persistence failures.
    pub fn persistence(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        RaceControlError::Persistence { path: path.into(), source: source.into() }
    }

    /// Helper constructor for control channel failures.
    pub fn control(command: &'static str, reason: impl Into<String>) -> Self {
        RaceControlError::Control { command, reason: reason.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        RaceControlError::Config { reason: reason.into() }
    }

    /// Helper constructor for telemetry source failures.
    pub fn source_failed(reason: impl Into<String>) -> Self {
        RaceControlError::Source { reason: reason.into(), source: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn unknown_car_messages_carry_car_and_context(car_id in any::<u8>()) {
                let error = RaceControlError::unknown_car(car_id, "car update");
                let message = error.to_string();
                prop_assert!(message.contains(&car_id.to_string()));
                prop_assert!(message.contains("car update"));
                prop_assert_eq!(error.category(), ErrorCategory::Inconsistency);
            }

            #[test]
            fn persistence_errors_keep_their_source(reason in "[a-z ]{1,40}") {
                let io = std::io::Error::other(reason.clone());
                let error = RaceControlError::persistence("/tmp/live.yaml", io);
                let source = std::error::Error::source(&error).map(|s| s.to_string());
                prop_assert_eq!(source, Some(reason));
                prop_assert!(!error.is_fatal());
            }
        }
    }

    #[test]
    fn taxonomy_matches_handling_policy() {
        let disconnect = RaceControlError::DisconnectWithoutConnect {
            car_id: 3,
            guid: DriverGuid::from("7656119"),
        };
        assert_eq!(disconnect.category(), ErrorCategory::Inconsistency);

        let track = RaceControlError::TrackInfo {
            track: "ks_vallelunga".into(),
            layout: "club_circuit".into(),
            source: "missing ui_track.json".into(),
        };
        assert_eq!(track.category(), ErrorCategory::Collaborator);
        assert!(track.is_fatal());

        let map = RaceControlError::TrackMap {
            track: "ks_vallelunga".into(),
            layout: "club_circuit".into(),
            source: "missing map.ini".into(),
        };
        assert!(!map.is_fatal());
        assert!(!RaceControlError::config("driver timeout must be positive").is_fatal());

        assert_eq!(RaceControlError::AlreadyTransitioning.category(), ErrorCategory::Policy);
        assert_eq!(
            RaceControlError::control("kick", "channel closed").category(),
            ErrorCategory::Transport
        );
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<RaceControlError>();

        let error = RaceControlError::source_failed("socket closed");
        let _: &dyn std::error::Error = &error;
    }
}
