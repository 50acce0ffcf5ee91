//! Persisted live timing projection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::driver::{Driver, DriverGuid};
use super::session::{SessionSignature, SessionType};

/// Everything needed to rebuild standings after a restart.
///
/// Written when the server process stops and read back when a session with
/// the same signature starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveTimingSnapshot {
    pub session_type: SessionType,
    pub track: String,
    pub layout: String,
    pub session_name: String,
    pub saved_at: DateTime<Utc>,
    pub drivers: BTreeMap<DriverGuid, Driver>,
}

impl LiveTimingSnapshot {
    pub fn new(
        signature: SessionSignature,
        drivers: BTreeMap<DriverGuid, Driver>,
        saved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_type: signature.session_type,
            track: signature.track,
            layout: signature.layout,
            session_name: signature.name,
            saved_at,
            drivers,
        }
    }

    pub fn signature(&self) -> SessionSignature {
        SessionSignature {
            session_type: self.session_type,
            track: self.track.clone(),
            layout: self.layout.clone(),
            name: self.session_name.clone(),
        }
    }

    /// Whether this snapshot was taken during a session with `signature`.
    pub fn matches(&self, signature: &SessionSignature) -> bool {
        self.session_type == signature.session_type
            && self.track == signature.track
            && self.layout == signature.layout
            && self.session_name == signature.name
    }
}
