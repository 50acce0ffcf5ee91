//! Traits for the collaborators race control talks to

use crate::Result;
use crate::types::{CarId, LiveTimingSnapshot, Message, TrackInfo, TrackMap};
use crate::weather::WeatherUpdate;

/// Source of telemetry events from one race server.
///
/// Sources deliver events in the order the server emitted them. Decoding the
/// server's wire format happens inside the source.
#[async_trait::async_trait]
pub trait TelemetrySource: Send + 'static {
    /// Get the next event
    ///
    /// Returns:
    /// - `Ok(Some(message))` - New event available
    /// - `Ok(None)` - The server process stopped (normal termination)
    /// - `Err(e)` - Transient failure, the caller may retry
    async fn next_message(&mut self) -> Result<Option<Message>>;
}

/// Static track data lookup.
#[async_trait::async_trait]
pub trait TrackDataProvider: Send + Sync + 'static {
    /// Metadata for a track layout. An empty `layout` means the default layout.
    async fn track_info(&self, track: &str, layout: &str) -> Result<TrackInfo>;

    /// Map geometry for a track layout.
    async fn track_map(&self, track: &str, layout: &str) -> Result<TrackMap>;
}

/// Storage for the single live timing snapshot.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync + 'static {
    /// Load the stored snapshot, `Ok(None)` if nothing has been saved yet.
    async fn load(&self) -> Result<Option<LiveTimingSnapshot>>;

    /// Replace the stored snapshot.
    async fn save(&self, snapshot: &LiveTimingSnapshot) -> Result<()>;
}

/// Commands race control sends back to the race server.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Ask the server to emit a session info update.
    GetSessionInfo,
    /// Private chat message to one car.
    SendChat { car_id: CarId, message: String },
    /// Chat message to every car.
    BroadcastChat { message: String },
    /// Remove the driver in a car from the server.
    KickUser { car_id: CarId },
    NextSession,
    RestartSession,
    /// One weather transition step, addressed to one car.
    Weather { car_id: CarId, update: WeatherUpdate },
}

impl ControlCommand {
    /// Short name, used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            ControlCommand::GetSessionInfo => "get_session_info",
            ControlCommand::SendChat { .. } => "send_chat",
            ControlCommand::BroadcastChat { .. } => "broadcast_chat",
            ControlCommand::KickUser { .. } => "kick_user",
            ControlCommand::NextSession => "next_session",
            ControlCommand::RestartSession => "restart_session",
            ControlCommand::Weather { .. } => "weather",
        }
    }
}

/// Control channel toward the race server.
#[async_trait::async_trait]
pub trait ServerControl: Send + Sync + 'static {
    async fn send(&self, command: ControlCommand) -> Result<()>;
}
