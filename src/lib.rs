//! Live timing and race control for dedicated racing simulator servers.
//!
//! Race Control consumes the typed event stream of a running race server
//! (sessions, connects, car positions, laps, collisions) and keeps an
//! authoritative view of who is on track, where, and how fast. That view is
//! streamed to real-time clients and persisted for crash recovery.
//!
//! # Features
//!
//! - **Standings**: elapsed-time scoring for races, best-lap scoring otherwise
//! - **Per-car lanes**: high-frequency position updates processed in parallel
//! - **Recovery**: standings survive server restarts through snapshots
//! - **Streaming**: JSON frames fanned out to clients, slow clients evicted
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use race_control::{
//!     ChannelControl, ChannelSource, ContentTrackProvider, Pump, RaceControl,
//!     RaceControlConfig, YamlSnapshotStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> race_control::Result<()> {
//!     let config = RaceControlConfig::load_or_default();
//!     let (control, _commands) = ChannelControl::new();
//!     let controller = RaceControl::new(
//!         config.clone(),
//!         Arc::new(ContentTrackProvider::new("content")),
//!         Arc::new(YamlSnapshotStore::new(&config.snapshot_path)),
//!         Arc::new(control),
//!     );
//!
//!     // The UDP decoder pushes typed messages into `events`.
//!     let (events, source) = ChannelSource::new(1024);
//!     let pump = Pump::spawn(source, controller.clone());
//!
//!     let subscription = controller.subscribe()?;
//!     # drop((events, pump, subscription));
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod controller;
mod error;
pub mod lanes;
pub mod provider;
pub mod providers;
pub mod pump;
pub mod registry;
pub mod standings;
pub mod stream;
pub mod types;
pub mod weather;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use broadcast::{BroadcastHub, ClientExit, ClientFrame, ClientId, Subscription};
pub use config::RaceControlConfig;
pub use controller::{ChatCommand, RaceControl};
pub use provider::{ControlCommand, ServerControl, SnapshotStore, TelemetrySource, TrackDataProvider};
pub use providers::{
    ChannelControl, ChannelSource, ContentTrackProvider, MemorySnapshotStore, ReplaySource,
    StaticTrackProvider, YamlSnapshotStore,
};
pub use pump::{Pump, PumpExit, PumpHandle};
pub use registry::{DisconnectOutcome, DriverCollection, DriverRegistry, SharedDriver};
pub use weather::{WeatherConditions, WeatherProgress, WeatherTransition, WeatherUpdate};
