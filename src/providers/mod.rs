//! Collaborator implementations
//!
//! - [`ChannelSource`] / [`ReplaySource`]: telemetry sources
//! - [`StaticTrackProvider`] / [`ContentTrackProvider`]: track data
//! - [`MemorySnapshotStore`] / [`YamlSnapshotStore`]: snapshot persistence
//! - [`ChannelControl`]: control channel toward the race server

mod control;
mod live;
mod replay;
mod snapshot;
mod tracks;

pub use control::ChannelControl;
pub use live::ChannelSource;
pub use replay::ReplaySource;
pub use snapshot::{MemorySnapshotStore, YamlSnapshotStore};
pub use tracks::{ContentTrackProvider, StaticTrackProvider};
