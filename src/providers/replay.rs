//! Replay source for recorded telemetry

use std::collections::VecDeque;
use std::path::Path;
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace};

use crate::provider::TelemetrySource;
use crate::types::Message;
use crate::{RaceControlError, Result};

/// Replays a recorded list of events, optionally paced.
pub struct ReplaySource {
    /// Events not yet delivered
    pending: VecDeque<Message>,

    /// Delay between events; `None` replays as fast as the consumer reads
    pacing: Option<Interval>,

    /// Total events in the recording
    total: usize,
}

impl ReplaySource {
    /// Create a replay source from events in memory.
    pub fn new(messages: impl IntoIterator<Item = Message>) -> Self {
        let pending: VecDeque<Message> = messages.into_iter().collect();
        let total = pending.len();
        Self { pending, pacing: None, total }
    }

    /// Load a recording written as a YAML list of messages.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RaceControlError::persistence(path, e))?;
        let messages: Vec<Message> =
            serde_yaml_ng::from_str(&raw).map_err(|e| RaceControlError::persistence(path, e))?;

        info!("Loaded recording {}: {} events", path.display(), messages.len());
        Ok(Self::new(messages))
    }

    /// Deliver at most one event per `delay`.
    pub fn with_pacing(mut self, delay: Duration) -> Self {
        let mut pacing = interval(delay);
        pacing.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.pacing = Some(pacing);
        self
    }

    /// Events remaining.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait::async_trait]
impl TelemetrySource for ReplaySource {
    async fn next_message(&mut self) -> Result<Option<Message>> {
        if self.pending.is_empty() {
            debug!("Reached end of recording");
            return Ok(None);
        }

        if let Some(pacing) = self.pacing.as_mut() {
            pacing.tick().await;
        }

        let message = self.pending.pop_front();
        trace!("Event {}/{}", self.total - self.pending.len(), self.total);
        Ok(message)
    }
}
