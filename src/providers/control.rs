//! Control channel forwarding commands to the server's command writer

use tokio::sync::mpsc;
use tracing::debug;

use crate::provider::{ControlCommand, ServerControl};
use crate::{RaceControlError, Result};

/// Forwards [`ControlCommand`]s into a channel.
///
/// The transport that owns the server's control socket drains the receiver
/// and encodes each command. Sends fail once the receiver is dropped.
#[derive(Clone)]
pub struct ChannelControl {
    sender: mpsc::UnboundedSender<ControlCommand>,
}

impl ChannelControl {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ControlCommand>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait::async_trait]
impl ServerControl for ChannelControl {
    async fn send(&self, command: ControlCommand) -> Result<()> {
        let name = command.name();
        debug!(command = name, "Sending control command");
        self.sender
            .send(command)
            .map_err(|_| RaceControlError::control(name, "control channel closed"))
    }
}
