//! Live telemetry source fed by an external decoder

use tokio::sync::mpsc;
use tracing::info;

use crate::Result;
use crate::provider::TelemetrySource;
use crate::types::Message;

/// Telemetry source backed by a channel.
///
/// The transport that decodes the race server's UDP packets pushes each
/// decoded [`Message`] into the paired [`mpsc::Sender`]. Dropping every
/// sender ends the source, which race control treats as the server
/// process having stopped.
pub struct ChannelSource {
    receiver: mpsc::Receiver<Message>,
}

impl ChannelSource {
    /// Create a source and the sender the decoder writes to.
    pub fn new(buffer: usize) -> (mpsc::Sender<Message>, Self) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (sender, Self { receiver })
    }
}

#[async_trait::async_trait]
impl TelemetrySource for ChannelSource {
    async fn next_message(&mut self) -> Result<Option<Message>> {
        let message = self.receiver.recv().await;
        if message.is_none() {
            info!("Telemetry decoder closed the channel");
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Version;

    #[tokio::test]
    async fn ends_when_senders_drop() {
        let (sender, mut source) = ChannelSource::new(4);
        sender.send(Message::Version(Version { protocol: 4 })).await.unwrap();
        drop(sender);

        assert!(matches!(source.next_message().await, Ok(Some(Message::Version(_)))));
        assert!(matches!(source.next_message().await, Ok(None)));
    }
}
