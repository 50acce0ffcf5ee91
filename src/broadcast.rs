//! Broadcast hub for streaming clients
//!
//! Every broadcast is serialized once into a JSON text frame and pushed into
//! each client's bounded queue with `try_send`. A client whose queue is full
//! (or already closed) is evicted on the spot, so a slow consumer never
//! stalls telemetry processing.
//!
//! Frames follow one envelope:
//!
//! ```json
//! {"event_type": "lap_completed", "message": { ... }}
//! ```

use futures::{Sink, SinkExt};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::types::EventType;
use crate::{RaceControlError, Result};

/// Identifier of a registered streaming client.
pub type ClientId = Uuid;

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    event_type: EventType,
    message: &'a T,
}

/// Serialize `payload` into the client wire envelope.
pub fn encode<T: Serialize>(event_type: EventType, payload: &T) -> Result<Arc<str>> {
    serde_json::to_string(&Envelope { event_type, message: payload })
        .map(Arc::from)
        .map_err(|source| RaceControlError::Serialization { what: event_type.as_str(), source })
}

/// A registered client's end of the hub.
#[derive(Debug)]
pub struct Subscription {
    pub id: ClientId,
    pub frames: mpsc::Receiver<Arc<str>>,
}

/// Registry of streaming clients and their outbound queues.
pub struct BroadcastHub {
    clients: RwLock<HashMap<ClientId, mpsc::Sender<Arc<str>>>>,
    queue_capacity: usize,
}

impl BroadcastHub {
    pub fn new(queue_capacity: usize) -> Self {
        Self { clients: RwLock::new(HashMap::new()), queue_capacity: queue_capacity.max(1) }
    }

    /// Register a client. `initial` is queued ahead of any broadcast.
    pub fn subscribe(&self, initial: Arc<str>) -> Subscription {
        let (sender, frames) = mpsc::channel(self.queue_capacity);
        let id = Uuid::new_v4();
        // Fresh queue, cannot be full.
        let _ = sender.try_send(initial);

        let mut clients = self.clients.write();
        clients.insert(id, sender);
        info!(client = %id, clients = clients.len(), "Streaming client subscribed");
        Subscription { id, frames }
    }

    pub fn unsubscribe(&self, id: ClientId) -> bool {
        let removed = self.clients.write().remove(&id).is_some();
        if removed {
            debug!(client = %id, "Streaming client unsubscribed");
        }
        removed
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Serialize and fan out one event. Returns how many clients accepted it.
    pub fn send<T: Serialize>(&self, event_type: EventType, payload: &T) -> Result<usize> {
        let frame = encode(event_type, payload)?;
        Ok(self.send_frame(frame))
    }

    /// Fan out an already encoded frame, evicting clients that cannot keep up.
    pub fn send_frame(&self, frame: Arc<str>) -> usize {
        let mut delivered = 0;
        let mut evicted = Vec::new();
        {
            let clients = self.clients.read();
            for (id, sender) in clients.iter() {
                match sender.try_send(frame.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(client = %id, "Client queue full, evicting");
                        evicted.push(*id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!(client = %id, "Client queue closed");
                        evicted.push(*id);
                    }
                }
            }
        }

        if !evicted.is_empty() {
            let mut clients = self.clients.write();
            for id in &evicted {
                clients.remove(id);
            }
        }
        trace!(delivered, evicted = evicted.len(), "Broadcast frame");
        delivered
    }
}

/// A frame written to a streaming client's transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Text(Arc<str>),
    /// Idle keep-alive probe.
    Ping,
}

/// Why a client session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    /// The hub dropped the client's queue.
    Evicted,
    /// Writing a frame or probe failed.
    WriteFailed,
    Shutdown,
}

/// Drive one client: forward queued frames to `sink` and probe it while idle.
///
/// Any write failure ends the session. The client is unsubscribed from the
/// hub before returning.
pub async fn serve_client<S>(
    hub: &BroadcastHub,
    subscription: Subscription,
    mut sink: S,
    keepalive: Duration,
    cancel: CancellationToken,
) -> ClientExit
where
    S: Sink<ClientFrame> + Unpin,
    S::Error: std::fmt::Display,
{
    let Subscription { id, mut frames } = subscription;
    let mut probe = tokio::time::interval_at(Instant::now() + keepalive, keepalive);
    probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        tokio::select! {
            _ = cancel.cancelled() => break ClientExit::Shutdown,
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    break ClientExit::Evicted;
                };
                if let Err(e) = sink.send(ClientFrame::Text(frame)).await {
                    warn!(client = %id, error = %e, "Client write failed");
                    break ClientExit::WriteFailed;
                }
                probe.reset();
            }
            _ = probe.tick() => {
                if let Err(e) = sink.send(ClientFrame::Ping).await {
                    warn!(client = %id, error = %e, "Keep-alive probe failed");
                    break ClientExit::WriteFailed;
                }
            }
        }
    };

    hub.unsubscribe(id);
    info!(client = %id, ?exit, "Streaming client finished");
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as futures_mpsc;
    use futures::StreamExt;

    #[test]
    fn envelope_shape() {
        let frame = encode(EventType::Chat, &serde_json::json!({"car_id": 3})).unwrap();
        assert_eq!(&*frame, r#"{"event_type":"chat","message":{"car_id":3}}"#);
    }

    #[tokio::test]
    async fn initial_frame_comes_first() {
        let hub = BroadcastHub::new(4);
        let mut subscription = hub.subscribe(Arc::from("hello"));
        hub.send_frame(Arc::from("next"));

        assert_eq!(&*subscription.frames.recv().await.unwrap(), "hello");
        assert_eq!(&*subscription.frames.recv().await.unwrap(), "next");
    }

    #[tokio::test]
    async fn full_queue_evicts_only_the_slow_client() {
        let hub = BroadcastHub::new(2);
        let mut fast = hub.subscribe(Arc::from("init"));
        let _slow = hub.subscribe(Arc::from("init"));

        for n in 0..3 {
            fast.frames.try_recv().ok();
            hub.send_frame(Arc::from(format!("frame {n}")));
        }

        assert_eq!(hub.client_count(), 1);
        assert_eq!(hub.send_frame(Arc::from("after")), 1);
    }

    #[tokio::test]
    async fn dropped_receiver_is_evicted() {
        let hub = BroadcastHub::new(8);
        let subscription = hub.subscribe(Arc::from("init"));
        drop(subscription);

        assert_eq!(hub.send_frame(Arc::from("x")), 0);
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_client_is_probed() {
        let hub = BroadcastHub::new(8);
        let subscription = hub.subscribe(Arc::from("init"));
        let (sink, mut written) = futures_mpsc::unbounded::<ClientFrame>();
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            async move { serve_client(&hub, subscription, sink, Duration::from_secs(10), cancel).await }
        };
        let handle = tokio::spawn(task);

        assert_eq!(written.next().await, Some(ClientFrame::Text(Arc::from("init"))));
        assert_eq!(written.next().await, Some(ClientFrame::Ping));

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), ClientExit::Shutdown);
    }

    #[tokio::test]
    async fn write_failure_disconnects() {
        let hub = BroadcastHub::new(8);
        let subscription = hub.subscribe(Arc::from("init"));
        let (sink, written) = futures_mpsc::unbounded::<ClientFrame>();
        drop(written);

        let exit = serve_client(
            &hub,
            subscription,
            sink,
            Duration::from_secs(10),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(exit, ClientExit::WriteFailed);
        assert_eq!(hub.client_count(), 0);
    }
}
