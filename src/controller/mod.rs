//! Session controller
//!
//! [`RaceControl`] owns the live timing state for one race server. Telemetry
//! events enter through [`RaceControl::handle`], one at a time and in arrival
//! order; each handler mutates the [`DriverRegistry`] and decides whether the
//! event warrants a broadcast.
//!
//! Work that runs beside dispatch:
//!
//! - per-car update lanes ([`CarLanes`])
//! - the driver timeout sweep
//! - the session info poll, restarted by every version and new-session event
//! - the source-stopped observer ([`RaceControl::watch_source_stopped`])
//!
//! These only touch shared state through the registry's locks, in the order
//! documented in [`crate::registry`]. The timeout sweep and the source-stopped
//! observer also hold the dispatch lock while they disconnect drivers.

mod admin;
mod chat;
mod connections;
mod session;
#[cfg(test)]
mod tests;

pub use chat::ChatCommand;

use futures::Sink;
use futures::stream::BoxStream;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::broadcast::{self, BroadcastHub, ClientExit, ClientFrame, Subscription};
use crate::config::RaceControlConfig;
use crate::lanes::CarLanes;
use crate::provider::{ServerControl, SnapshotStore, TrackDataProvider};
use crate::registry::DriverRegistry;
use crate::stream::watch_updates;
use crate::types::{
    ConnectionKind, EventType, LiveTimingState, Message, Session, SessionInfoKind, SessionType,
    TrackInfo, TrackMap, UpdateRate,
};
use crate::weather::WeatherScheduler;
use crate::Result;

/// Session metadata and the track data fetched for it.
#[derive(Default)]
struct SessionState {
    session: Option<Session>,
    track_info: Option<TrackInfo>,
    track_map: Option<TrackMap>,
}

/// Live timing engine for one race server.
///
/// Create with [`RaceControl::new`] inside a Tokio runtime. Dropping the last
/// handle stops every background task.
pub struct RaceControl {
    config: RaceControlConfig,
    tracks: Arc<dyn TrackDataProvider>,
    store: Arc<dyn SnapshotStore>,
    control: Arc<dyn ServerControl>,
    registry: Arc<DriverRegistry>,
    hub: Arc<BroadcastHub>,
    lanes: CarLanes,
    weather: Arc<WeatherScheduler>,
    session: RwLock<SessionState>,
    /// Serializes event dispatch.
    dispatch: tokio::sync::Mutex<()>,
    state_tx: watch::Sender<Arc<LiveTimingState>>,
    session_poll: Mutex<Option<CancellationToken>>,
    cancel: CancellationToken,
}

impl RaceControl {
    pub fn new(
        config: RaceControlConfig,
        tracks: Arc<dyn TrackDataProvider>,
        store: Arc<dyn SnapshotStore>,
        control: Arc<dyn ServerControl>,
    ) -> Arc<Self> {
        let cancel = CancellationToken::new();
        let registry = Arc::new(DriverRegistry::new(SessionType::Practice));
        let hub = Arc::new(BroadcastHub::new(config.client_queue_capacity));
        let lanes = CarLanes::new(registry.clone(), hub.clone(), cancel.child_token());
        let weather =
            Arc::new(WeatherScheduler::new(config.weather_step_interval, cancel.child_token()));
        let (state_tx, _) = watch::channel(Arc::new(LiveTimingState::default()));

        let controller = Arc::new(Self {
            config,
            tracks,
            store,
            control,
            registry,
            hub,
            lanes,
            weather,
            session: RwLock::new(SessionState::default()),
            dispatch: tokio::sync::Mutex::new(()),
            state_tx,
            session_poll: Mutex::new(None),
            cancel,
        });

        Self::spawn_timeout_sweep(Arc::downgrade(&controller));
        info!("Race control started");
        controller
    }

    pub fn config(&self) -> &RaceControlConfig {
        &self.config
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Handle one telemetry event.
    ///
    /// Failures are logged with the event type and never stop the controller.
    pub async fn handle(&self, message: Message) {
        let event = message.event_type();
        let car_id = message.car_id();
        if let Err(e) = self.process(message).await {
            if e.is_fatal() {
                error!(%event, ?car_id, error = %e, category = ?e.category(), "Event handling aborted");
            } else {
                warn!(%event, ?car_id, error = %e, category = ?e.category(), "Dropped event");
            }
        }
    }

    /// Handle one telemetry event, returning whether it was broadcast.
    pub async fn process(&self, message: Message) -> Result<bool> {
        let _dispatch = self.dispatch.lock().await;
        let event = message.event_type();

        let broadcast = match message {
            Message::Version(version) => {
                info!(protocol = version.protocol, "Race server announced itself");
                self.restart_session_poll();
                true
            }
            Message::SessionInfo(info) => match info.kind {
                SessionInfoKind::New => {
                    self.start_new_session(&info).await?;
                    true
                }
                SessionInfoKind::Update => self.update_session(&info),
            },
            Message::EndSession(end) => {
                info!(results = %end.results_path, "Session ended");
                false
            }
            Message::CarUpdate(update) => {
                // Broadcast by the car's lane once applied.
                self.lanes.dispatch(update)?;
                false
            }
            Message::SessionCarInfo(info) => match info.kind {
                ConnectionKind::Connect => {
                    self.connect(&info);
                    true
                }
                ConnectionKind::Disconnect => {
                    self.disconnect(info.car_id, &info.driver_guid)?;
                    true
                }
            },
            Message::ClientLoaded(loaded) => {
                self.client_loaded(loaded.car_id)?;
                true
            }
            Message::CollisionWithCar(collision) => {
                self.collision_with_car(&collision)?;
                true
            }
            Message::CollisionWithEnvironment(collision) => {
                self.collision_with_environment(&collision)?;
                true
            }
            Message::LapCompleted(lap) => {
                self.lap_completed(&lap)?;
                true
            }
            Message::Chat(chat) => {
                self.chat(&chat).await?;
                false
            }
            Message::Other { code } => {
                trace!(code, "Ignoring unhandled event");
                false
            }
        };

        if broadcast {
            self.broadcast(event);
        }
        Ok(broadcast)
    }

    /// Point-in-time copy of the full live timing state.
    pub fn state(&self) -> LiveTimingState {
        let (session, track_info, track_map) = {
            let state = self.session.read();
            (state.session.clone(), state.track_info.clone(), state.track_map.clone())
        };
        LiveTimingState {
            session,
            track_info,
            track_map,
            car_ids: self.registry.car_ids(),
            connected: self.registry.connected().snapshot(),
            disconnected: self.registry.disconnected().snapshot(),
        }
    }

    /// Register a streaming client. The full state is queued as its first frame.
    pub fn subscribe(&self) -> Result<Subscription> {
        let initial = broadcast::encode(EventType::RaceControl, &self.state())?;
        Ok(self.hub.subscribe(initial))
    }

    /// Subscribe and serve a streaming client until it disconnects.
    pub async fn serve_client<S>(&self, sink: S) -> Result<ClientExit>
    where
        S: Sink<ClientFrame> + Unpin,
        S::Error: std::fmt::Display,
    {
        let subscription = self.subscribe()?;
        Ok(broadcast::serve_client(
            &self.hub,
            subscription,
            sink,
            self.config.keepalive_interval,
            self.cancel.child_token(),
        )
        .await)
    }

    pub fn client_count(&self) -> usize {
        self.hub.client_count()
    }

    /// Full state after every broadcast, for in-process consumers.
    ///
    /// The latest state is yielded immediately.
    pub fn state_updates(&self, rate: UpdateRate) -> BoxStream<'static, Arc<LiveTimingState>> {
        watch_updates(self.state_tx.subscribe(), rate)
    }

    /// Publish the current state and send it to every streaming client.
    fn broadcast(&self, event: EventType) {
        let state = Arc::new(self.state());
        self.state_tx.send_replace(state.clone());

        match self.hub.send(event, &*state) {
            Ok(delivered) => debug!(%event, delivered, "Broadcast state"),
            Err(e) => warn!(%event, error = %e, "Failed to broadcast state"),
        }
    }

    fn spawn_timeout_sweep(controller: Weak<Self>) {
        let Some(strong) = controller.upgrade() else {
            return;
        };
        let period = strong.config.timeout_sweep_interval;
        let cancel = strong.cancel.clone();
        drop(strong);

        tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticks.tick() => {}
                }
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                controller.sweep_timeouts().await;
            }
            debug!("Timeout sweep stopped");
        });
    }
}

impl Drop for RaceControl {
    fn drop(&mut self) {
        debug!("Dropping race control");
        self.cancel.cancel();
    }
}
