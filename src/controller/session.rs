//! Session transitions and the session info poll

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::RaceControl;
use crate::Result;
use crate::provider::ControlCommand;
use crate::types::{Session, SessionInfo, SessionSignature, SessionType};

impl RaceControl {
    pub(super) fn current_signature(&self) -> Option<SessionSignature> {
        self.session.read().session.as_ref().map(Session::signature)
    }

    pub(super) fn session_type(&self) -> SessionType {
        self.session.read().session.as_ref().map_or(SessionType::Practice, |s| s.session_type)
    }

    /// Switch to a new session.
    ///
    /// A practice session restarting with the same signature keeps every
    /// driver record; anything else starts from blank records. Track metadata
    /// is fetched first and its failure aborts the transition untouched.
    pub(super) async fn start_new_session(&self, info: &SessionInfo) -> Result<()> {
        let now = Utc::now();
        let signature = info.signature();
        let previous = self.current_signature();
        let looped = !self.registry.is_empty()
            && signature.session_type.is_practice_like()
            && previous.as_ref() == Some(&signature);

        let track_info = match self.tracks.track_info(&info.track, &info.track_layout).await {
            Ok(track_info) => track_info,
            Err(e) => {
                error!(track = %info.track, layout = %info.track_layout, error = %e, "Track info unavailable");
                return Err(e);
            }
        };
        let track_map = match self.tracks.track_map(&info.track, &info.track_layout).await {
            Ok(map) => Some(map),
            Err(e) => {
                warn!(track = %info.track, layout = %info.track_layout, error = %e, "Track map unavailable");
                None
            }
        };

        if looped {
            self.registry.restart_lap_clocks(now);
        } else {
            self.registry.reset_for_fresh_session(now);
        }
        self.registry.set_session_type(signature.session_type);

        {
            let mut state = self.session.write();
            state.session = Some(Session::from_info(info, now));
            state.track_info = Some(track_info);
            state.track_map = track_map;
        }

        info!(
            session_type = %signature.session_type,
            track = %signature.track,
            layout = %signature.layout,
            name = %signature.name,
            looped,
            "New session"
        );

        self.recover_snapshot(&signature).await;
        self.restart_session_poll();
        Ok(())
    }

    /// Patch the running session. Returns whether anything changed.
    pub(super) fn update_session(&self, info: &SessionInfo) -> bool {
        let mut state = self.session.write();
        let Some(session) = state.session.as_mut() else {
            debug!("Session update before any session, ignoring");
            return false;
        };
        let changed = session.apply_update(info);
        if changed {
            debug!(
                ambient = session.ambient_temp,
                road = session.road_temp,
                weather = %session.weather_id,
                elapsed_ms = session.elapsed_ms,
                "Session updated"
            );
        }
        changed
    }

    /// Bring back persisted drivers of this session that are not live.
    async fn recover_snapshot(&self, signature: &SessionSignature) {
        let snapshot = match self.store.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to load live timing snapshot");
                return;
            }
        };

        if !snapshot.matches(signature) {
            debug!(saved_track = %snapshot.track, saved_name = %snapshot.session_name, "Snapshot belongs to another session");
            return;
        }

        let restored = self.registry.restore(snapshot.drivers.into_values());
        info!(restored, saved_at = %snapshot.saved_at, "Recovered drivers from snapshot");
    }

    /// (Re)start polling the server for session info.
    pub(super) fn restart_session_poll(&self) {
        let token = self.cancel.child_token();
        if let Some(previous) = self.session_poll.lock().replace(token.clone()) {
            previous.cancel();
        }

        let control = self.control.clone();
        let period = self.config.session_poll_interval;
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticks.tick() => {}
                }
                if let Err(e) = control.send(ControlCommand::GetSessionInfo).await {
                    warn!(error = %e, "Session info poll failed");
                }
            }
            debug!("Session info poll stopped");
        });
    }

    pub(super) fn stop_session_poll(&self) {
        if let Some(token) = self.session_poll.lock().take() {
            token.cancel();
        }
    }
}
