//! Administrative operations toward the race server

use tracing::info;

use super::RaceControl;
use crate::Result;
use crate::provider::ControlCommand;
use crate::types::DriverGuid;
use crate::weather::{WeatherProgress, WeatherTransition};

impl RaceControl {
    /// Chat message to every driver.
    pub async fn broadcast_chat(&self, message: impl Into<String>) -> Result<()> {
        self.control.send(ControlCommand::BroadcastChat { message: message.into() }).await
    }

    /// Private chat message to one connected driver.
    pub async fn send_chat(&self, guid: &DriverGuid, message: impl Into<String>) -> Result<()> {
        let car_id = self.registry.connected_driver(guid)?.lock().car_info.car_id;
        self.control.send(ControlCommand::SendChat { car_id, message: message.into() }).await
    }

    /// Remove a connected driver from the server.
    ///
    /// The driver leaves the registry when the server reports the disconnect.
    pub async fn kick(&self, guid: &DriverGuid) -> Result<()> {
        let car_id = self.registry.connected_driver(guid)?.lock().car_info.car_id;
        info!(guid = %guid, car_id, "Kicking driver");
        self.control.send(ControlCommand::KickUser { car_id }).await
    }

    pub async fn next_session(&self) -> Result<()> {
        info!("Requesting next session");
        self.control.send(ControlCommand::NextSession).await
    }

    pub async fn restart_session(&self) -> Result<()> {
        info!("Requesting session restart");
        self.control.send(ControlCommand::RestartSession).await
    }

    /// Begin a weather transition, stepped to every connected car.
    ///
    /// Fails with [`AlreadyTransitioning`](crate::RaceControlError::AlreadyTransitioning)
    /// while another transition runs.
    pub fn start_weather_transition(&self, transition: WeatherTransition) -> Result<()> {
        let registry = self.registry.clone();
        self.weather.start(transition, self.control.clone(), move || registry.connected_car_ids())
    }

    pub fn weather_progress(&self) -> Option<WeatherProgress> {
        self.weather.progress()
    }
}
