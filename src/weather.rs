//! Weather transition scheduler
//!
//! A transition blends from one set of conditions to another over a fixed
//! duration. Each step computes the interpolated conditions and sends one
//! [`ControlCommand::Weather`] per connected car. Only one transition runs
//! at a time; starting another while one is active fails with
//! [`RaceControlError::AlreadyTransitioning`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::provider::{ControlCommand, ServerControl};
use crate::types::CarId;
use crate::{RaceControlError, Result};

/// Weather at one end of a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherConditions {
    pub graphics: String,
    pub ambient_temp: f32,
    pub road_temp: f32,
    pub wind_speed: f32,
    pub wind_direction: f32,
}

/// A requested transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherTransition {
    pub from: WeatherConditions,
    pub to: WeatherConditions,
    pub duration: Duration,
}

/// Interpolated conditions sent to cars for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherUpdate {
    pub from_graphics: String,
    pub to_graphics: String,
    /// Blend factor, 0.0 at the start of the transition and 1.0 at the end.
    pub transition: f32,
    pub ambient_temp: f32,
    pub road_temp: f32,
    pub wind_speed: f32,
    pub wind_direction: f32,
}

impl WeatherTransition {
    /// Conditions at blend factor `t`, clamped to `0.0..=1.0`.
    pub fn interpolate(&self, t: f32) -> WeatherUpdate {
        let t = t.clamp(0.0, 1.0);
        let lerp = |a: f32, b: f32| a + (b - a) * t;
        WeatherUpdate {
            from_graphics: self.from.graphics.clone(),
            to_graphics: self.to.graphics.clone(),
            transition: t,
            ambient_temp: lerp(self.from.ambient_temp, self.to.ambient_temp),
            road_temp: lerp(self.from.road_temp, self.to.road_temp),
            wind_speed: lerp(self.from.wind_speed, self.to.wind_speed),
            wind_direction: lerp(self.from.wind_direction, self.to.wind_direction),
        }
    }

    fn step_count(&self, step_interval: Duration) -> u32 {
        let steps = self.duration.as_secs_f64() / step_interval.as_secs_f64();
        (steps.ceil() as u32).max(1)
    }
}

/// Progress of the running transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherProgress {
    pub transition: WeatherTransition,
    pub started_at: DateTime<Utc>,
    pub step: u32,
    pub total_steps: u32,
}

impl WeatherProgress {
    pub fn fraction(&self) -> f32 {
        self.step as f32 / self.total_steps as f32
    }
}

/// Runs weather transitions in the background.
pub struct WeatherScheduler {
    step_interval: Duration,
    in_progress: AtomicBool,
    current: Mutex<Option<WeatherProgress>>,
    cancel: CancellationToken,
}

impl WeatherScheduler {
    pub fn new(step_interval: Duration, cancel: CancellationToken) -> Self {
        Self { step_interval, in_progress: AtomicBool::new(false), current: Mutex::new(None), cancel }
    }

    /// Whether a transition is running.
    pub fn is_transitioning(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Progress of the running transition, if any.
    pub fn progress(&self) -> Option<WeatherProgress> {
        self.current.lock().clone()
    }

    /// Start a transition.
    ///
    /// `targets` is called on every step to list the cars that should receive
    /// it, so drivers joining mid-transition pick it up.
    pub fn start<F>(
        self: &Arc<Self>,
        transition: WeatherTransition,
        control: Arc<dyn ServerControl>,
        targets: F,
    ) -> Result<()>
    where
        F: Fn() -> Vec<CarId> + Send + 'static,
    {
        if transition.duration.is_zero() {
            return Err(RaceControlError::InvalidWeatherTransition {
                reason: "duration must be greater than zero".to_string(),
            });
        }

        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RaceControlError::AlreadyTransitioning);
        }

        let total_steps = transition.step_count(self.step_interval);
        info!(
            from = %transition.from.graphics,
            to = %transition.to.graphics,
            duration_secs = transition.duration.as_secs(),
            total_steps,
            "Starting weather transition"
        );

        *self.current.lock() = Some(WeatherProgress {
            transition: transition.clone(),
            started_at: Utc::now(),
            step: 0,
            total_steps,
        });

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.run(transition, total_steps, control, targets).await;
        });

        Ok(())
    }

    async fn run<F>(
        &self,
        transition: WeatherTransition,
        total_steps: u32,
        control: Arc<dyn ServerControl>,
        targets: F,
    ) where
        F: Fn() -> Vec<CarId> + Send + 'static,
    {
        for step in 1..=total_steps {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(step, "Weather transition cancelled");
                    break;
                }
                _ = tokio::time::sleep(self.step_interval) => {}
            }

            let update = transition.interpolate(step as f32 / total_steps as f32);
            for car_id in targets() {
                let command = ControlCommand::Weather { car_id, update: update.clone() };
                if let Err(e) = control.send(command).await {
                    warn!(car_id, "Failed to send weather step: {}", e);
                }
            }

            if let Some(progress) = self.current.lock().as_mut() {
                progress.step = step;
            }
        }

        *self.current.lock() = None;
        self.in_progress.store(false, Ordering::Release);
        info!(to = %transition.to.graphics, "Weather transition finished");
    }
}
