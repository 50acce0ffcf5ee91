//! Pump feeding telemetry from a source into race control

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::controller::RaceControl;
use crate::provider::TelemetrySource;

const MAX_ERRORS: u32 = 10;

/// Why a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The source reported that the server stopped.
    SourceEnded,
    /// The source failed [`MAX_ERRORS`] times in a row.
    TooManyErrors,
    Cancelled,
}

/// Handle to a running pump.
pub struct PumpHandle {
    /// Cancel to stop reading. Cancelling does not count as the server stopping.
    pub cancel: CancellationToken,
    pub task: JoinHandle<PumpExit>,
}

/// Owns a telemetry source and hands its events to the controller in order.
pub struct Pump;

impl Pump {
    /// Spawn a pump for `source`.
    ///
    /// When the source ends (or keeps failing) the controller's source-stopped
    /// path runs: the snapshot is saved and every driver disconnected.
    pub fn spawn<S>(source: S, controller: Arc<RaceControl>) -> PumpHandle
    where
        S: TelemetrySource,
    {
        let (done_tx, done_rx) = oneshot::channel();
        controller.watch_source_stopped(done_rx);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Self::run(source, controller, done_tx, cancel.clone()));

        PumpHandle { cancel, task }
    }

    async fn run<S>(
        mut source: S,
        controller: Arc<RaceControl>,
        done: oneshot::Sender<()>,
        cancel: CancellationToken,
    ) -> PumpExit
    where
        S: TelemetrySource,
    {
        info!("Telemetry pump started");
        let mut message_count = 0u64;
        let mut error_count = 0u32;

        let exit = loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break PumpExit::Cancelled,
                result = source.next_message() => result,
            };

            match result {
                Ok(Some(message)) => {
                    message_count += 1;
                    error_count = 0;
                    controller.handle(message).await;
                }
                Ok(None) => {
                    info!(message_count, "Telemetry source ended");
                    break PumpExit::SourceEnded;
                }
                Err(e) => {
                    error_count += 1;
                    error!(error = %e, error_count, max = MAX_ERRORS, "Telemetry source error");
                    if error_count >= MAX_ERRORS {
                        error!("Too many telemetry source errors, giving up");
                        break PumpExit::TooManyErrors;
                    }

                    // 50ms, 100ms, 200ms, ... capped at 1.6s
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break PumpExit::Cancelled,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        };

        if exit != PumpExit::Cancelled {
            // Receiver is gone only if the controller was dropped.
            if done.send(()).is_err() {
                debug!("Source-stopped observer already gone");
            }
        }

        info!(?exit, message_count, "Telemetry pump ended");
        exit
    }
}
