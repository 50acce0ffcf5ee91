//! Latest-wins sampling of a watch channel

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// Emit the current value, then at most one value per `period`.
///
/// Values published between ticks collapse into the latest one; a tick with
/// nothing new emits nothing.
pub fn sample_latest<T>(receiver: watch::Receiver<T>, period: Duration) -> BoxStream<'static, T>
where
    T: Clone + Send + Sync + 'static,
{
    let mut ticks = interval_at(Instant::now() + period, period);
    // Don't burst after a slow consumer.
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    stream::unfold((receiver, ticks, true), |(mut receiver, mut ticks, first)| async move {
        if first {
            let value = receiver.borrow_and_update().clone();
            return Some((value, (receiver, ticks, false)));
        }
        next_change(&mut receiver, &mut ticks)
            .await
            .map(|value| (value, (receiver, ticks, false)))
    })
    .boxed()
}

async fn next_change<T: Clone>(receiver: &mut watch::Receiver<T>, ticks: &mut Interval) -> Option<T> {
    loop {
        ticks.tick().await;
        match receiver.has_changed() {
            Ok(true) => return Some(receiver.borrow_and_update().clone()),
            Ok(false) => continue,
            // Publisher dropped.
            Err(_) => return None,
        }
    }
}
