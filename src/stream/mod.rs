//! Rate-controlled streams over published state

mod sample;

pub use sample::sample_latest;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::types::UpdateRate;

/// Stream the values published on `receiver` at the requested rate.
///
/// The current value is yielded immediately. The stream ends when the
/// publishing side is dropped.
pub fn watch_updates<T>(receiver: watch::Receiver<T>, rate: UpdateRate) -> BoxStream<'static, T>
where
    T: Clone + Send + Sync + 'static,
{
    match rate.sample_interval() {
        None => WatchStream::new(receiver).boxed(),
        Some(period) => sample_latest(receiver, period),
    }
}
