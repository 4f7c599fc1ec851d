use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

/// # ItemStream
///
/// An asynchronous stream wrapper around a Tokio unbounded channel receiver.
///
/// Every caller-facing incremental output in this crate (batch events,
/// per-model accumulated text) is delivered through an `ItemStream`. Worker
/// tasks hold the sender side; dropping all senders ends the stream, which is
/// how jobs signal completion without a separate sentinel value.
///
/// ## Implementation Details
///
/// Backed by `tokio::sync::mpsc::unbounded_channel`, which means:
/// - `poll_next` never blocks, even when the channel is empty
/// - `None` is returned once all senders are dropped
/// - There is no backpressure; producers are bounded elsewhere (the batch
///   worker pool, the three-stream comparison cap)
pub struct ItemStream<T> {
    /// The underlying channel receiver
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> ItemStream<T> {
    /// Wraps a receiver whose senders are held by in-flight worker tasks.
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<T>) -> Self {
        Self { receiver }
    }
}

impl<T> Stream for ItemStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
