//! # Comparison Merger
//!
//! Runs the same input through up to three models concurrently for
//! side-by-side comparison.
//!
//! "Merge" refers purely to concurrent scheduling and joint observation: no
//! content is exchanged between the runs. Each model owns its accumulated
//! text and surfaces it on its own stream every time a new fragment arrives,
//! so a caller can render the outputs live next to each other.
//!
//! Unlike batch dispatch there is no retry: a run that fails stops emitting
//! and its stream ends, while the other runs continue to completion
//! undisturbed.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::client::{ChatClient, ChatRequest, SamplingParams};
use crate::communication::ItemStream;
use crate::error::BatchError;

/// Upper bound on concurrent comparison runs.
pub const MAX_COMPARISON_STREAMS: usize = 3;

/// One participant in a comparison: a model and its sampling parameters.
///
/// All participants share the same input text and prompt; sampling may differ
/// per model.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonEntry {
    /// Model identifier.
    pub model: String,
    /// Sampling parameters for this model's run.
    pub sampling: SamplingParams,
}

/// Live output stream of one comparison run.
///
/// Yields the run's accumulated text after every non-empty fragment and ends
/// when the run completes or fails. Failure of one run never blocks the
/// others.
pub struct ComparisonStream {
    model: String,
    inner: ItemStream<String>,
}

impl ComparisonStream {
    /// Model this stream belongs to.
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for ComparisonStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComparisonStream")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Stream for ComparisonStream {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

/// Concurrent multi-model runner over a shared [`ChatClient`].
pub struct ComparisonMerger<C> {
    client: Arc<C>,
}

impl<C> ComparisonMerger<C>
where
    C: ChatClient + 'static,
{
    /// Creates a merger over `client`.
    pub fn new(client: C) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Creates a merger sharing an existing client.
    pub fn from_shared(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Starts one concurrent run per entry and returns their output streams,
    /// in entry order. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::TooManyComparisons`] for more than
    /// [`MAX_COMPARISON_STREAMS`] entries, before any run starts.
    pub fn run(
        &self,
        text: &str,
        prompt: &str,
        entries: Vec<ComparisonEntry>,
    ) -> Result<Vec<ComparisonStream>, BatchError> {
        if entries.len() > MAX_COMPARISON_STREAMS {
            return Err(BatchError::TooManyComparisons {
                requested: entries.len(),
                limit: MAX_COMPARISON_STREAMS,
            });
        }

        let streams = entries
            .into_iter()
            .map(|entry| {
                let (tx, rx) = mpsc::unbounded_channel();
                let request =
                    ChatRequest::new(text, entry.model.as_str(), prompt, entry.sampling);
                let client = self.client.clone();
                let model = entry.model.clone();

                tokio::spawn(async move {
                    if let Err(err) = accumulate(client, request, tx).await {
                        // This run is done; the other streams keep going
                        tracing::warn!(model = %model, error = %err, "comparison run failed");
                    }
                });

                ComparisonStream {
                    model: entry.model,
                    inner: ItemStream::new(rx),
                }
            })
            .collect();

        Ok(streams)
    }
}

/// Streams one run, sending the accumulated text after each non-empty
/// fragment. Dropping the sender on return (ok or error) ends the stream.
async fn accumulate<C: ChatClient>(
    client: Arc<C>,
    request: ChatRequest,
    tx: mpsc::UnboundedSender<String>,
) -> Result<(), crate::error::ClientError> {
    let mut fragments = client.stream(request).await?;
    let mut accumulated = String::new();
    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        if fragment.is_empty() {
            continue;
        }
        accumulated.push_str(&fragment);
        let _ = tx.send(accumulated.clone());
    }
    Ok(())
}
