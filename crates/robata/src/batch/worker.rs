//! Per-chunk worker: one streaming invocation with bounded retries.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};

use super::event::{BatchEvent, ItemResult, ItemStatus};
use super::queue_item::ChunkTask;
use crate::client::{ChatClient, ChatRequest, SamplingParams};
use crate::error::ClientError;

/// Total attempts per chunk before its slot is recorded as failed.
pub const MAX_ATTEMPTS: u32 = 3;

/// Prefix of the synthetic text recorded for a permanently failed chunk.
pub const ERROR_MARKER_PREFIX: &str = "错误: ";

/// Synthetic text recorded for a chunk resolved by cancellation.
pub const CANCELLED_MARKER: &str = "已取消";

/// Shared state of one batch job, visible to every worker in its pool.
///
/// The result map is keyed by chunk index; index uniqueness is guaranteed
/// upstream, so concurrent insertion needs no coordination beyond the map
/// lock. The processed counter is the only other cross-worker mutation and is
/// atomic.
pub(crate) struct WorkerContext<C> {
    /// Shared chat client the workers dispatch through
    pub client: Arc<C>,
    /// Model identifier for every request in the job
    pub model: String,
    /// System prompt for every request in the job
    pub prompt: String,
    /// Sampling parameters for every request in the job
    pub sampling: SamplingParams,
    /// Initial retry delay; doubles per attempt
    pub base_delay: Duration,
    /// Number of chunks in the job
    pub total: usize,
    /// Event channel feeding the job's [`BatchHandle`](super::BatchHandle)
    pub events: mpsc::UnboundedSender<BatchEvent>,
    /// Index-keyed resolution records
    pub results: Mutex<BTreeMap<usize, ItemResult>>,
    /// Count of resolved chunks
    pub processed: AtomicUsize,
}

impl<C: ChatClient> WorkerContext<C> {
    /// Processes one chunk to resolution: streams it through the client,
    /// retrying with exponential backoff, and records the outcome.
    ///
    /// Every call resolves the task's index exactly once, whether the stream
    /// succeeded or the retry ceiling was exhausted.
    pub(crate) async fn run_task(&self, task: ChunkTask) {
        for attempt in 0..MAX_ATTEMPTS {
            match self.stream_once(&task).await {
                Ok(text) => {
                    self.resolve(task.index(), text, ItemStatus::Ok).await;
                    return;
                }
                Err(err) if attempt + 1 < MAX_ATTEMPTS => {
                    tracing::warn!(
                        index = task.index(),
                        attempt,
                        error = %err,
                        "chunk attempt failed, backing off"
                    );
                    tokio::time::sleep(self.base_delay * 2u32.pow(attempt)).await;
                }
                Err(err) => {
                    tracing::error!(
                        index = task.index(),
                        error = %err,
                        "chunk failed permanently, recording error marker"
                    );
                    self.resolve(
                        task.index(),
                        format!("{ERROR_MARKER_PREFIX}{err}"),
                        ItemStatus::Failed,
                    )
                    .await;
                    return;
                }
            }
        }
    }

    /// One streaming attempt. The accumulator starts empty on every attempt,
    /// so consumers watching item events see the text restart after a retry.
    async fn stream_once(&self, task: &ChunkTask) -> Result<String, ClientError> {
        let request = ChatRequest::new(
            task.text(),
            self.model.as_str(),
            self.prompt.as_str(),
            self.sampling,
        );
        let mut fragments = self.client.stream(request).await?;

        let mut accumulated = String::new();
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            if fragment.is_empty() {
                continue;
            }
            accumulated.push_str(&fragment);
            let _ = self.events.send(BatchEvent::Item {
                index: task.index(),
                text: accumulated.clone(),
                failed: false,
            });
        }
        Ok(accumulated)
    }

    /// Records the outcome for `index` and emits the progress snapshot and
    /// the completion-signal item event.
    pub(crate) async fn resolve(&self, index: usize, text: String, status: ItemStatus) {
        let failed = status != ItemStatus::Ok;
        {
            let mut results = self.results.lock().await;
            results.insert(
                index,
                ItemResult {
                    index,
                    text: text.clone(),
                    status,
                },
            );
        }
        let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.events.send(BatchEvent::Progress {
            total: self.total,
            processed,
        });
        let _ = self.events.send(BatchEvent::Item {
            index,
            text,
            failed,
        });
    }
}
