use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::{Mutex, mpsc};

use super::event::{BatchEvent, ItemResult, ItemStatus};
use super::queue_item::ChunkTask;
use super::worker::{CANCELLED_MARKER, ERROR_MARKER_PREFIX, WorkerContext};
use crate::chunk::split_text;
use crate::client::{ChatClient, SamplingParams};
use crate::communication::{ItemStream, Pill};
use crate::config::ModelRegistry;
use crate::error::BatchError;

/// Default initial retry delay; doubles per attempt.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Clonable cancellation flag for one batch job.
///
/// Once triggered, chunks still waiting in the queue resolve immediately with
/// a cancellation marker; chunks already in flight run to their own
/// resolution. Every index slot still resolves, and progress still reaches
/// the total, so consumers observe an orderly end rather than a truncated
/// job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been triggered.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Handle to one in-flight batch job.
///
/// Implements `Stream<Item = BatchEvent>`: progress snapshots, per-chunk
/// incremental output, and finally [`BatchEvent::Done`] with the aggregated
/// text, after which the stream ends.
pub struct BatchHandle {
    events: ItemStream<BatchEvent>,
    cancel: CancelToken,
    total: usize,
}

impl BatchHandle {
    /// Number of chunks in the job.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Returns a token that cancels the job's remaining queue.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Cancels the job's remaining queue.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drains the event stream and returns the final aggregated text.
    ///
    /// Convenience for callers that only want the end result; incremental
    /// events are discarded.
    pub async fn finish(mut self) -> String {
        let mut final_text = String::new();
        while let Some(event) = self.next().await {
            if let BatchEvent::Done { text } = event {
                final_text = text;
            }
        }
        final_text
    }
}

impl std::fmt::Debug for BatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchHandle")
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

impl Stream for BatchHandle {
    type Item = BatchEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().events).poll_next(cx)
    }
}

/// Batch dispatch engine: chunking, bounded fan-out, retry, aggregation.
///
/// Holds one shared [`ChatClient`] and an injected [`ModelRegistry`]. Each
/// [`submit`](BatchDispatcher::submit) resolves configuration up front, splits
/// the input, and spawns an independent job whose lifetime ends when every
/// chunk has resolved.
pub struct BatchDispatcher<C> {
    client: Arc<C>,
    registry: ModelRegistry,
    base_delay: Duration,
}

impl<C> BatchDispatcher<C>
where
    C: ChatClient + 'static,
{
    /// Creates a dispatcher over `client` with the given registry.
    pub fn new(client: C, registry: ModelRegistry) -> Self {
        Self {
            client: Arc::new(client),
            registry,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    /// Overrides the initial retry delay (doubles per attempt).
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// The injected registry.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Splits `text` against the model's token budget and dispatches the
    /// chunks. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails before any dispatch on an unknown model or an invalid chunking
    /// budget. Per-chunk failures after this point become error markers in
    /// the output, never errors from the job.
    pub fn submit(
        &self,
        text: &str,
        model: &str,
        prompt: &str,
        sampling: SamplingParams,
    ) -> Result<BatchHandle, BatchError> {
        let profile = self.registry.lookup(model)?;
        let max_concurrent = profile.max_concurrent;
        let chunks = split_text(text, profile.max_tokens)?;
        Ok(self.spawn_job(chunks, model, prompt, sampling, max_concurrent))
    }

    /// Dispatches pre-split chunks, skipping the chunking step.
    ///
    /// # Errors
    ///
    /// Fails on an unknown model, before any dispatch.
    pub fn dispatch_chunks(
        &self,
        chunks: Vec<String>,
        model: &str,
        prompt: &str,
        sampling: SamplingParams,
    ) -> Result<BatchHandle, BatchError> {
        let profile = self.registry.lookup(model)?;
        let max_concurrent = profile.max_concurrent;
        Ok(self.spawn_job(chunks, model, prompt, sampling, max_concurrent))
    }

    fn spawn_job(
        &self,
        chunks: Vec<String>,
        model: &str,
        prompt: &str,
        sampling: SamplingParams,
        max_concurrent: usize,
    ) -> BatchHandle {
        let total = chunks.len();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancelToken::new();

        let ctx = Arc::new(WorkerContext {
            client: self.client.clone(),
            model: model.to_string(),
            prompt: prompt.to_string(),
            sampling,
            base_delay: self.base_delay,
            total,
            events: events_tx,
            results: Mutex::new(BTreeMap::new()),
            processed: AtomicUsize::new(0),
        });

        // Index assignment happens here, single-threaded, before fan-out.
        let queue: Arc<Mutex<VecDeque<ChunkTask>>> = Arc::new(Mutex::new(
            chunks
                .into_iter()
                .enumerate()
                .map(|(index, text)| ChunkTask::new(index, text))
                .collect(),
        ));

        let _ = ctx.events.send(BatchEvent::Progress {
            total,
            processed: 0,
        });

        let worker_count = total.min(max_concurrent).max(1);
        let job_cancel = cancel.clone();
        let pill = Pill::new();

        tokio::spawn(async move {
            let moved_pill = pill;

            let mut joins = Vec::with_capacity(worker_count);
            for _ in 0..worker_count {
                let ctx = ctx.clone();
                let queue = queue.clone();
                let cancel = job_cancel.clone();
                joins.push(tokio::spawn(async move {
                    loop {
                        let task = { queue.lock().await.pop_front() };
                        let Some(task) = task else { break };
                        if cancel.is_cancelled() {
                            ctx.resolve(
                                task.index(),
                                CANCELLED_MARKER.to_string(),
                                ItemStatus::Cancelled,
                            )
                            .await;
                            continue;
                        }
                        ctx.run_task(task).await;
                    }
                }));
            }

            for join in joins {
                if let Err(err) = join.await {
                    tracing::error!(error = %err, "batch worker terminated abnormally");
                }
            }

            // A faulted worker leaves its popped task unresolved; back-fill
            // those slots so the index invariant holds.
            for index in 0..total {
                let missing = !ctx.results.lock().await.contains_key(&index);
                if missing {
                    ctx.resolve(
                        index,
                        format!("{ERROR_MARKER_PREFIX}worker fault"),
                        ItemStatus::Failed,
                    )
                    .await;
                }
            }

            let final_text = assemble(&*ctx.results.lock().await);
            let _ = ctx.events.send(BatchEvent::Progress {
                total,
                processed: ctx.processed.load(Ordering::SeqCst),
            });
            let _ = ctx.events.send(BatchEvent::Done { text: final_text });

            drop(moved_pill);
        });

        BatchHandle {
            events: ItemStream::new(events_rx),
            cancel,
            total,
        }
    }
}

/// Reassembles resolved chunks in index order: blank lines stripped per
/// chunk, chunks joined with a double line break.
fn assemble(results: &BTreeMap<usize, ItemResult>) -> String {
    results
        .values()
        .map(|result| {
            result
                .text
                .split('\n')
                .filter(|line| !line.trim().is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use futures::stream;
    use tokio::sync::Notify;

    use crate::client::{ChatClient, ChatRequest, DEFAULT_PROMPT, FragmentStream};
    use crate::config::{ModelProfile, SupplierProfile};
    use crate::error::{ClientError, ConfigError};

    /// Per-chunk behavior script, keyed by the request text.
    #[derive(Clone, Default)]
    struct ChunkScript {
        /// Fragments to stream on a successful attempt; defaults to echoing
        /// the request text as a single fragment.
        fragments: Vec<String>,
        /// Number of leading attempts that fail with a transport error.
        fail_first: usize,
        /// Simulated latency per attempt.
        delay: Duration,
    }

    /// Scripted client recording attempts, requests, and peak concurrency.
    #[derive(Default)]
    struct ScriptedClient {
        scripts: HashMap<String, ChunkScript>,
        attempts: Arc<StdMutex<HashMap<String, usize>>>,
        seen: Arc<StdMutex<Vec<ChatRequest>>>,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn stream(&self, request: ChatRequest) -> Result<FragmentStream, ClientError> {
            let script = self.scripts.get(&request.text).cloned().unwrap_or_default();
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let count = attempts.entry(request.text.clone()).or_insert(0);
                *count += 1;
                *count
            };
            self.seen.lock().unwrap().push(request.clone());

            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            if !script.delay.is_zero() {
                tokio::time::sleep(script.delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            if attempt <= script.fail_first {
                return Err(ClientError::Transport("injected failure".into()));
            }

            let fragments = if script.fragments.is_empty() {
                vec![request.text]
            } else {
                script.fragments
            };
            Ok(stream::iter(fragments.into_iter().map(Ok).collect::<Vec<_>>()).boxed())
        }
    }

    fn registry(max_concurrent: usize) -> ModelRegistry {
        ModelRegistry::new(
            HashMap::from([(
                "test-model".to_string(),
                ModelProfile {
                    supplier: "test".to_string(),
                    max_tokens: 100,
                    max_concurrent,
                },
            )]),
            HashMap::from([(
                "test".to_string(),
                SupplierProfile {
                    base_url: "http://localhost/v1".to_string(),
                    api_key: String::new(),
                },
            )]),
        )
        .unwrap()
    }

    fn dispatcher(client: ScriptedClient, max_concurrent: usize) -> BatchDispatcher<ScriptedClient> {
        BatchDispatcher::new(client, registry(max_concurrent))
            .with_base_delay(Duration::from_millis(1))
    }

    fn chunk_names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("chunk-{i}")).collect()
    }

    #[tokio::test]
    async fn test_results_preserve_input_order_regardless_of_completion() {
        // Chunk latency is inversely proportional to index, so completion
        // order is the reverse of input order
        let total = 5;
        let mut scripts = HashMap::new();
        for i in 0..total {
            scripts.insert(
                format!("chunk-{i}"),
                ChunkScript {
                    fragments: vec![format!("reply-{i}")],
                    delay: Duration::from_millis(((total - i) * 20) as u64),
                    ..Default::default()
                },
            );
        }
        let client = ScriptedClient {
            scripts,
            ..Default::default()
        };

        let handle = dispatcher(client, total)
            .dispatch_chunks(chunk_names(total), "test-model", "", SamplingParams::default())
            .unwrap();

        let text = handle.finish().await;
        assert_eq!(text, "reply-0\n\nreply-1\n\nreply-2\n\nreply-3\n\nreply-4");
    }

    #[tokio::test]
    async fn test_failed_chunk_occupies_its_slot() {
        let scripts = HashMap::from([(
            "chunk-1".to_string(),
            ChunkScript {
                fail_first: usize::MAX,
                ..Default::default()
            },
        )]);
        let client = ScriptedClient {
            scripts,
            ..Default::default()
        };
        let attempts = client.attempts.clone();

        let mut handle = dispatcher(client, 3)
            .dispatch_chunks(chunk_names(3), "test-model", "", SamplingParams::default())
            .unwrap();

        let mut max_processed = 0;
        let mut final_text = String::new();
        while let Some(event) = handle.next().await {
            match event {
                BatchEvent::Progress { processed, .. } => max_processed = max_processed.max(processed),
                BatchEvent::Done { text } => final_text = text,
                BatchEvent::Item { .. } => {}
            }
        }

        let slots: Vec<&str> = final_text.split("\n\n").collect();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0], "chunk-0");
        assert_eq!(slots[1], "错误: transport error: injected failure");
        assert_eq!(slots[2], "chunk-2");
        assert_eq!(max_processed, 3);
        assert_eq!(attempts.lock().unwrap()["chunk-1"], 3);
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_within_ceiling() {
        let scripts = HashMap::from([(
            "chunk-0".to_string(),
            ChunkScript {
                fail_first: 2,
                fragments: vec!["recovered".to_string()],
                ..Default::default()
            },
        )]);
        let client = ScriptedClient {
            scripts,
            ..Default::default()
        };
        let attempts = client.attempts.clone();

        let handle = dispatcher(client, 1)
            .dispatch_chunks(chunk_names(1), "test-model", "", SamplingParams::default())
            .unwrap();

        assert_eq!(handle.finish().await, "recovered");
        assert_eq!(attempts.lock().unwrap()["chunk-0"], 3);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded_and_progress_is_monotone() {
        let total = 5;
        let mut scripts = HashMap::new();
        for i in 0..total {
            scripts.insert(
                format!("chunk-{i}"),
                ChunkScript {
                    delay: Duration::from_millis(30),
                    ..Default::default()
                },
            );
        }
        let client = ScriptedClient {
            scripts,
            ..Default::default()
        };
        let peak = client.peak.clone();

        let mut handle = dispatcher(client, 2)
            .dispatch_chunks(chunk_names(total), "test-model", "", SamplingParams::default())
            .unwrap();

        let mut snapshots = Vec::new();
        let mut done = false;
        while let Some(event) = handle.next().await {
            match event {
                BatchEvent::Progress { total, processed } => snapshots.push((total, processed)),
                BatchEvent::Done { .. } => done = true,
                BatchEvent::Item { .. } => {}
            }
        }

        assert!(done);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(snapshots.first(), Some(&(total, 0)));
        assert_eq!(snapshots.last(), Some(&(total, total)));
        for window in snapshots.windows(2) {
            assert!(window[1].1 >= window[0].1, "progress went backwards");
        }
    }

    #[tokio::test]
    async fn test_item_events_accumulate_within_a_chunk() {
        let scripts = HashMap::from([(
            "chunk-0".to_string(),
            ChunkScript {
                fragments: vec!["a".to_string(), "b".to_string(), "c".to_string()],
                ..Default::default()
            },
        )]);
        let client = ScriptedClient {
            scripts,
            ..Default::default()
        };

        let mut handle = dispatcher(client, 1)
            .dispatch_chunks(chunk_names(1), "test-model", "", SamplingParams::default())
            .unwrap();

        let mut texts = Vec::new();
        while let Some(event) = handle.next().await {
            if let BatchEvent::Item { text, failed, .. } = event {
                assert!(!failed);
                texts.push(text);
            }
        }

        // Three fragment events plus the completion signal
        assert_eq!(texts, vec!["a", "ab", "abc", "abc"]);
    }

    /// Client that parks the first chunk until the test releases it, so
    /// cancellation can land while the rest of the queue is untouched.
    struct GatedClient {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl ChatClient for GatedClient {
        async fn stream(&self, request: ChatRequest) -> Result<FragmentStream, ClientError> {
            if request.text == "chunk-0" {
                self.started.notify_one();
                self.release.notified().await;
            }
            Ok(stream::iter(vec![Ok(request.text)]).boxed())
        }
    }

    #[tokio::test]
    async fn test_cancellation_resolves_remaining_slots_with_markers() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let client = GatedClient {
            started: started.clone(),
            release: release.clone(),
        };

        let total = 4;
        let registry = registry(1);
        let dispatcher = BatchDispatcher::new(client, registry);
        let mut handle = dispatcher
            .dispatch_chunks(chunk_names(total), "test-model", "", SamplingParams::default())
            .unwrap();

        // Wait until chunk 0 is in flight, cancel, then let it finish
        started.notified().await;
        handle.cancel();
        release.notify_one();

        let mut snapshots = Vec::new();
        let mut final_text = String::new();
        while let Some(event) = handle.next().await {
            match event {
                BatchEvent::Progress { total, processed } => snapshots.push((total, processed)),
                BatchEvent::Done { text } => final_text = text,
                BatchEvent::Item { .. } => {}
            }
        }

        let slots: Vec<&str> = final_text.split("\n\n").collect();
        assert_eq!(slots, vec!["chunk-0", "已取消", "已取消", "已取消"]);
        assert_eq!(snapshots.last(), Some(&(total, total)));
    }

    #[tokio::test]
    async fn test_unknown_model_is_rejected_before_any_dispatch() {
        let client = ScriptedClient::default();
        let attempts = client.attempts.clone();

        let err = dispatcher(client, 2)
            .submit("some text", "no-such-model", "", SamplingParams::default())
            .unwrap_err();

        assert_eq!(
            err,
            BatchError::Config(ConfigError::UnknownModel("no-such-model".to_string()))
        );
        assert!(attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_lines_are_stripped_per_chunk_before_joining() {
        let scripts = HashMap::from([
            (
                "chunk-0".to_string(),
                ChunkScript {
                    fragments: vec!["line1\n\n  \nline2\n".to_string()],
                    ..Default::default()
                },
            ),
            (
                "chunk-1".to_string(),
                ChunkScript {
                    fragments: vec!["\nline3".to_string()],
                    ..Default::default()
                },
            ),
        ]);
        let client = ScriptedClient {
            scripts,
            ..Default::default()
        };

        let handle = dispatcher(client, 2)
            .dispatch_chunks(chunk_names(2), "test-model", "", SamplingParams::default())
            .unwrap();

        assert_eq!(handle.finish().await, "line1\nline2\n\nline3");
    }

    #[tokio::test]
    async fn test_submit_splits_then_dispatches() {
        let client = ScriptedClient::default();
        let seen = client.seen.clone();

        // max_tokens 100 -> effective 90, so both paragraphs fit one chunk
        let handle = dispatcher(client, 2)
            .submit(
                "first paragraph\nsecond paragraph",
                "test-model",
                "",
                SamplingParams::default(),
            )
            .unwrap();

        assert_eq!(handle.total(), 1);
        assert_eq!(handle.finish().await, "first paragraph\nsecond paragraph");

        // Empty prompt falls back to the default assistant prompt
        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].prompt, DEFAULT_PROMPT);
        assert_eq!(requests[0].model, "test-model");
    }

    #[tokio::test]
    async fn test_empty_input_completes_immediately() {
        let client = ScriptedClient::default();

        let mut handle = dispatcher(client, 2)
            .dispatch_chunks(Vec::new(), "test-model", "", SamplingParams::default())
            .unwrap();

        assert_eq!(handle.total(), 0);
        let mut events = Vec::new();
        while let Some(event) = handle.next().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                BatchEvent::Progress { total: 0, processed: 0 },
                BatchEvent::Progress { total: 0, processed: 0 },
                BatchEvent::Done { text: String::new() },
            ]
        );
    }
}
