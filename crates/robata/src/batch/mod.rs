//! # Batch Dispatch
//!
//! Bounded-concurrency dispatch of text chunks to a chat-completion backend,
//! with per-chunk retry and order-preserving aggregation.
//!
//! ## Overview
//!
//! A batch job takes an ordered list of chunks and fans them out to a pool of
//! worker tasks, at most `max_concurrent` (from the model's registry profile)
//! in flight at once. Each worker streams one chunk through the
//! [`ChatClient`](crate::client::ChatClient), retrying failed invocations with
//! exponential backoff. Once every chunk has resolved, the results are
//! reassembled in original chunk order into the final text.
//!
//! ## Key Components
//!
//! * [`BatchDispatcher`] - Owns the client and registry, spawns jobs
//! * [`BatchHandle`] - Per-job event stream plus cancellation
//! * [`BatchEvent`] - Typed progress/item/done events on one ordered channel
//! * [`CancelToken`] - Clonable flag that drains the remaining queue
//!
//! ## Ordering Guarantees
//!
//! Within one chunk, item events carry the accumulated text in fragment
//! emission order. Across chunks, events interleave arbitrarily; only the
//! final aggregation re-imposes index order. A chunk that exhausts its
//! retries still occupies its index slot in the output, as a visible error
//! marker, so partial success is always attributable to a specific chunk.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use futures::{StreamExt, stream};
//! use robata::batch::{BatchDispatcher, BatchEvent};
//! use robata::client::{ChatClient, ChatRequest, FragmentStream, SamplingParams};
//! use robata::config::ModelRegistry;
//! use robata::error::ClientError;
//!
//! struct EchoClient;
//!
//! #[async_trait]
//! impl ChatClient for EchoClient {
//!     async fn stream(&self, request: ChatRequest) -> Result<FragmentStream, ClientError> {
//!         Ok(stream::iter(vec![Ok(request.text)]).boxed())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), robata::error::BatchError> {
//! let dispatcher = BatchDispatcher::new(EchoClient, ModelRegistry::default());
//!
//! let mut handle = dispatcher.submit(
//!     "long document text",
//!     "deepseek-chat",
//!     "Summarize the following text.",
//!     SamplingParams::default(),
//! )?;
//!
//! while let Some(event) = handle.next().await {
//!     match event {
//!         BatchEvent::Progress { total, processed } => {
//!             println!("{processed}/{total}");
//!         }
//!         BatchEvent::Item { index, text, .. } => {
//!             println!("chunk {index}: {} chars so far", text.len());
//!         }
//!         BatchEvent::Done { text } => {
//!             println!("final output:\n{text}");
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod dispatcher;
mod event;
mod queue_item;
mod worker;

pub use dispatcher::{BatchDispatcher, BatchHandle, CancelToken};
pub use event::{BatchEvent, ItemResult, ItemStatus};
pub use worker::{CANCELLED_MARKER, ERROR_MARKER_PREFIX, MAX_ATTEMPTS};
