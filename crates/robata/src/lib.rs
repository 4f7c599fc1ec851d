//! # Robata
//!
//! A concurrent **ro**uting and **bat**ching layer for multi-model text
//! generation over OpenAI-compatible chat completion backends.
//!
//! ## Overview
//!
//! This library takes a body of text too large or too numerous to send in one
//! request, splits it deterministically, dispatches the pieces concurrently
//! to a language-model backend with bounded parallelism and per-item retry,
//! and reassembles results in original order while emitting live progress and
//! incremental output.
//!
//! Key components include:
//!
//! - A deterministic text chunker with paragraph and sentence awareness
//! - A bounded-concurrency batch dispatcher with retry and backoff
//! - A comparison merger running up to three models side by side
//! - Typed event streams for progress and incremental output
//!
//! ## Architecture
//!
//! The library is built around a few abstractions:
//!
//! ### The Client Seam
//!
//! The [`client::ChatClient`] trait defines the capability the engine calls:
//! given a request, produce a lazy stream of output fragments. The engine
//! never owns a transport; an OpenAI-compatible HTTP client, a local
//! inference server, or a scripted test double all plug in behind the same
//! trait.
//!
//! ### Batch Dispatch
//!
//! [`batch::BatchDispatcher`] splits input against the model's configured
//! token budget, fans chunks out to a bounded worker pool, retries failed
//! chunks with exponential backoff, and delivers a typed event stream:
//! progress snapshots, per-chunk accumulated text, and the final aggregated
//! output in original chunk order. A permanently failed chunk surfaces as a
//! visible error marker at its position rather than failing the batch.
//!
//! ### Comparison
//!
//! [`compare::ComparisonMerger`] runs the same input through up to three
//! models concurrently, each with its own independent output stream; one
//! stream's failure never disturbs the others.
//!
//! ## Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use futures::{StreamExt, stream};
//! use robata::batch::BatchDispatcher;
//! use robata::client::{ChatClient, ChatRequest, FragmentStream, SamplingParams};
//! use robata::config::ModelRegistry;
//! use robata::error::ClientError;
//!
//! // A trivial client; a real one speaks to a chat completion endpoint.
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
//! let handle = dispatcher.submit(
//!     "a very long document...",
//!     "deepseek-chat",
//!     "Translate to English.",
//!     SamplingParams::default(),
//! )?;
//!
//! let final_text = handle.finish().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Implementation Details
//!
//! Chunk order is assigned once, single-threaded, before fan-out; workers
//! resolve disjoint index slots, so aggregation needs no coordination beyond
//! a map lock and an atomic progress counter. All incremental output rides
//! tokio channels wrapped as `futures` streams, so consumers compose with
//! ordinary stream combinators.

mod communication;

pub mod batch;
pub mod chunk;
pub mod client;
pub mod compare;
pub mod config;
pub mod error;

pub use communication::ItemStream;
