//! # Chat Client Seam
//!
//! The orchestration layer never talks to a backend directly. It calls a
//! [`ChatClient`], a capability the embedding application provides: given a
//! request, produce a lazy sequence of incremental text fragments.
//!
//! An OpenAI-compatible HTTP implementation, a local inference server, or a
//! scripted mock for tests all satisfy the same trait; the dispatcher and the
//! comparison merger are generic over it.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

use crate::error::ClientError;

/// Prompt used when the caller supplies none.
pub const DEFAULT_PROMPT: &str = "You are a helpful assistant.";

/// Lazy sequence of incremental output fragments.
///
/// An empty fragment is a valid no-op, not a terminator; the stream ends by
/// returning `None`. A mid-stream `Err` ends the invocation with a failure.
pub type FragmentStream = BoxStream<'static, Result<String, ClientError>>;

/// Nucleus-sampling threshold and temperature for one invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    /// Nucleus sampling threshold, in `[0, 1]`.
    pub top_p: f64,
    /// Output diversity temperature, in `[0, 2]`.
    pub temperature: f64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            top_p: 0.7,
            temperature: 0.9,
        }
    }
}

/// One chat-completion invocation: the user text plus shared parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// User input text.
    pub text: String,
    /// Model identifier, resolvable through the registry.
    pub model: String,
    /// System prompt guiding the model.
    pub prompt: String,
    /// Sampling parameters for this invocation.
    pub sampling: SamplingParams,
}

impl ChatRequest {
    /// Builds a request, substituting [`DEFAULT_PROMPT`] for an empty prompt.
    pub fn new(
        text: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
        sampling: SamplingParams,
    ) -> Self {
        let prompt = prompt.into();
        Self {
            text: text.into(),
            model: model.into(),
            prompt: if prompt.is_empty() {
                DEFAULT_PROMPT.to_string()
            } else {
                prompt
            },
            sampling,
        }
    }
}

/// Streaming chat-completion capability the orchestration layer dispatches to.
///
/// # Implementation Notes
///
/// Implementations should:
/// * Emit fragments in the order the backend produced them
/// * Report transport and backend failures through [`ClientError`] rather
///   than panicking
/// * Be cheap to invoke concurrently; the dispatcher holds one shared
///   instance behind an `Arc` and fans out from many worker tasks
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Starts one streaming invocation and returns its fragment stream.
    ///
    /// # Errors
    ///
    /// Fails when the invocation cannot be started; failures after the first
    /// fragment surface as `Err` items inside the stream.
    async fn stream(&self, request: ChatRequest) -> Result<FragmentStream, ClientError>;

    /// Runs one invocation to completion and returns the full output text.
    ///
    /// Provided in terms of [`ChatClient::stream`]; implementations backed by
    /// a native non-streaming endpoint may override it.
    async fn complete(&self, request: ChatRequest) -> Result<String, ClientError> {
        let mut fragments = self.stream(request).await?;
        let mut text = String::new();
        while let Some(fragment) = fragments.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}
