use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use robata::client::{ChatClient, ChatRequest, FragmentStream};
use robata::error::ClientError;

/// Scripted stand-in for a chat completion backend.
///
/// Streams a canned "translation" of the request word by word with a little
/// latency, so the demo shows real interleaving between chunks without any
/// network access.
pub struct ScriptedBackend {
    pub latency: Duration,
}

#[async_trait]
impl ChatClient for ScriptedBackend {
    async fn stream(&self, request: ChatRequest) -> Result<FragmentStream, ClientError> {
        let words: Vec<String> = request
            .text
            .split_whitespace()
            .map(|word| format!("{word} "))
            .collect();
        let latency = self.latency;

        let fragments = futures::stream::iter(words).then(move |word| async move {
            tokio::time::sleep(latency).await;
            Ok::<_, ClientError>(word)
        });
        Ok(fragments.boxed())
    }
}
