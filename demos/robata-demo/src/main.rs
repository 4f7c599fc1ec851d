mod client;

use std::time::Duration;

use futures::StreamExt;
use robata::batch::{BatchDispatcher, BatchEvent};
use robata::client::SamplingParams;
use robata::compare::{ComparisonEntry, ComparisonMerger};
use robata::config::ModelRegistry;

use crate::client::ScriptedBackend;

const SAMPLE: &str = "\
The quick brown fox jumps over the lazy dog.
Pack my box with five dozen liquor jugs.
How vexingly quick daft zebras jump.";

#[tokio::main]
async fn main() -> Result<(), robata::error::BatchError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let registry = ModelRegistry::default();
    let dispatcher = BatchDispatcher::new(
        ScriptedBackend {
            latency: Duration::from_millis(50),
        },
        registry,
    );

    println!("=== batch dispatch ===");
    let mut handle = dispatcher.submit(
        SAMPLE,
        "deepseek-chat",
        "Echo the input.",
        SamplingParams::default(),
    )?;

    while let Some(event) = handle.next().await {
        match event {
            BatchEvent::Progress { total, processed } => {
                println!("progress: {processed}/{total}");
            }
            BatchEvent::Item { index, text, failed } => {
                println!("chunk {index} ({} chars, failed={failed})", text.len());
            }
            BatchEvent::Done { text } => {
                println!("--- final ---\n{text}");
            }
        }
    }

    println!("\n=== comparison ===");
    let merger = ComparisonMerger::new(ScriptedBackend {
        latency: Duration::from_millis(30),
    });
    let streams = merger.run(
        "compare me across models",
        "Echo the input.",
        vec![
            ComparisonEntry {
                model: "deepseek-chat".to_string(),
                sampling: SamplingParams::default(),
            },
            ComparisonEntry {
                model: "glm-4.5".to_string(),
                sampling: SamplingParams {
                    top_p: 0.9,
                    temperature: 0.2,
                },
            },
        ],
    )?;

    let printers = streams.into_iter().map(|mut stream| {
        let model = stream.model().to_string();
        tokio::spawn(async move {
            while let Some(text) = stream.next().await {
                println!("[{model}] {text}");
            }
        })
    });
    for printer in printers.collect::<Vec<_>>() {
        let _ = printer.await;
    }

    Ok(())
}
