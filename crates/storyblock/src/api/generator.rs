//! The [`TextGenerator`] seam and its OpenRouter implementation.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, warn};

use super::streaming::{StreamEvent, collect_citations, collect_text, extract_usage, first_error};
use crate::citations::Citation;
use crate::config::GeneratorConfig;
use crate::{OpenRouterClient, UsageInfo};

/// Boxed future returned by [`TextGenerator::generate_stream`].
pub type GenerateFuture<'a> = Pin<Box<dyn Future<Output = Result<Generation, String>> + Send + 'a>>;

/// The streamed output of one generation.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    /// Text chunks in arrival order.
    pub chunks: Vec<String>,
    /// Citations reported by the backend (not those written in the text).
    pub citations: Vec<Citation>,
    pub usage: Option<UsageInfo>,
}

impl Generation {
    /// The full response text.
    pub fn text(&self) -> String {
        self.chunks.concat()
    }
}

/// A streaming text-generation backend.
///
/// `on_chunk` is called for every text chunk as it arrives; the returned
/// [`Generation`] holds the same chunks. Errors are plain strings; a refusal
/// by the backend's content filters must contain
/// [`SAFETY_BLOCK_MESSAGE`](super::streaming::SAFETY_BLOCK_MESSAGE).
pub trait TextGenerator: Send + Sync {
    fn generate_stream<'a>(
        &'a self,
        prompt: &'a str,
        on_chunk: &'a mut (dyn FnMut(&str) + Send),
    ) -> GenerateFuture<'a>;
}

/// [`TextGenerator`] backed by the OpenRouter streaming API.
pub struct OpenRouterGenerator {
    client: OpenRouterClient,
    config: GeneratorConfig,
}

impl OpenRouterGenerator {
    pub fn new(client: OpenRouterClient, config: GeneratorConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

impl TextGenerator for OpenRouterGenerator {
    fn generate_stream<'a>(
        &'a self,
        prompt: &'a str,
        on_chunk: &'a mut (dyn FnMut(&str) + Send),
    ) -> GenerateFuture<'a> {
        Box::pin(async move {
            let body = self.config.build_request(prompt);
            let events = self
                .client
                .chat_stream_live(&body, |ev| {
                    if let StreamEvent::TextDelta(delta) = ev {
                        on_chunk(delta);
                    }
                })
                .await?;

            if let Some(err) = first_error(&events) {
                return Err(err.to_string());
            }

            let generation = Generation {
                chunks: events
                    .iter()
                    .filter_map(|e| match e {
                        StreamEvent::TextDelta(t) => Some(t.clone()),
                        _ => None,
                    })
                    .collect(),
                citations: collect_citations(&events),
                usage: extract_usage(&events),
            };

            if generation.chunks.is_empty() {
                warn!("Model {} returned no text", self.config.model);
            }
            if let Some(ref usage) = generation.usage {
                debug!(
                    "Token usage: prompt={}, completion={}, total={}",
                    usage.prompt_tokens.unwrap_or(0),
                    usage.completion_tokens.unwrap_or(0),
                    usage.total_tokens.unwrap_or(0),
                );
            }
            debug!(
                "Generated {} chars with {} backend citation(s)",
                collect_text(&events).len(),
                generation.citations.len()
            );
            Ok(generation)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_text_concatenates_chunks() {
        let generation = Generation {
            chunks: vec!["Once ".into(), "upon ".into(), "a time.".into()],
            ..Default::default()
        };
        assert_eq!(generation.text(), "Once upon a time.");
    }

    #[test]
    fn generator_exposes_config() {
        let client = OpenRouterClient::new("key").unwrap();
        let config = GeneratorConfig {
            model: "test/model".into(),
            ..Default::default()
        };
        let generator = OpenRouterGenerator::new(client, config);
        assert_eq!(generator.config().model, "test/model");
    }
}
