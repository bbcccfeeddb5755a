//! Generation settings with sensible defaults.
//!
//! [`GeneratorConfig`] captures what a block generation needs from the
//! backend and converts it into a [`ChatRequest`] via
//! [`build_request`](GeneratorConfig::build_request).

use crate::{ChatRequest, DEFAULT_MODEL, Message, Plugin};

/// Configuration for block generation.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,
    /// Maximum tokens per response. Default: `2048`.
    pub max_tokens: u32,
    /// Sampling temperature. Default: `0.7`.
    pub temperature: f32,
    /// Enable the web-search plugin so answers carry URL citations.
    /// Default: `true`.
    pub web_search: bool,
    /// Number of web results when web search is on.
    pub web_max_results: Option<u32>,
    /// Optional system prompt sent ahead of the block prompt.
    pub system_prompt: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 2048,
            temperature: 0.7,
            web_search: true,
            web_max_results: None,
            system_prompt: None,
        }
    }
}

impl GeneratorConfig {
    /// Build the chat request for a block prompt.
    pub fn build_request(&self, prompt: &str) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = self.system_prompt {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(prompt));

        let plugins = self
            .web_search
            .then(|| vec![Plugin::web_with(self.web_max_results, None)]);

        ChatRequest {
            model: Some(self.model.clone()),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            plugins,
        }
    }
}
