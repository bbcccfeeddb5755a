//! Prompt state and block generation for a story-writing assistant.
//!
//! `storyblock` keeps the narrative parameters of a story (title, tone,
//! audience, persona, style exemplars) and the parameters of each block
//! (title, word budget, keywords, notes) in a process-wide
//! [`PromptState`](state::PromptState). It renders them into a fixed prompt
//! template and streams that prompt through a text-generation backend,
//! returning the generated block with a `Sources:` footer.
//!
//! ```ignore
//! use storyblock::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let state = global_state();
//!     update_global_prompt_elem(state, "story_title", "Salt Roads")?;
//!     update_block_prompt_elem(state, "Main", "keywords", "caravan, trade")?;
//!
//!     let api_key = std::env::var("OPENROUTER_KEY").map_err(|e| e.to_string())?;
//!     let generator = OpenRouterGenerator::new(OpenRouterClient::new(api_key)?, GeneratorConfig::default());
//!
//!     // Never fails: errors come back as a user-facing "Error: ..." string.
//!     println!("{}", generate_current_block(&generator, "Main").await);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`state`] | Global and per-block prompt elements, defaults, string-keyed accessors |
//! | [`prompt`] | Fixed-template prompt rendering for one block |
//! | [`generate`] | Prompt → stream → citations pipeline and user-facing errors |
//! | [`citations`] | Citation extraction and `Sources:` footer |
//! | [`api`] | [`TextGenerator`](api::TextGenerator) trait, OpenRouter SSE streaming |
//! | [`config`] | Generation settings |

pub mod api;
pub mod citations;
pub mod config;
pub mod generate;
pub mod prelude;
pub mod prompt;
pub mod state;

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for block generation.
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted from
/// serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Vec<Plugin>>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// An OpenRouter plugin configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "id")]
pub enum Plugin {
    /// Web search plugin. Grounds the answer and returns URL citations.
    #[serde(rename = "web")]
    Web {
        #[serde(skip_serializing_if = "Option::is_none")]
        max_results: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        search_prompt: Option<String>,
    },
}

impl Plugin {
    pub fn web_with(max_results: Option<u32>, search_prompt: Option<String>) -> Self {
        Plugin::Web {
            max_results,
            search_prompt,
        }
    }
}

// ── Message types ──────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// URL citation annotation returned by the web-search plugin.
#[derive(Deserialize, Debug, Clone)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub annotation_type: Option<String>,
    pub url_citation: Option<UrlCitation>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct UrlCitation {
    pub url: String,
    pub title: Option<String>,
}

impl Annotation {
    /// The citation carried by a `url_citation` annotation.
    pub fn citation(&self) -> Option<citations::Citation> {
        if self.annotation_type.as_deref() != Some("url_citation") {
            return None;
        }
        self.url_citation
            .as_ref()
            .map(|c| citations::Citation::new(c.url.clone(), c.title.clone()))
    }
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) endpoint: String,
    pub(crate) referer: String,
    pub(crate) title: String,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(api_key, "https://github.com/storyblock", "storyblock")
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("storyblock/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: OPENROUTER_URL.to_string(),
            referer: referer.into(),
            title: title.into(),
        })
    }

    /// Point the client at a different chat completions endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
