//! Block generation: prompt → stream → citations.
//!
//! [`generate_block`] never fails. Every error is turned into a string of
//! the form `"Error: <message>"`, where the message comes from
//! [`user_friendly_error_message`], so UI callers can show the result as-is.

use tracing::{info, warn};

use crate::api::TextGenerator;
use crate::citations::{extract_citations, format_response_with_citations};
use crate::prompt::format_prompt;
use crate::state::{PromptState, SharedPromptState, global_state, load_prompt_state};

/// Marker that identifies a content refusal in an error string.
pub const SAFETY_BLOCK_MARKER: &str = "blocked by the safety filters";

/// Generate `block` from a state snapshot, returning the formatted text
/// or an `"Error: ..."` string.
pub async fn generate_block(
    generator: &dyn TextGenerator,
    state: &PromptState,
    block: &str,
) -> String {
    generate_block_with(generator, state, block, &mut |_: &str| {}).await
}

/// Like [`generate_block`], calling `on_chunk` for each streamed chunk.
pub async fn generate_block_with(
    generator: &dyn TextGenerator,
    state: &PromptState,
    block: &str,
    on_chunk: &mut (dyn FnMut(&str) + Send),
) -> String {
    match try_generate_block(generator, state, block, on_chunk).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Generation for block '{block}' failed: {e}");
            format!("Error: {}", user_friendly_error_message(&e))
        }
    }
}

/// The fallible pipeline behind [`generate_block`].
pub async fn try_generate_block(
    generator: &dyn TextGenerator,
    state: &PromptState,
    block: &str,
    on_chunk: &mut (dyn FnMut(&str) + Send),
) -> Result<String, String> {
    let prompt = format_prompt(state, block);
    let generation = generator.generate_stream(&prompt, on_chunk).await?;

    let text = generation.text();
    let citations = extract_citations(&text, &generation.citations);
    info!(
        "Generated block '{block}': {} chars, {} citation(s)",
        text.len(),
        citations.len()
    );
    Ok(format_response_with_citations(&text, &citations))
}

/// Generate `block` from a shared state.
pub async fn generate_shared_block(
    generator: &dyn TextGenerator,
    state: &SharedPromptState,
    block: &str,
) -> String {
    // Snapshot first so the lock is not held across the request.
    let snapshot = load_prompt_state(state);
    generate_block(generator, &snapshot, block).await
}

/// Generate `block` from the process-wide state.
pub async fn generate_current_block(generator: &dyn TextGenerator, block: &str) -> String {
    generate_shared_block(generator, global_state(), block).await
}

/// Map an error string to a message fit for end users.
pub fn user_friendly_error_message(error: &str) -> String {
    if error.contains(SAFETY_BLOCK_MARKER) {
        "The content was blocked by safety filters. Please try rephrasing your request or using \
         less controversial topics."
            .to_string()
    } else if error.trim().is_empty() {
        "An unknown error occurred. Please try again or contact support if the issue persists."
            .to_string()
    } else {
        format!(
            "An unexpected error occurred: {error}. Please try again or contact support if the \
             issue persists."
        )
    }
}
