//! Convenience re-exports for common `storyblock` types.
//!
//! ```ignore
//! use storyblock::prelude::*;
//! ```

// ── Backend ─────────────────────────────────────────────────────────
pub use crate::api::{Generation, OpenRouterGenerator, TextGenerator};
pub use crate::config::GeneratorConfig;
pub use crate::{ChatRequest, Message, OpenRouterClient};

// ── State ───────────────────────────────────────────────────────────
pub use crate::state::{
    BlockField, BlockPromptElements, BlockValue, GlobalField, GlobalPromptElements, PromptState,
    SharedPromptState, get_block_prompt_elem, get_global_prompt_elem, global_state,
    load_prompt_state, new_shared_state, save_prompt_state, update_block_prompt_elem,
    update_global_prompt_elem,
};

// ── Formatting and generation ───────────────────────────────────────
pub use crate::citations::{Citation, extract_citations, format_response_with_citations};
pub use crate::generate::{
    generate_block, generate_current_block, generate_shared_block, user_friendly_error_message,
};
pub use crate::prompt::{format_current_prompt, format_prompt};
