//! Block prompt formatting.
//!
//! [`format_prompt`] renders the fixed prompt template for one block from a
//! [`PromptState`] snapshot. Optional instructions (tone, audience, persona,
//! style example, keywords, notes) are only emitted when their element is
//! non-empty, via [`PromptBuilder`]'s conditional appenders.

use crate::state::{
    DEFAULT_WORD_COUNT, GlobalField, PromptState, SharedPromptState, global_state,
    load_prompt_state,
};
use tracing::debug;

/// Words per sentence used to turn a word budget into a sentence budget.
/// Models follow sentence counts more reliably than word counts.
pub const WORDS_PER_SENTENCE: u32 = 15;

/// Story title used when the title element is unset.
pub const UNTITLED_STORY: &str = "Untitled Story";

/// Sentence budget for a word budget (integer division).
pub fn sentence_count(word_count: u32) -> u32 {
    word_count / WORDS_PER_SENTENCE
}

/// Builder that concatenates prompt fragments verbatim.
///
/// Unlike a sectioned system prompt, fragments carry their own separators,
/// so the output is exactly the concatenation of what was appended.
///
/// ```
/// use storyblock::prompt::PromptBuilder;
///
/// let prompt = PromptBuilder::new("Write a scene. ")
///     .push_if(true, || "Keep it short. ".into())
///     .push_opt(None::<&str>, |s| format!("<tone>{s}</tone>"))
///     .push_opt(Some("dry"), |s| format!("<tone>{s}</tone>"))
///     .build();
///
/// assert_eq!(prompt, "Write a scene. Keep it short. <tone>dry</tone>");
/// ```
pub struct PromptBuilder {
    buf: String,
}

impl PromptBuilder {
    pub fn new(preamble: impl Into<String>) -> Self {
        Self {
            buf: preamble.into(),
        }
    }

    /// Append a fragment unconditionally.
    pub fn push(mut self, fragment: impl AsRef<str>) -> Self {
        self.buf.push_str(fragment.as_ref());
        self
    }

    /// Append a fragment only when `condition` holds. `fragment_fn` is only
    /// called in that case.
    pub fn push_if(self, condition: bool, fragment_fn: impl FnOnce() -> String) -> Self {
        if condition {
            self.push(fragment_fn())
        } else {
            self
        }
    }

    /// Append the rendering of `value` when it is `Some`.
    pub fn push_opt<T>(self, value: Option<T>, render: impl FnOnce(T) -> String) -> Self {
        match value {
            Some(v) => self.push(render(v)),
            None => self,
        }
    }

    pub fn build(self) -> String {
        self.buf
    }
}

/// Render the prompt for `block` from a state snapshot.
///
/// Missing block elements fall back to the block name (title) and
/// [`DEFAULT_WORD_COUNT`]. An unset story title renders as
/// [`UNTITLED_STORY`]; a set-but-empty one renders as `''`.
pub fn format_prompt(state: &PromptState, block: &str) -> String {
    let global = &state.global;
    let elems = state.block(block);

    let word_count = elems
        .and_then(|b| b.word_count)
        .unwrap_or(DEFAULT_WORD_COUNT);
    let sentences = sentence_count(word_count);
    let story_title = global.get(GlobalField::StoryTitle).unwrap_or(UNTITLED_STORY);
    let block_title = elems.and_then(|b| b.title.as_deref()).unwrap_or(block);
    let keywords = elems
        .and_then(|b| b.keywords.as_deref())
        .filter(|s| !s.is_empty());
    let notes = elems
        .and_then(|b| b.notes.as_deref())
        .filter(|s| !s.is_empty());

    let persona = match (
        global.non_empty(GlobalField::PersonaFirstName),
        global.non_empty(GlobalField::PersonaLastName),
    ) {
        (Some(first), Some(last)) => Some(format!("{first} {last}")),
        _ => None,
    };

    debug!("Formatting prompt for block '{block}' ({sentences} sentences)");

    PromptBuilder::new(format!(
        "You are tasked with writing a {sentences} sentences article section for a story titled '{story_title}'. "
    ))
    .push(format!("This section is titled '{block_title}'. "))
    .push("Please include sources for your information as inline and aggregate citations.")
    .push("\n\nFollow these instructions carefully:\n")
    .push_opt(global.non_empty(GlobalField::ToneStyle), |tone| {
        format!("<tone>{tone}</tone>\n")
    })
    .push_opt(global.non_empty(GlobalField::Audience), |audience| {
        format!("<target_audience>{audience}</target_audience>\n ")
    })
    .push_opt(persona, |name| format!("Write in the style of {name}. "))
    .push_opt(global.non_empty(GlobalField::Exemplars), |example| {
        format!(
            "Use this as an example of the desired tone: \n<style_example>{example}</style_example>\n"
        )
    })
    .push_opt(keywords, |kw| {
        format!("\nInclude these keywords: \n<keywords>{kw}</keywords>\n")
    })
    .push_opt(notes, |n| {
        format!("\nConsider these additional notes: \n<additional_notes>{n}</additional_notes>\n ")
    })
    .push(format!(
        "\n\nRemember to focus on creating a coherent and engaging narrative within the {sentences}-sentence limit while adhering to all the specified requirements.\n"
    ))
    .build()
}

/// Render the prompt for `block` from a shared state.
pub fn format_shared_prompt(state: &SharedPromptState, block: &str) -> String {
    format_prompt(&load_prompt_state(state), block)
}

/// Render the prompt for `block` from the process-wide state.
pub fn format_current_prompt(block: &str) -> String {
    format_shared_prompt(global_state(), block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BlockPromptElements, GlobalPromptElements};

    #[test]
    fn sentence_count_truncates() {
        assert_eq!(sentence_count(60), 4);
        assert_eq!(sentence_count(74), 4);
        assert_eq!(sentence_count(10), 0);
    }

    #[test]
    fn default_state_prompt() {
        let prompt = format_prompt(&PromptState::default(), "Introduction");
        assert_eq!(
            prompt,
            "You are tasked with writing a 4 sentences article section for a story titled ''. \
             This section is titled 'Introduction'. \
             Please include sources for your information as inline and aggregate citations.\
             \n\nFollow these instructions carefully:\n\
             \n\nRemember to focus on creating a coherent and engaging narrative within the \
             4-sentence limit while adhering to all the specified requirements.\n"
        );
    }

    #[test]
    fn every_element_filled_in() {
        let mut state = PromptState::default();
        state.global.set(GlobalField::StoryTitle, "Salt Roads");
        state.global.set(GlobalField::ToneStyle, "lyrical");
        state.global.set(GlobalField::Audience, "historians");
        state.global.set(GlobalField::PersonaFirstName, "Ursula");
        state.global.set(GlobalField::PersonaLastName, "Le Guin");
        state.global.set(GlobalField::Exemplars, "The sea was quiet.");
        let main = state.block_mut("Main");
        main.keywords = Some("caravan, trade".into());
        main.notes = Some("mention Timbuktu".into());
        main.word_count = Some(150);

        assert_eq!(
            format_prompt(&state, "Main"),
            concat!(
                "You are tasked with writing a 10 sentences article section for a story titled 'Salt Roads'. ",
                "This section is titled 'Main'. ",
                "Please include sources for your information as inline and aggregate citations.",
                "\n\nFollow these instructions carefully:\n",
                "<tone>lyrical</tone>\n",
                "<target_audience>historians</target_audience>\n ",
                "Write in the style of Ursula Le Guin. ",
                "Use this as an example of the desired tone: \n",
                "<style_example>The sea was quiet.</style_example>\n",
                "\nInclude these keywords: \n",
                "<keywords>caravan, trade</keywords>\n",
                "\nConsider these additional notes: \n",
                "<additional_notes>mention Timbuktu</additional_notes>\n ",
                "\n\nRemember to focus on creating a coherent and engaging narrative within the ",
                "10-sentence limit while adhering to all the specified requirements.\n",
            )
        );
    }

    #[test]
    fn persona_requires_both_names() {
        let mut state = PromptState::default();
        state.global.set(GlobalField::PersonaFirstName, "Ursula");
        assert!(!format_prompt(&state, "Main").contains("Write in the style of"));
    }

    #[test]
    fn sparse_state_uses_fallbacks() {
        let state = PromptState {
            global: GlobalPromptElements::default(),
            blocks: [("Epilogue".to_string(), BlockPromptElements::default())]
                .into_iter()
                .collect(),
        };
        let prompt = format_prompt(&state, "Epilogue");
        assert!(prompt.contains("titled 'Untitled Story'"));
        assert!(prompt.contains("This section is titled 'Epilogue'"));
        assert!(prompt.contains("writing a 4 sentences"));

        // A block with no entry at all behaves the same way.
        assert!(format_prompt(&state, "Coda").contains("This section is titled 'Coda'"));
    }

    #[test]
    fn shared_state_is_read_at_format_time() {
        let shared = crate::state::new_shared_state();
        crate::state::update_block_prompt_elem(&shared, "Conclusion", "title", "Wrapping Up")
            .unwrap();
        assert!(format_shared_prompt(&shared, "Conclusion").contains("titled 'Wrapping Up'"));
    }
}
