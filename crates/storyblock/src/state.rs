//! Process-wide prompt state: global narrative elements and per-block elements.
//!
//! ```text
//! setters ──writes──▶ Arc<Mutex<PromptState>> ◀──reads── prompt formatter
//! ```
//!
//! State is sparse: every element is optional, and a missing element falls
//! back to its default when read. [`PromptState::default()`] is seeded with
//! the global defaults (all empty strings) and the three default blocks
//! (`Introduction`, `Main`, `Conclusion`).
//!
//! The free functions mirror the string-keyed accessors a UI layer calls.
//! They take a [`SharedPromptState`] so tests and embedders can use their own
//! instance; [`global_state()`] returns the process-wide one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock, Mutex};
use tracing::{debug, trace};

/// Target word count for blocks that don't set one.
pub const DEFAULT_WORD_COUNT: u32 = 60;

/// Blocks seeded into a fresh state, in document order.
pub const DEFAULT_BLOCKS: [&str; 3] = ["Introduction", "Main", "Conclusion"];

// ── Fields and values ─────────────────────────────────────────────────

/// A global prompt element key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GlobalField {
    StoryTitle,
    ToneStyle,
    Audience,
    PersonaFirstName,
    PersonaLastName,
    Exemplars,
}

impl GlobalField {
    pub const ALL: [GlobalField; 6] = [
        GlobalField::StoryTitle,
        GlobalField::ToneStyle,
        GlobalField::Audience,
        GlobalField::PersonaFirstName,
        GlobalField::PersonaLastName,
        GlobalField::Exemplars,
    ];

    /// The key used by the string accessors and the JSON state file.
    pub fn key(self) -> &'static str {
        match self {
            GlobalField::StoryTitle => "story_title",
            GlobalField::ToneStyle => "tone_style",
            GlobalField::Audience => "audience",
            GlobalField::PersonaFirstName => "persona_first_name",
            GlobalField::PersonaLastName => "persona_last_name",
            GlobalField::Exemplars => "exemplars",
        }
    }
}

impl fmt::Display for GlobalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for GlobalField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GlobalField::ALL
            .into_iter()
            .find(|f| f.key() == s)
            .ok_or_else(|| format!("unknown global prompt element '{s}'"))
    }
}

/// A block-level prompt element key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockField {
    Title,
    WordCount,
    Keywords,
    Notes,
}

impl BlockField {
    pub const ALL: [BlockField; 4] = [
        BlockField::Title,
        BlockField::WordCount,
        BlockField::Keywords,
        BlockField::Notes,
    ];

    pub fn key(self) -> &'static str {
        match self {
            BlockField::Title => "title",
            BlockField::WordCount => "word_count",
            BlockField::Keywords => "keywords",
            BlockField::Notes => "notes",
        }
    }
}

impl fmt::Display for BlockField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for BlockField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlockField::ALL
            .into_iter()
            .find(|f| f.key() == s)
            .ok_or_else(|| format!("unknown block prompt element '{s}'"))
    }
}

/// Value of a block element. Only `word_count` is numeric.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockValue {
    Text(String),
    Count(u32),
}

impl BlockValue {
    /// Parse a raw string for the given field.
    pub fn parse(field: BlockField, raw: &str) -> Result<Self, String> {
        match field {
            BlockField::WordCount => raw
                .trim()
                .parse::<u32>()
                .map(BlockValue::Count)
                .map_err(|e| format!("invalid word_count '{raw}': {e}")),
            _ => Ok(BlockValue::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for BlockValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockValue::Text(s) => f.write_str(s),
            BlockValue::Count(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for BlockValue {
    fn from(s: &str) -> Self {
        BlockValue::Text(s.to_string())
    }
}

impl From<String> for BlockValue {
    fn from(s: String) -> Self {
        BlockValue::Text(s)
    }
}

impl From<u32> for BlockValue {
    fn from(n: u32) -> Self {
        BlockValue::Count(n)
    }
}

// ── Records ───────────────────────────────────────────────────────────

/// Narrative parameters shared by every block.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobalPromptElements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exemplars: Option<String>,
}

impl GlobalPromptElements {
    /// Every field present and empty.
    pub fn defaults() -> Self {
        let mut elems = Self::default();
        for field in GlobalField::ALL {
            elems.set(field, "");
        }
        elems
    }

    fn slot(&self, field: GlobalField) -> &Option<String> {
        match field {
            GlobalField::StoryTitle => &self.story_title,
            GlobalField::ToneStyle => &self.tone_style,
            GlobalField::Audience => &self.audience,
            GlobalField::PersonaFirstName => &self.persona_first_name,
            GlobalField::PersonaLastName => &self.persona_last_name,
            GlobalField::Exemplars => &self.exemplars,
        }
    }

    fn slot_mut(&mut self, field: GlobalField) -> &mut Option<String> {
        match field {
            GlobalField::StoryTitle => &mut self.story_title,
            GlobalField::ToneStyle => &mut self.tone_style,
            GlobalField::Audience => &mut self.audience,
            GlobalField::PersonaFirstName => &mut self.persona_first_name,
            GlobalField::PersonaLastName => &mut self.persona_last_name,
            GlobalField::Exemplars => &mut self.exemplars,
        }
    }

    /// The stored value, if the element has been set.
    pub fn get(&self, field: GlobalField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    /// The stored value only when it is non-empty.
    pub fn non_empty(&self, field: GlobalField) -> Option<&str> {
        self.get(field).filter(|s| !s.is_empty())
    }

    pub fn set(&mut self, field: GlobalField, value: impl Into<String>) {
        *self.slot_mut(field) = Some(value.into());
    }
}

/// Parameters for a single named block.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockPromptElements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl BlockPromptElements {
    /// Fully-populated defaults for a named block.
    pub fn defaults_for(block: &str) -> Self {
        Self {
            title: Some(block.to_string()),
            word_count: Some(DEFAULT_WORD_COUNT),
            keywords: Some(String::new()),
            notes: Some(String::new()),
        }
    }

    pub fn get(&self, field: BlockField) -> Option<BlockValue> {
        match field {
            BlockField::Title => self.title.clone().map(BlockValue::Text),
            BlockField::WordCount => self.word_count.map(BlockValue::Count),
            BlockField::Keywords => self.keywords.clone().map(BlockValue::Text),
            BlockField::Notes => self.notes.clone().map(BlockValue::Text),
        }
    }

    /// Store `value` under `field`. A count stored in a text field (or the
    /// reverse) is converted rather than rejected.
    pub fn set(&mut self, field: BlockField, value: BlockValue) -> Result<(), String> {
        match (field, value) {
            (BlockField::WordCount, BlockValue::Count(n)) => self.word_count = Some(n),
            (BlockField::WordCount, BlockValue::Text(raw)) => {
                if let BlockValue::Count(n) = BlockValue::parse(BlockField::WordCount, &raw)? {
                    self.word_count = Some(n);
                }
            }
            (BlockField::Title, v) => self.title = Some(v.to_string()),
            (BlockField::Keywords, v) => self.keywords = Some(v.to_string()),
            (BlockField::Notes, v) => self.notes = Some(v.to_string()),
        }
        Ok(())
    }
}

/// Default value of a block element, if the block has hardcoded defaults.
pub fn block_default(block: &str, field: BlockField) -> Option<BlockValue> {
    if DEFAULT_BLOCKS.contains(&block) {
        BlockPromptElements::defaults_for(block).get(field)
    } else {
        None
    }
}

/// The whole prompt state.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PromptState {
    #[serde(rename = "global_prompt_elem", default)]
    pub global: GlobalPromptElements,
    #[serde(rename = "block_level_prompt_elem", default)]
    pub blocks: BTreeMap<String, BlockPromptElements>,
}

impl Default for PromptState {
    fn default() -> Self {
        let blocks = DEFAULT_BLOCKS
            .iter()
            .map(|b| (b.to_string(), BlockPromptElements::defaults_for(b)))
            .collect();
        Self {
            global: GlobalPromptElements::defaults(),
            blocks,
        }
    }
}

impl PromptState {
    /// Parse a state snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("failed to parse prompt state: {e}"))
    }

    /// Read a state snapshot from a JSON file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read state file '{}': {e}", path.display()))?;
        Self::from_json(&content)
    }

    pub fn to_json_pretty(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| format!("failed to serialize prompt state: {e}"))
    }

    /// Elements for `block`, if the block has an entry.
    pub fn block(&self, block: &str) -> Option<&BlockPromptElements> {
        self.blocks.get(block)
    }

    /// Entry for `block`, inserting an empty one if absent.
    pub fn block_mut(&mut self, block: &str) -> &mut BlockPromptElements {
        self.blocks.entry(block.to_string()).or_default()
    }
}

// ── Shared state ──────────────────────────────────────────────────────

/// Handle to a prompt state shared between setters and the formatter.
pub type SharedPromptState = Arc<Mutex<PromptState>>;

static PROMPT_STATE: LazyLock<SharedPromptState> =
    LazyLock::new(|| Arc::new(Mutex::new(PromptState::default())));

/// The process-wide prompt state.
pub fn global_state() -> &'static SharedPromptState {
    &PROMPT_STATE
}

/// A fresh, independently owned state seeded with defaults.
pub fn new_shared_state() -> SharedPromptState {
    Arc::new(Mutex::new(PromptState::default()))
}

/// Lock the shared state mutex and run a closure on the guard.
/// A poisoned lock is recovered; the state holds plain data.
macro_rules! with_state {
    ($state:expr, |$s:ident| $body:expr) => {{
        #[allow(unused_mut)]
        let mut $s = $state.lock().unwrap_or_else(|e| e.into_inner());
        $body
    }};
}

/// Snapshot of the whole state.
pub fn load_prompt_state(state: &SharedPromptState) -> PromptState {
    with_state!(state, |s| { s.clone() })
}

/// Replace the whole state.
pub fn save_prompt_state(state: &SharedPromptState, new_state: PromptState) {
    debug!("Replacing prompt state ({} block(s))", new_state.blocks.len());
    with_state!(state, |s| { *s = new_state })
}

/// Set a global element by key.
pub fn update_global_prompt_elem(
    state: &SharedPromptState,
    key: &str,
    value: impl Into<String>,
) -> Result<(), String> {
    let field: GlobalField = key.parse()?;
    let value = value.into();
    trace!("Set global {field} ({} chars)", value.len());
    with_state!(state, |s| { s.global.set(field, value) });
    Ok(())
}

/// Set a block element by key. The value is parsed for the field, so
/// `word_count` must be an unsigned integer.
pub fn update_block_prompt_elem(
    state: &SharedPromptState,
    block: &str,
    key: &str,
    value: &str,
) -> Result<(), String> {
    let field: BlockField = key.parse()?;
    let value = BlockValue::parse(field, value)?;
    trace!("Set block {block}.{field} = {value}");
    with_state!(state, |s| { s.block_mut(block).set(field, value) })
}

/// Read a global element by key.
///
/// Returns the stored value, else `default`, else the element's default
/// (the empty string, also used for unknown keys).
pub fn get_global_prompt_elem(state: &SharedPromptState, key: &str, default: Option<&str>) -> String {
    let stored = key
        .parse::<GlobalField>()
        .ok()
        .and_then(|field| with_state!(state, |s| { s.global.get(field).map(str::to_string) }));
    stored.unwrap_or_else(|| default.unwrap_or_default().to_string())
}

/// Read a block element by key.
///
/// Returns the stored value, else `default`, else the hardcoded default for
/// that block and element, else an empty text value.
pub fn get_block_prompt_elem(
    state: &SharedPromptState,
    block: &str,
    key: &str,
    default: Option<BlockValue>,
) -> BlockValue {
    let field = key.parse::<BlockField>().ok();
    let stored = field.and_then(|field| {
        with_state!(state, |s| { s.block(block).and_then(|b| b.get(field)) })
    });
    stored
        .or(default)
        .or_else(|| field.and_then(|f| block_default(block, f)))
        .unwrap_or_else(|| BlockValue::Text(String::new()))
}
