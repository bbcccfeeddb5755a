//! Compose a story block prompt and generate the block through OpenRouter.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Print the prompt that would be sent, without calling the API
//! storyblock --block Main --story-title "Salt Roads" --tone lyrical --print-prompt
//!
//! # Generate the introduction, streaming text as it arrives
//! storyblock --block Introduction --story-title "Salt Roads" \
//!   --audience "curious teenagers" --keywords "caravan, salt, Timbuktu" --stream
//!
//! # Seed the state from a JSON file, then override single elements
//! storyblock --state story.json --set audience=historians --set-block word_count=120
//! ```

use std::io::Write;
use std::process;

use clap::Parser;
use storyblock::api::OpenRouterGenerator;
use storyblock::config::GeneratorConfig;
use storyblock::generate::{try_generate_block, user_friendly_error_message};
use storyblock::prompt::format_shared_prompt;
use storyblock::state::{
    PromptState, SharedPromptState, global_state, load_prompt_state, save_prompt_state,
    update_block_prompt_elem, update_global_prompt_elem,
};
use storyblock::{DEFAULT_MODEL, OpenRouterClient};
use tracing::debug;
use tracing_subscriber::filter::LevelFilter;

/// Compose a story block prompt and generate the block through OpenRouter.
///
/// Reads the API key from the OPENROUTER_KEY environment variable.
#[derive(Parser)]
#[command(name = "storyblock")]
struct Cli {
    /// Block to format or generate
    #[arg(long, default_value = "Introduction")]
    block: String,

    /// JSON file with an initial prompt state
    #[arg(long)]
    state: Option<String>,

    // ── Global elements ────────────────────────────────────────
    /// Story title
    #[arg(long)]
    story_title: Option<String>,

    /// Tone and style
    #[arg(long)]
    tone: Option<String>,

    /// Target audience
    #[arg(long)]
    audience: Option<String>,

    /// Persona first name (write in the style of ...)
    #[arg(long)]
    persona_first_name: Option<String>,

    /// Persona last name
    #[arg(long)]
    persona_last_name: Option<String>,

    /// Style exemplar text
    #[arg(long)]
    exemplars: Option<String>,

    /// Set a global element by key (KEY=VALUE, repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set_global: Vec<String>,

    // ── Block elements ─────────────────────────────────────────
    /// Block title
    #[arg(long)]
    block_title: Option<String>,

    /// Target word count for the block
    #[arg(long)]
    word_count: Option<u32>,

    /// Keywords to include
    #[arg(long)]
    keywords: Option<String>,

    /// Additional notes
    #[arg(long)]
    notes: Option<String>,

    /// Set an element of the selected block by key (KEY=VALUE, repeatable)
    #[arg(long = "set-block", value_name = "KEY=VALUE")]
    set_block: Vec<String>,

    // ── Generation ─────────────────────────────────────────────
    /// Model to use
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Maximum tokens in the response
    #[arg(long, default_value_t = 2048)]
    max_tokens: u32,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.7)]
    temperature: f32,

    /// Disable the web-search plugin
    #[arg(long)]
    no_web_search: bool,

    /// Number of web search results
    #[arg(long)]
    web_max_results: Option<u32>,

    /// Optional system prompt
    #[arg(long)]
    system: Option<String>,

    /// Print text chunks as they stream in
    #[arg(long)]
    stream: bool,

    // ── Output mode ────────────────────────────────────────────
    /// Print the formatted prompt and exit
    #[arg(long)]
    print_prompt: bool,

    /// Print the resulting prompt state as JSON and exit
    #[arg(long)]
    dump_state: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::ERROR;
        }
        match self.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            web_search: !self.no_web_search,
            web_max_results: self.web_max_results,
            system_prompt: self.system.clone(),
        }
    }
}

/// Split a `KEY=VALUE` argument.
fn split_assignment(raw: &str) -> Result<(&str, &str), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim(), v))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

/// Apply the state file and element flags to `state`.
fn apply_state_args(cli: &Cli, state: &SharedPromptState) -> Result<(), String> {
    if let Some(ref path) = cli.state {
        save_prompt_state(state, PromptState::from_file(path)?);
        debug!("Loaded prompt state from {path}");
    }

    let globals = [
        ("story_title", &cli.story_title),
        ("tone_style", &cli.tone),
        ("audience", &cli.audience),
        ("persona_first_name", &cli.persona_first_name),
        ("persona_last_name", &cli.persona_last_name),
        ("exemplars", &cli.exemplars),
    ];
    for (key, value) in globals {
        if let Some(value) = value {
            update_global_prompt_elem(state, key, value.as_str())?;
        }
    }
    for raw in &cli.set_global {
        let (key, value) = split_assignment(raw)?;
        update_global_prompt_elem(state, key, value)?;
    }

    let block = cli.block.as_str();
    let word_count = cli.word_count.map(|n| n.to_string());
    let block_elems = [
        ("title", cli.block_title.as_ref()),
        ("word_count", word_count.as_ref()),
        ("keywords", cli.keywords.as_ref()),
        ("notes", cli.notes.as_ref()),
    ];
    for (key, value) in block_elems {
        if let Some(value) = value {
            update_block_prompt_elem(state, block, key, value)?;
        }
    }
    for raw in &cli.set_block {
        let (key, value) = split_assignment(raw)?;
        update_block_prompt_elem(state, block, key, value)?;
    }
    Ok(())
}

async fn run(cli: &Cli) -> Result<String, String> {
    let state = global_state();
    apply_state_args(cli, state)?;

    if cli.dump_state {
        return load_prompt_state(state).to_json_pretty();
    }
    if cli.print_prompt {
        return Ok(format_shared_prompt(state, &cli.block));
    }

    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "OPENROUTER_KEY environment variable is not set".to_string())?;
    let client = OpenRouterClient::new(api_key)?;
    let generator = OpenRouterGenerator::new(client, cli.generator_config());

    let snapshot = load_prompt_state(state);
    let stream = cli.stream;
    let mut printed = 0usize;
    let mut on_chunk = |chunk: &str| {
        printed += chunk.len();
        if stream {
            print!("{chunk}");
            let _ = std::io::stdout().flush();
        }
    };

    let text = try_generate_block(&generator, &snapshot, &cli.block, &mut on_chunk)
        .await
        .map_err(|e| user_friendly_error_message(&e))?;

    if stream {
        // The body is already on stdout; only the citation footer remains.
        Ok(text.get(printed..).unwrap_or_default().to_string())
    } else {
        Ok(text)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .init();

    match run(&cli).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
