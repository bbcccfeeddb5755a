//! Generation backend: the [`TextGenerator`] seam and its OpenRouter
//! implementation.
//!
//! - [`streaming`]: SSE parser for incremental text deltas, URL-citation
//!   annotations, usage and stream errors. Produces
//!   [`StreamEvent`](streaming::StreamEvent) values.
//! - [`generator`]: the [`TextGenerator`] trait and [`OpenRouterGenerator`],
//!   which streams a single prompt and collects chunks and citations.

pub mod generator;
pub mod streaming;

pub use generator::{GenerateFuture, Generation, OpenRouterGenerator, TextGenerator};
pub use streaming::StreamEvent;
