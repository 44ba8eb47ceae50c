#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Grammar synthesis for the directive planner.
//!
//! Every directive gets a fresh grammar whose root accepts exactly one JSON
//! action document naming either a console command or a batch of world
//! intents, restricted to the candidates retrieved for that directive.

/// String escaping for JSON text and grammar terminals.
pub mod escape;
/// Scratch files handed to the inference backend.
pub mod scratch;
/// Grammar text construction.
pub mod synth;

pub use escape::{grammar_literal, json_escape};
pub use scratch::{GrammarArtifact, GrammarScratch};
pub use synth::{build_grammar, CONSOLE_PLACEHOLDER, INTENT_PLACEHOLDER};
