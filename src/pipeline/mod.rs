//! Pipeline stages for turning source text into study material.
//!
//! Each submodule implements exactly one step. Only [`llm`] does I/O; every
//! other stage is a pure, total function over strings and can be tested
//! without a model.
//!
//! ## Data Flow
//!
//! ```text
//! budget ──▶ prompts ──▶ llm ──▶ extract | dialogue | postprocess ──▶ assemble
//! (trim)     (render)   (call)   (normalise raw text)                 (ids, time)
//! ```
//!
//! 1. [`llm`]         lazily built backend, timeout, retries, sentinel on failure
//! 2. [`extract`]     JSON array recovery for flashcards and quiz questions
//! 3. [`dialogue`]    `Name: text` lines to an attributed two-speaker script
//! 4. [`postprocess`] Markdown tidy-up for explanations
//! 5. [`assemble`]    wrap items into results with ids and timestamps

pub mod assemble;
pub mod dialogue;
pub mod extract;
pub mod llm;
pub mod postprocess;
