//! audiobooker - EPUB to chaptered M4B audiobooks
//!
//! Extracts chapters from an EPUB, narrates each one through a TTS backend
//! (a HuggingFace Space, a plain Gradio app, or a local voice-cloning
//! server) and binds the results into a single audiobook. Chapter audio is
//! kept on disk, so interrupted runs resume where they stopped.

// Enforce error handling discipline: propagate, never panic
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod assemble;
pub mod backend;
pub mod book;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod synth;

// Composition root - needs everything
#[cfg(feature = "cli")]
pub mod app;

// Core traits (source → synthesize → assemble)
pub use assemble::ffmpeg::{CommandExecutor, SystemCommandExecutor};
pub use backend::Backend;
pub use book::BookSource;
pub use output::Reporter;

// Pipeline
pub use pipeline::{AfterBook, Pipeline, PipelineConfig};

// Error handling
pub use error::{AudiobookError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
