//! The schedule generation seam.
//!
//! A [`Generator`] receives a rendered [`GenerationPrompt`] and returns the
//! engine's raw reply text. The reply is untrusted: everything it says is
//! parsed and validated by [`crate::response`] and [`crate::validate`].

pub mod openai;
pub mod scripted;

use async_trait::async_trait;
use thiserror::Error;

pub use openai::{GeneratorConfig, OpenAiGenerator};
pub use scripted::{ScriptedGenerator, ScriptedReply};

/// The rendered request sent to a generation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPrompt {
    /// Standing instructions: scheduling guidelines and reply contract.
    pub system: String,
    /// The request itself: date, preferences, tasks, reply schema.
    pub user: String,
}

/// Failure of a single generation call.
///
/// All variants are recoverable from the pipeline's point of view: they
/// count as an attempt that scheduled nothing.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation engine returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("generation engine returned an empty reply")]
    Empty,

    #[error("failed to decode generation reply: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no API key configured for the generation engine")]
    MissingApiKey,

    #[error("generation failed: {0}")]
    Other(String),
}

/// Adapter interface for schedule generation engines.
///
/// Object-safe so the pipeline can hold `&dyn Generator`.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Human-readable name used in logs (e.g. "openai:gpt-4o").
    fn name(&self) -> &str;

    /// Send `prompt` and return the raw reply text.
    async fn generate(&self, prompt: &GenerationPrompt) -> Result<String, GenerationError>;
}

// Compile-time assertion: Generator must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Generator) {}
};
