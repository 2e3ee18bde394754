//! A generator that replays canned replies, for tests and offline demos.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::debug;

use super::{GenerationError, GenerationPrompt, Generator};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return this text.
    Text(String),
    /// Fail with [`GenerationError::Other`].
    Error(String),
    /// Never complete; exercises timeouts and cancellation.
    Hang,
}

/// Replays [`ScriptedReply`] values in order, one per call.
///
/// Calls beyond the end of the script fail. Every prompt received is
/// recorded for inspection.
pub struct ScriptedGenerator {
    replies: Vec<ScriptedReply>,
    call_count: AtomicUsize,
    prompts: Mutex<Vec<GenerationPrompt>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies,
            call_count: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Convenience constructor for text-only scripts.
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| ScriptedReply::Text(t.into())).collect())
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<GenerationPrompt> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &GenerationPrompt) -> Result<String, GenerationError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.clone());

        let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
        debug!(idx, "ScriptedGenerator::generate");

        match self.replies.get(idx) {
            Some(ScriptedReply::Text(text)) => Ok(text.clone()),
            Some(ScriptedReply::Error(message)) => Err(GenerationError::Other(message.clone())),
            Some(ScriptedReply::Hang) => std::future::pending().await,
            None => Err(GenerationError::Other(
                "scripted generator exhausted".to_string(),
            )),
        }
    }
}
