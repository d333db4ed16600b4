use super::client::{GenerationError, TextGenerator};
use super::prompts::build_fix_prompt;
use crate::report::FileTask;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ordered model list plus per-attempt limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackChain {
    /// Tried in order, cheapest first
    pub models: Vec<String>,
    /// Upper bound on a single model call
    pub attempt_timeout: Duration,
    /// Pause before the next model after a rate-limit failure
    pub rate_limit_pause: Duration,
}

/// Outcome of one model call
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(String),
    Failure(GenerationError),
}

#[derive(Debug)]
pub struct GenerationAttempt {
    pub model_id: String,
    pub outcome: AttemptOutcome,
}

/// Text produced by the first model that answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPatch {
    pub model: String,
    pub text: String,
    /// 1-based position of `model` in the chain
    pub attempts: usize,
}

#[derive(Debug)]
enum FallbackState {
    Trying(usize),
    Succeeded(GeneratedPatch),
    Exhausted(GenerationError),
}

/// Generator handle that walks the fallback chain for each file.
///
/// Constructed once and passed down; holds the backend (and through it the
/// credential) but no per-file state.
#[derive(Debug)]
pub struct PatchGenerator<G> {
    backend: G,
    chain: FallbackChain,
}

impl<G: TextGenerator> PatchGenerator<G> {
    pub fn new(backend: G, chain: FallbackChain) -> Self {
        Self { backend, chain }
    }

    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    #[cfg(test)]
    pub(crate) fn backend(&self) -> &G {
        &self.backend
    }

    /// Ask for a fixed version of `content` addressing the task's diagnostics.
    ///
    /// Returns the trimmed text of the first model with a non-empty answer,
    /// or the last model's failure once the chain is exhausted.
    pub async fn generate(
        &self,
        task: &FileTask,
        content: &str,
    ) -> Result<GeneratedPatch, GenerationError> {
        let prompt = build_fix_prompt(task, content);
        self.run_chain(&prompt).await
    }

    async fn run_chain(&self, prompt: &str) -> Result<GeneratedPatch, GenerationError> {
        let mut state = FallbackState::Trying(0);
        let mut last_error: Option<GenerationError> = None;

        loop {
            state = match state {
                FallbackState::Trying(idx) => match self.chain.models.get(idx) {
                    Some(model) => self.step(idx, model, prompt, &mut last_error).await,
                    None => FallbackState::Exhausted(
                        last_error.take().unwrap_or(GenerationError::NoModels),
                    ),
                },
                FallbackState::Succeeded(patch) => return Ok(patch),
                FallbackState::Exhausted(err) => return Err(err),
            };
        }
    }

    /// Run one model and decide the next state
    async fn step(
        &self,
        idx: usize,
        model: &str,
        prompt: &str,
        last_error: &mut Option<GenerationError>,
    ) -> FallbackState {
        let total = self.chain.models.len();
        info!(model = %model, attempt = idx + 1, of = total, "requesting fix");

        let attempt = self.attempt(model, prompt).await;
        match attempt.outcome {
            AttemptOutcome::Success(text) => FallbackState::Succeeded(GeneratedPatch {
                model: attempt.model_id,
                text,
                attempts: idx + 1,
            }),
            AttemptOutcome::Failure(err) => {
                warn!(model = %attempt.model_id, error = %err, "model failed");
                if err.is_rate_limited() && idx + 1 < total {
                    let pause = err.retry_after().unwrap_or(self.chain.rate_limit_pause);
                    debug!(
                        pause_ms = pause.as_millis() as u64,
                        "rate limited, pausing before next model"
                    );
                    tokio::time::sleep(pause).await;
                }
                *last_error = Some(err);
                FallbackState::Trying(idx + 1)
            }
        }
    }

    async fn attempt(&self, model: &str, prompt: &str) -> GenerationAttempt {
        let call = self.backend.generate(model, prompt);
        let outcome = match tokio::time::timeout(self.chain.attempt_timeout, call).await {
            Ok(Ok(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    AttemptOutcome::Failure(GenerationError::EmptyResponse)
                } else {
                    AttemptOutcome::Success(text.to_string())
                }
            }
            Ok(Err(err)) => AttemptOutcome::Failure(err),
            Err(_) => AttemptOutcome::Failure(GenerationError::Timeout(self.chain.attempt_timeout)),
        };

        GenerationAttempt {
            model_id: model.to_string(),
            outcome,
        }
    }
}
