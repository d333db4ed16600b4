pub mod client;
pub mod fallback;
pub mod prompts;
pub mod sanitize;

#[cfg(test)]
pub(crate) mod scripted;

pub use client::{GeminiClient, GenerationError, TextGenerator};
pub use fallback::{FallbackChain, GeneratedPatch, PatchGenerator};
pub use sanitize::sanitize;
