//! In-memory generator for tests

use super::client::{GenerationError, TextGenerator};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

pub(crate) enum Reply {
    Text(String),
    Fail(GenerationError),
    /// Never answers within any sane test timeout
    Hang,
}

impl Reply {
    pub(crate) fn text(s: &str) -> Self {
        Reply::Text(s.to_string())
    }
}

/// Replays canned replies in order and records what it was asked
pub(crate) struct ScriptedGenerator {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    pub(crate) fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Model ids in call order
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(model, _)| model.clone())
            .collect()
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }
}

impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerationError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), prompt.to_string()));

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(String::new())
            }
            None => Err(GenerationError::Api {
                status: 500,
                message: "script exhausted".to_string(),
            }),
        }
    }
}
