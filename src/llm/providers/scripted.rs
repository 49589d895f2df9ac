//! Test provider: replays queued replies and records what it was asked.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::llm::{CompletionRequest, LlmProvider, ProviderError};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub system_prompt: String,
    pub user_input: String,
    pub history_len: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ScriptedProvider {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, String>>,
    {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().collect())),
            requests: Arc::default(),
        }
    }

    pub fn provider(&self) -> LlmProvider {
        LlmProvider::Scripted(self.clone())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub async fn generate(&self, request: &CompletionRequest<'_>) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            system_prompt: request.system_prompt.to_string(),
            user_input: request.user_input.to_string(),
            history_len: request.history.len(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        });
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(e)) => Err(ProviderError::Request(e)),
            None => Err(ProviderError::Request("script exhausted".into())),
        }
    }
}
