//! Test doubles shared across module tests.

use crate::llm::{ChatBackend, ChatMessage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Backend that replays canned answers in order and records every call.
///
/// Once the script runs out every further call answers `None`.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Option<String>>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| r.map(Into::into)).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Some(*r)))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn generate(&self, messages: &[ChatMessage]) -> Option<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        self.replies.lock().unwrap().pop_front().flatten()
    }
}
