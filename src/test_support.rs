//! Fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CompletionError;
use crate::models::TokenUsage;
use crate::services::invoker::Pacer;
use crate::services::llm::{Completion, CompletionApi, CompletionRequest};

pub fn completion(text: &str, total_tokens: u32) -> Completion {
    Completion {
        text: text.to_string(),
        usage: TokenUsage {
            prompt_tokens: 0,
            completion_tokens: total_tokens,
            total_tokens,
        },
    }
}

/// Replays a fixed list of outcomes and records every request.
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Result<Completion, CompletionError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new(script: Vec<Result<Completion, CompletionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionApi for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(CompletionError::Transport(
                "script exhausted".to_string(),
            ))
        })
    }
}

#[derive(Default)]
pub struct RecordingPacer {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingPacer {
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pacer for RecordingPacer {
    async fn pause(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}

/// Chapter prose long enough to pass every length check.
pub fn chapter_prose(seed: &str) -> String {
    let sentence = format!(
        "The tide pulled at the rocks below while {seed} climbed the iron stairs, \
         counting each step and listening to the wind argue with the lamp. "
    );
    sentence.repeat(12)
}

/// A well-formed JSON book reply with `chapters` chapters.
pub fn json_book(title: &str, chapters: usize) -> String {
    let chapters: Vec<serde_json::Value> = (0..chapters)
        .map(|i| {
            serde_json::json!({
                "title": format!("The Keeper's Night {}", i + 1),
                "content": chapter_prose(&format!("Elias ({})", i + 1)),
            })
        })
        .collect();
    serde_json::json!({
        "title": title,
        "synopsis": "Elias keeps the light on a rock nobody visits, until a bottle arrives with a letter from a ship that vanished a hundred years ago.",
        "chapters": chapters,
    })
    .to_string()
}
