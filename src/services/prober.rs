use std::sync::Arc;

use crate::models::SizeProfile;
use crate::services::llm::{ChatMessage, CompletionApi, CompletionRequest};
use crate::services::prompts::{PROBE_WORD, probe_prompt};

const PROBE_TOKEN_BUDGET: u32 = 10;
const PROBE_TEMPERATURE: f32 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub available: bool,
    pub model: String,
    pub token_budget: u32,
}

/// Confirms a model answers before the full request is committed to it.
pub struct ModelProber {
    api: Arc<dyn CompletionApi>,
    baseline_model: String,
    fallback_token_budget: u32,
}

impl ModelProber {
    pub fn new(
        api: Arc<dyn CompletionApi>,
        baseline_model: impl Into<String>,
        fallback_token_budget: u32,
    ) -> Self {
        Self {
            api,
            baseline_model: baseline_model.into(),
            fallback_token_budget,
        }
    }

    /// Always yields a usable model and budget; failures select the baseline.
    pub async fn probe(&self, profile: &SizeProfile) -> ProbeOutcome {
        if self.is_baseline(&profile.model) {
            return ProbeOutcome {
                available: true,
                model: profile.model.clone(),
                token_budget: profile.token_budget,
            };
        }

        tracing::info!("probing access to model {}", profile.model);
        let request = CompletionRequest {
            model: profile.model.clone(),
            messages: vec![ChatMessage::user(probe_prompt())],
            max_tokens: PROBE_TOKEN_BUDGET,
            temperature: PROBE_TEMPERATURE,
        };

        let failure = match self.api.complete(&request).await {
            Ok(completion) if completion.text.to_uppercase().contains(PROBE_WORD) => {
                tracing::info!("model {} confirmed available", profile.model);
                return ProbeOutcome {
                    available: true,
                    model: profile.model.clone(),
                    token_budget: profile.token_budget,
                };
            }
            Ok(completion) => format!("unexpected probe reply: {:?}", completion.text),
            Err(err) => err.to_string(),
        };

        let outcome = self.fallback(profile);
        tracing::warn!(
            "model {} unavailable ({}), falling back to {} with {} tokens",
            profile.model,
            failure,
            outcome.model,
            outcome.token_budget
        );
        outcome
    }

    pub fn is_baseline(&self, model: &str) -> bool {
        model == self.baseline_model
    }

    /// The baseline model with the profile budget capped at the fallback budget.
    pub fn fallback(&self, profile: &SizeProfile) -> ProbeOutcome {
        ProbeOutcome {
            available: false,
            model: self.baseline_model.clone(),
            token_budget: profile.token_budget.min(self.fallback_token_budget),
        }
    }
}
