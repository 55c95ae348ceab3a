//! Issues generation calls: one call for the whole book, or one call per
//! chapter when the book does not fit the token budget.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::config::PacingConfig;
use crate::error::CompletionError;
use crate::models::{SizeProfile, TokenUsage};
use crate::services::llm::{ChatMessage, Completion, CompletionApi, CompletionRequest};
use crate::services::metrics::{required_tokens, words_to_tokens};
use crate::services::prompts;

pub const OUTLINE_TOKEN_BUDGET: u32 = 800;
pub const CHAPTER_OVERHEAD_TOKENS: u32 = 200;
const PREMISE_SUMMARY_CHARS: usize = 1500;

/// Waits between calls. Swapped for a recording fake in tests.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, duration: Duration);
}

pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    SingleCall,
    Decomposed,
}

impl GenerationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationMode::SingleCall => "single_call",
            GenerationMode::Decomposed => "decomposed",
        }
    }
}

/// Single call only when every chapter at full length fits the budget.
pub fn select_mode(profile: &SizeProfile, chapter_count: usize, token_budget: u32) -> GenerationMode {
    if required_tokens(profile, chapter_count) > token_budget {
        GenerationMode::Decomposed
    } else {
        GenerationMode::SingleCall
    }
}

/// Everything a generation call needs once model and budget are settled.
#[derive(Debug, Clone)]
pub struct GenerationPlan {
    pub premise: String,
    /// Effective profile: its model and budget are the ones to call with.
    pub profile: SizeProfile,
    pub chapter_count: usize,
    pub genre: String,
    pub audience: String,
}

impl GenerationPlan {
    pub fn mode(&self) -> GenerationMode {
        select_mode(&self.profile, self.chapter_count, self.profile.token_budget)
    }

    pub fn chapter_budget(&self) -> u32 {
        (words_to_tokens(self.profile.max_words_per_chapter) + CHAPTER_OVERHEAD_TOKENS)
            .min(self.profile.token_budget)
    }

    pub fn premise_summary(&self) -> String {
        if self.premise.chars().count() <= PREMISE_SUMMARY_CHARS {
            self.premise.clone()
        } else {
            let mut summary: String = self.premise.chars().take(PREMISE_SUMMARY_CHARS).collect();
            summary.push_str(" [...]");
            summary
        }
    }
}

/// One queued chapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterTask {
    pub index: usize,
    pub focus: &'static str,
}

pub fn plan_chapters(total: usize) -> Vec<ChapterTask> {
    (0..total)
        .map(|index| ChapterTask {
            index,
            focus: prompts::focus_hint(index, total),
        })
        .collect()
}

/// Raw output of decomposed generation; `None` marks a failed call.
#[derive(Debug, Clone, Default)]
pub struct DecomposedOutput {
    pub outline: Option<String>,
    pub chapters: Vec<Option<String>>,
    pub usage: TokenUsage,
}

pub struct CompletionInvoker {
    api: Arc<dyn CompletionApi>,
    pacer: Arc<dyn Pacer>,
    temperature: f32,
    pacing: PacingConfig,
}

impl CompletionInvoker {
    pub fn new(
        api: Arc<dyn CompletionApi>,
        pacer: Arc<dyn Pacer>,
        temperature: f32,
        pacing: PacingConfig,
    ) -> Self {
        Self {
            api,
            pacer,
            temperature,
            pacing,
        }
    }

    /// One request for the whole book, retried on transient failures.
    pub async fn generate(
        &self,
        prompt: &str,
        model: &str,
        token_budget: u32,
    ) -> Result<Completion, CompletionError> {
        let request = CompletionRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage::system(prompts::system_message()),
                ChatMessage::user(prompt),
            ],
            max_tokens: token_budget,
            temperature: self.temperature,
        };
        self.call_with_retry(&request).await
    }

    pub async fn generate_chapter(
        &self,
        plan: &GenerationPlan,
        task: &ChapterTask,
    ) -> Result<Completion, CompletionError> {
        let prompt = prompts::build_chapter_prompt(
            &plan.premise_summary(),
            task.index,
            plan.chapter_count,
            task.focus,
            &plan.profile,
            &plan.genre,
            &plan.audience,
        );
        self.generate(&prompt, &plan.profile.model, plan.chapter_budget())
            .await
    }

    /// Outline first, then each chapter in order with a fixed pause between
    /// calls. A failed chapter leaves a gap instead of aborting the book,
    /// unless the failure would repeat for every remaining call.
    pub async fn generate_decomposed(
        &self,
        plan: &GenerationPlan,
    ) -> Result<DecomposedOutput, CompletionError> {
        let mut output = DecomposedOutput::default();

        let outline_prompt = prompts::build_outline_prompt(
            &plan.premise,
            &plan.profile,
            plan.chapter_count,
            &plan.genre,
            &plan.audience,
        );
        let outline_budget = OUTLINE_TOKEN_BUDGET.min(plan.profile.token_budget);
        match self
            .generate(&outline_prompt, &plan.profile.model, outline_budget)
            .await
        {
            Ok(completion) => {
                output.usage.add(completion.usage);
                output.outline = Some(completion.text);
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => tracing::warn!("outline call failed, continuing without it: {}", err),
        }

        let tasks = plan_chapters(plan.chapter_count);
        tracing::info!(
            "generating {} chapters one by one with model {} ({} tokens each)",
            tasks.len(),
            plan.profile.model,
            plan.chapter_budget()
        );

        for task in &tasks {
            self.pacer.pause(self.pacing.chapter_delay).await;

            match self.generate_chapter(plan, task).await {
                Ok(completion) => {
                    tracing::debug!("chapter {} generated", task.index + 1);
                    output.usage.add(completion.usage);
                    output.chapters.push(Some(completion.text));
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        "chapter {} call failed, a placeholder will be used: {}",
                        task.index + 1,
                        err
                    );
                    output.chapters.push(None);
                }
            }
        }

        Ok(output)
    }

    async fn call_with_retry(
        &self,
        request: &CompletionRequest,
    ) -> Result<Completion, CompletionError> {
        let mut attempt = 0;
        loop {
            match self.api.complete(request).await {
                Ok(completion) => {
                    if attempt > 0 {
                        tracing::info!("completion succeeded after {} retries", attempt);
                    }
                    return Ok(completion);
                }
                Err(err) if err.is_retryable() && attempt < self.pacing.max_retries => {
                    let delay = self.backoff_delay(attempt, &err);
                    tracing::warn!(
                        "completion failed (attempt {}/{}), retrying in {}ms: {}",
                        attempt + 1,
                        self.pacing.max_retries + 1,
                        delay.as_millis(),
                        err
                    );
                    self.pacer.pause(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn backoff_delay(&self, attempt: u32, err: &CompletionError) -> Duration {
        let base = self.pacing.retry_base_delay * 2u32.saturating_pow(attempt);
        let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 4);
        let delay = base + Duration::from_millis(jitter_ms);
        match err {
            CompletionError::RateLimited {
                retry_after: Some(after),
            } => delay.max(*after),
            _ => delay,
        }
    }
}
