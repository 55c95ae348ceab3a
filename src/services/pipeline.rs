//! The book generation pipeline: validate, probe, invoke, repair, guard and
//! summarize, one stage after the other.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::config::AppConfig;
use crate::error::{CompletionError, GenerationError};
use crate::models::{
    BookDocument, BookInfo, BookMetadata, BookParameters, Chapter, GeneratedBook, GenerationInfo,
    GenerationRequest, SizeProfile, SizeProfiles, TechnicalInfo, TokenUsage,
};
use crate::services::invoker::{
    ChapterTask, CompletionInvoker, GenerationMode, GenerationPlan, Pacer,
};
use crate::services::llm::CompletionApi;
use crate::services::metrics::summarize;
use crate::services::originality::{check_originality, synthesize_alternative};
use crate::services::prober::{ModelProber, ProbeOutcome};
use crate::services::repair::{self, RepairedBook};
use crate::services::validator::prepare_request;
use crate::services::{prompts, validator};

/// What a successful run produces, plus what is needed to store it.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub book: GeneratedBook,
    /// The premise as it was sent to the model (trimmed, possibly truncated).
    pub premise: String,
    pub parameters: BookParameters,
}

pub struct BookGenerator {
    profiles: SizeProfiles,
    prober: ModelProber,
    invoker: CompletionInvoker,
}

impl BookGenerator {
    pub fn new(api: Arc<dyn CompletionApi>, pacer: Arc<dyn Pacer>, config: &AppConfig) -> Self {
        Self {
            profiles: SizeProfiles::builtin(),
            prober: ModelProber::new(
                api.clone(),
                config.completion.baseline_model.clone(),
                config.completion.fallback_token_budget,
            ),
            invoker: CompletionInvoker::new(
                api,
                pacer,
                config.completion.temperature,
                config.pacing.clone(),
            ),
        }
    }

    pub fn profiles(&self) -> &SizeProfiles {
        &self.profiles
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<PipelineOutput, GenerationError> {
        let started = Instant::now();
        let prepared = prepare_request(request, &self.profiles)?;
        for issue in &prepared.issues {
            tracing::warn!("request auto-corrected: {}", issue);
        }
        tracing::info!(
            "generating {} book: {} chapters, genre {}, audience {}",
            prepared.profile.id,
            prepared.chapter_count,
            prepared.genre,
            prepared.audience
        );

        let mut probe = self.prober.probe(&prepared.profile).await;
        let mut plan = GenerationPlan {
            profile: effective_profile(&prepared.profile, &probe),
            premise: prepared.premise.clone(),
            chapter_count: prepared.chapter_count,
            genre: prepared.genre.clone(),
            audience: prepared.audience.clone(),
        };

        let first = self.invoke(&plan).await;
        let (repaired, usage) = match first {
            Ok(result) => result,
            Err(CompletionError::ModelNotFound { model, message })
                if !self.prober.is_baseline(&plan.profile.model) =>
            {
                tracing::warn!(
                    "model {} disappeared after the probe ({}), retrying with the baseline",
                    model,
                    message
                );
                probe = self.prober.fallback(&prepared.profile);
                plan.profile = effective_profile(&prepared.profile, &probe);
                self.invoke(&plan).await?
            }
            Err(err) => return Err(err.into()),
        };
        let mode = plan.mode();

        let (document, originality_fallback) = guard(repaired.document, &plan);
        let statistics = summarize(&document);
        let elapsed = started.elapsed();
        tracing::info!(
            "book \"{}\" ready: {} chapters, {} characters, {} tokens in {}ms",
            document.title,
            document.chapters.len(),
            statistics.total_characters,
            usage.total_tokens,
            elapsed.as_millis()
        );

        let metadata = BookMetadata {
            generation: GenerationInfo {
                model: plan.profile.model.clone(),
                tokens_used: usage.total_tokens,
                generation_time_ms: elapsed.as_millis() as u64,
                timestamp: Utc::now(),
            },
            book_info: BookInfo {
                size: prepared.profile.label.clone(),
                estimated_pages: statistics.estimated_pages,
                estimated_reading_time: format!(
                    "{} minutes",
                    statistics.estimated_reading_minutes
                ),
                total_chapters: document.chapters.len(),
                total_characters: statistics.total_characters,
                genre: plan.genre.clone(),
                audience: plan.audience.clone(),
            },
            technical: TechnicalInfo {
                model_available: probe.available,
                max_tokens_config: plan.profile.token_budget,
                final_model: plan.profile.model.clone(),
                mode: mode.as_str().to_string(),
                repair_tier: repaired.tier.as_str().to_string(),
                originality_fallback,
            },
            issues: prepared.issues,
        };

        Ok(PipelineOutput {
            parameters: BookParameters {
                size: prepared.profile.id.clone(),
                genre: plan.genre.clone(),
                audience: plan.audience.clone(),
                chapter_count: plan.chapter_count,
            },
            premise: plan.premise,
            book: GeneratedBook { document, metadata },
        })
    }

    /// Runs the mode the plan selects and repairs whatever comes back.
    async fn invoke(
        &self,
        plan: &GenerationPlan,
    ) -> Result<(RepairedBook, TokenUsage), CompletionError> {
        let mode = plan.mode();
        tracing::info!(
            "using {} with {} tokens in {} mode",
            plan.profile.model,
            plan.profile.token_budget,
            mode.as_str()
        );
        match mode {
            GenerationMode::SingleCall => self.single_call(plan).await,
            GenerationMode::Decomposed => {
                let output = self.invoker.generate_decomposed(plan).await?;
                Ok((
                    repair::assemble_decomposed(&output, plan.chapter_count),
                    output.usage,
                ))
            }
        }
    }

    async fn single_call(
        &self,
        plan: &GenerationPlan,
    ) -> Result<(RepairedBook, TokenUsage), CompletionError> {
        let prompt = prompts::build_book_prompt(
            &plan.premise,
            &plan.profile,
            plan.chapter_count,
            &plan.genre,
            &plan.audience,
        );
        match self
            .invoker
            .generate(&prompt, &plan.profile.model, plan.profile.token_budget)
            .await
        {
            Ok(completion) => Ok((
                repair::parse(&completion.text, plan.chapter_count),
                completion.usage,
            )),
            Err(err) if is_absorbed(&err) => {
                tracing::warn!("completion unusable, repairing from nothing: {}", err);
                Ok((repair::parse("", plan.chapter_count), TokenUsage::default()))
            }
            Err(err) => Err(err),
        }
    }

    /// Writes one chapter of a stored book again, keeping its place in the arc.
    pub async fn regenerate_chapter(
        &self,
        premise: &str,
        parameters: &BookParameters,
        index: usize,
        total: usize,
    ) -> Result<Chapter, GenerationError> {
        let profile = self.profiles.get(&parameters.size).ok_or_else(|| {
            GenerationError::validation(format!("unknown book size `{}`", parameters.size))
        })?;
        let validated = validator::validate(premise);
        if validated.is_blocked() {
            return Err(GenerationError::Validation {
                issues: validated.issue_messages(),
            });
        }

        let probe = self.prober.probe(profile).await;
        let mut plan = GenerationPlan {
            profile: effective_profile(profile, &probe),
            premise: validated.sanitized,
            chapter_count: total,
            genre: parameters.genre.clone(),
            audience: parameters.audience.clone(),
        };
        let task = ChapterTask {
            index,
            focus: prompts::focus_hint(index, total),
        };
        tracing::info!("regenerating chapter {} of {}", index + 1, total);

        let first = self.invoker.generate_chapter(&plan, &task).await;
        let completion = match first {
            Ok(completion) => completion,
            Err(CompletionError::ModelNotFound { model, .. })
                if !self.prober.is_baseline(&plan.profile.model) =>
            {
                tracing::warn!(
                    "model {} disappeared after the probe, retrying with the baseline",
                    model
                );
                plan.profile = effective_profile(profile, &self.prober.fallback(profile));
                self.invoker.generate_chapter(&plan, &task).await?
            }
            Err(err) => return Err(err.into()),
        };
        let chapter = repair::parse_chapter(&completion.text, index);

        let single = BookDocument {
            title: String::new(),
            synopsis: String::new(),
            chapters: vec![chapter],
        };
        let chapters = if check_originality(&single, &plan.premise, &plan.profile)
            .needs_regeneration()
        {
            synthesize_alternative(&plan).chapters
        } else {
            single.chapters
        };
        let position = if chapters.len() == 1 { 0 } else { index };
        Ok(chapters
            .into_iter()
            .nth(position)
            .unwrap_or_else(|| repair::synthesized_chapter(index)))
    }
}

fn effective_profile(profile: &SizeProfile, probe: &ProbeOutcome) -> SizeProfile {
    if probe.available {
        profile.clone()
    } else {
        profile.degraded(&probe.model, probe.token_budget)
    }
}

/// Malformed or unreachable completions become a repaired document.
fn is_absorbed(err: &CompletionError) -> bool {
    matches!(
        err,
        CompletionError::MalformedResponse(_) | CompletionError::Transport(_)
    )
}

/// Replaces an echoed book with the premise-aware skeleton. Terminal: the
/// substitute is not checked again and the model is not called again.
fn guard(document: BookDocument, plan: &GenerationPlan) -> (BookDocument, bool) {
    let verdict = check_originality(&document, &plan.premise, &plan.profile);
    if verdict.needs_regeneration() {
        tracing::warn!(
            "{} chapter(s) echo the request, substituting a synthesized book",
            verdict.flagged.len()
        );
        (synthesize_alternative(plan), true)
    } else {
        (document, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::models::ChapterOrigin;
    use crate::services::repair::PLACEHOLDER_TITLE;
    use crate::services::validator::MAX_PREMISE_CHARS;
    use crate::test_support::{
        RecordingPacer, ScriptedCompletion, chapter_prose, completion, json_book,
    };
    use std::time::Duration;

    const PREMISE: &str =
        "A lighthouse keeper discovers a message in a bottle from a ship lost a century ago.";

    fn request(size: &str, chapter_count: Option<u32>) -> GenerationRequest {
        GenerationRequest {
            description: PREMISE.to_string(),
            size: size.to_string(),
            genre: Some("mystery".to_string()),
            audience: Some("adult".to_string()),
            chapter_count,
        }
    }

    fn generator(api: Arc<ScriptedCompletion>, pacer: Arc<RecordingPacer>) -> BookGenerator {
        BookGenerator::new(api, pacer, &test_config())
    }

    fn outline() -> String {
        r#"{"title": "The Last Letter of the Meridian", "synopsis": "Elias keeps the light until a bottle brings a letter from a ship lost a century ago."}"#.to_string()
    }

    fn chapter_reply(index: usize) -> String {
        serde_json::json!({
            "title": format!("Tide {}", index + 1),
            "content": chapter_prose(&format!("Elias {}", index + 1)),
        })
        .to_string()
    }

    #[tokio::test]
    async fn happy_path_small_book() {
        let mut script = vec![Ok(completion(&outline(), 50))];
        script.extend((0..4).map(|i| Ok(completion(&chapter_reply(i), 400))));
        let api = Arc::new(ScriptedCompletion::new(script));
        let pacer = Arc::new(RecordingPacer::default());

        let output = generator(api.clone(), pacer.clone())
            .generate(&request("small", None))
            .await
            .unwrap();
        let book = &output.book;

        assert_eq!(book.document.chapters.len(), 4);
        assert_ne!(book.document.title, PLACEHOLDER_TITLE);
        assert_eq!(book.document.title, "The Last Letter of the Meridian");
        assert!(
            book.document
                .chapters
                .iter()
                .all(|c| c.origin == ChapterOrigin::Generated)
        );
        assert_eq!(book.metadata.generation.tokens_used, 1650);
        assert_eq!(book.metadata.book_info.size, "Small");
        assert_eq!(book.metadata.book_info.genre, "mystery");
        assert_eq!(book.metadata.technical.mode, "decomposed");
        assert!(!book.metadata.technical.originality_fallback);
        assert_eq!(output.parameters.size, "small");

        // no probe for the baseline model: outline plus one call per chapter
        assert_eq!(api.requests().len(), 5);
        assert_eq!(pacer.pauses(), vec![Duration::from_millis(1000); 4]);
    }

    #[tokio::test]
    async fn fitting_request_uses_a_single_call() {
        let api = Arc::new(ScriptedCompletion::new(vec![Ok(completion(
            &json_book("Salt and Light", 3),
            900,
        ))]));
        let pacer = Arc::new(RecordingPacer::default());

        let output = generator(api.clone(), pacer.clone())
            .generate(&request("small", Some(3)))
            .await
            .unwrap();

        assert_eq!(output.book.document.title, "Salt and Light");
        assert_eq!(output.book.metadata.technical.mode, "single_call");
        assert_eq!(output.book.metadata.technical.repair_tier, "strict_json");
        assert_eq!(api.requests()[0].max_tokens, 6000);
        assert!(pacer.pauses().is_empty());
    }

    #[tokio::test]
    async fn malformed_single_call_still_yields_requested_chapters() {
        let api = Arc::new(ScriptedCompletion::new(vec![Ok(completion(
            "Sure! Here's your book: {incomplete json",
            20,
        ))]));

        let output = generator(api, Arc::new(RecordingPacer::default()))
            .generate(&request("small", Some(2)))
            .await
            .unwrap();

        assert_eq!(output.book.document.chapters.len(), 2);
        assert_eq!(output.book.metadata.technical.repair_tier, "synthesis");
        // placeholders are not judged as echoes
        assert!(!output.book.metadata.technical.originality_fallback);
    }

    #[tokio::test]
    async fn unavailable_model_falls_back_to_baseline() {
        let mut script = vec![
            Err(CompletionError::ModelNotFound {
                model: "gpt-3.5-turbo-16k".into(),
                message: "no access".into(),
            }),
            Ok(completion(&outline(), 50)),
        ];
        script.extend((0..8).map(|i| Ok(completion(&chapter_reply(i), 300))));
        let api = Arc::new(ScriptedCompletion::new(script));

        let output = generator(api.clone(), Arc::new(RecordingPacer::default()))
            .generate(&request("medium", None))
            .await
            .unwrap();
        let technical = &output.book.metadata.technical;

        assert_eq!(output.book.document.chapters.len(), 8);
        assert!(!technical.model_available);
        assert_eq!(technical.final_model, "gpt-3.5-turbo");
        assert_eq!(technical.max_tokens_config, 3500);

        let requests = api.requests();
        assert_eq!(requests[0].model, "gpt-3.5-turbo-16k");
        assert!(requests[1..].iter().all(|r| r.model == "gpt-3.5-turbo"));
        assert!(requests[1..].iter().all(|r| r.max_tokens <= 3500));
    }

    #[tokio::test]
    async fn model_lost_after_probe_retries_with_baseline() {
        let api = Arc::new(ScriptedCompletion::new(vec![
            Ok(completion("AVAILABLE", 2)),
            Err(CompletionError::ModelNotFound {
                model: "gpt-3.5-turbo-16k".into(),
                message: "gone".into(),
            }),
            Ok(completion(&json_book("Salt and Light", 2), 700)),
        ]));

        let output = generator(api.clone(), Arc::new(RecordingPacer::default()))
            .generate(&request("medium", Some(2)))
            .await
            .unwrap();
        let technical = &output.book.metadata.technical;

        assert_eq!(output.book.document.title, "Salt and Light");
        assert!(!technical.model_available);
        assert_eq!(technical.final_model, "gpt-3.5-turbo");
        assert_eq!(technical.max_tokens_config, 3500);

        let models: Vec<_> = api.requests().into_iter().map(|r| r.model).collect();
        assert_eq!(
            models,
            vec!["gpt-3.5-turbo-16k", "gpt-3.5-turbo-16k", "gpt-3.5-turbo"]
        );
    }

    #[tokio::test]
    async fn missing_baseline_model_reaches_the_caller() {
        let api = Arc::new(ScriptedCompletion::new(vec![
            Ok(completion("AVAILABLE", 2)),
            Err(CompletionError::ModelNotFound {
                model: "gpt-3.5-turbo-16k".into(),
                message: "gone".into(),
            }),
            Err(CompletionError::ModelNotFound {
                model: "gpt-3.5-turbo".into(),
                message: "gone too".into(),
            }),
        ]));

        let err = generator(api.clone(), Arc::new(RecordingPacer::default()))
            .generate(&request("medium", Some(2)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GenerationError::ModelUnavailable { ref model, .. } if model == "gpt-3.5-turbo"
        ));
        assert_eq!(api.requests().len(), 3);
    }

    #[tokio::test]
    async fn exhausted_rate_limit_retries_reach_the_caller() {
        let retries = test_config().pacing.max_retries as usize;
        let script = (0..=retries)
            .map(|_| Err(CompletionError::RateLimited { retry_after: None }))
            .collect();
        let api = Arc::new(ScriptedCompletion::new(script));
        let pacer = Arc::new(RecordingPacer::default());

        let err = generator(api.clone(), pacer.clone())
            .generate(&request("small", Some(2)))
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::RateLimited));
        assert_eq!(err.status(), http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(api.requests().len(), retries + 1);
        assert_eq!(pacer.pauses().len(), retries);
    }

    #[tokio::test]
    async fn over_length_premise_is_truncated_not_rejected() {
        let api = Arc::new(ScriptedCompletion::new(vec![Ok(completion(
            &json_book("Long Winded", 2),
            900,
        ))]));
        let mut long = request("small", Some(2));
        long.description = "The sea keeps every secret. ".repeat(500);
        assert!(long.description.chars().count() > 12_000);

        let output = generator(api, Arc::new(RecordingPacer::default()))
            .generate(&long)
            .await
            .unwrap();

        assert_eq!(output.premise.chars().count(), MAX_PREMISE_CHARS);
        assert_eq!(output.book.metadata.issues.len(), 1);
        assert!(output.book.metadata.issues[0].contains("10000"));
    }

    #[tokio::test]
    async fn echoed_book_is_replaced_by_synthesized_alternative() {
        let echo = serde_json::json!({
            "title": "The Bottle",
            "synopsis": "A keeper finds a letter from a lost ship in the sea.",
            "chapters": [
                {"title": "One", "content": chapter_prose("Elias")},
                {"title": "Two", "content": "Desenvolvimento da narrativa baseado na descrição fornecida."},
            ]
        })
        .to_string();
        let api = Arc::new(ScriptedCompletion::new(vec![Ok(completion(&echo, 100))]));

        let output = generator(api.clone(), Arc::new(RecordingPacer::default()))
            .generate(&request("small", Some(2)))
            .await
            .unwrap();
        let document = &output.book.document;

        assert!(output.book.metadata.technical.originality_fallback);
        assert_eq!(document.chapters.len(), 2);
        assert!(
            document
                .chapters
                .iter()
                .all(|c| !c.content.contains("Desenvolvimento"))
        );
        // terminal branch: no second model call
        assert_eq!(api.requests().len(), 1);
    }

    #[tokio::test]
    async fn authentication_failure_reaches_the_caller() {
        let api = Arc::new(ScriptedCompletion::new(vec![Err(
            CompletionError::Authentication("invalid key".into()),
        )]));

        let err = generator(api, Arc::new(RecordingPacer::default()))
            .generate(&request("small", Some(2)))
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Authentication(_)));
    }

    #[tokio::test]
    async fn invalid_request_never_calls_the_model() {
        let api = Arc::new(ScriptedCompletion::new(Vec::new()));
        let mut bad = request("gigantic", None);
        bad.description = "too short".to_string();

        let err = generator(api.clone(), Arc::new(RecordingPacer::default()))
            .generate(&bad)
            .await
            .unwrap_err();

        match err {
            GenerationError::Validation { issues } => assert_eq!(issues.len(), 3),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn regenerated_chapter_keeps_its_position() {
        let api = Arc::new(ScriptedCompletion::new(vec![Ok(completion(
            &chapter_reply(2),
            300,
        ))]));
        let parameters = BookParameters {
            size: "small".to_string(),
            genre: "mystery".to_string(),
            audience: "adult".to_string(),
            chapter_count: 4,
        };

        let chapter = generator(api.clone(), Arc::new(RecordingPacer::default()))
            .regenerate_chapter(PREMISE, &parameters, 2, 4)
            .await
            .unwrap();

        assert_eq!(chapter.title, "Tide 3");
        assert!(api.requests()[0].messages[1].content.contains("chapter 3 of 4"));
    }
}
