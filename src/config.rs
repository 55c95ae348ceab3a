use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::models::SizeProfiles;

const DEFAULT_CEILINGS: &str = "gpt-3.5-turbo=16385,gpt-3.5-turbo-16k=16385";

#[derive(Clone, Debug)]
pub struct CompletionConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub baseline_model: String,
    pub fallback_token_budget: u32,
    pub temperature: f32,
    pub request_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct PacingConfig {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub chapter_delay: Duration,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub dev_mode: bool,
    pub completion: CompletionConfig,
    pub pacing: PacingConfig,
    /// Hard token ceiling per model; every profile budget must stay below it.
    pub model_ceilings: BTreeMap<String, u32>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let model_ceilings = parse_ceilings(
            &env::var("MODEL_CEILINGS").unwrap_or_else(|_| DEFAULT_CEILINGS.to_string()),
        )?;

        Ok(Self {
            bind_addr: env::var("BOOKWRIGHT_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            data_dir: env::var("BOOKWRIGHT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            dev_mode: env::var("BOOKWRIGHT_ENV")
                .map(|v| v.eq_ignore_ascii_case("development"))
                .unwrap_or(false),
            completion: CompletionConfig {
                api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                baseline_model: env::var("BASELINE_MODEL")
                    .unwrap_or_else(|_| "gpt-3.5-turbo".to_string()),
                fallback_token_budget: env_parse("FALLBACK_TOKEN_BUDGET", 3500),
                temperature: env_parse("GENERATION_TEMPERATURE", 0.75),
                request_timeout: Duration::from_secs(env_parse("REQUEST_TIMEOUT_SECS", 180)),
            },
            pacing: PacingConfig {
                max_retries: env_parse("MAX_RETRIES", 2),
                retry_base_delay: Duration::from_millis(env_parse("RETRY_BASE_DELAY_MS", 1000)),
                chapter_delay: Duration::from_millis(env_parse("CHAPTER_DELAY_MS", 1000)),
            },
            model_ceilings,
        })
    }

    pub fn ceiling_for(&self, model: &str) -> Option<u32> {
        self.model_ceilings.get(model).copied()
    }

    /// Rejects profile budgets that a paired model could never honour.
    pub fn validate(&self, profiles: &SizeProfiles) -> Result<()> {
        for profile in profiles.iter() {
            let Some(ceiling) = self.ceiling_for(&profile.model) else {
                bail!(
                    "size profile `{}` uses model `{}` which has no entry in MODEL_CEILINGS",
                    profile.id,
                    profile.model
                );
            };
            if profile.token_budget > ceiling {
                bail!(
                    "size profile `{}` requests {} tokens but model `{}` is capped at {}",
                    profile.id,
                    profile.token_budget,
                    profile.model,
                    ceiling
                );
            }
        }

        let baseline = &self.completion.baseline_model;
        let Some(ceiling) = self.ceiling_for(baseline) else {
            bail!("baseline model `{baseline}` has no entry in MODEL_CEILINGS");
        };
        if self.completion.fallback_token_budget > ceiling {
            bail!(
                "FALLBACK_TOKEN_BUDGET {} exceeds the {} token ceiling of `{}`",
                self.completion.fallback_token_budget,
                ceiling,
                baseline
            );
        }
        Ok(())
    }

    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join("books")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses `model=ceiling` pairs separated by commas.
pub fn parse_ceilings(raw: &str) -> Result<BTreeMap<String, u32>> {
    let mut ceilings = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (model, value) = entry
            .split_once('=')
            .with_context(|| format!("MODEL_CEILINGS entry `{entry}` is not model=tokens"))?;
        let value: u32 = value
            .trim()
            .parse()
            .with_context(|| format!("MODEL_CEILINGS entry `{entry}` has a non-numeric ceiling"))?;
        ceilings.insert(model.trim().to_string(), value);
    }
    Ok(ceilings)
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        data_dir: PathBuf::from("./target/test-data"),
        dev_mode: false,
        completion: CompletionConfig {
            api_key: None,
            base_url: "http://127.0.0.1:9".to_string(),
            baseline_model: "gpt-3.5-turbo".to_string(),
            fallback_token_budget: 3500,
            temperature: 0.75,
            request_timeout: Duration::from_secs(5),
        },
        pacing: PacingConfig {
            max_retries: 2,
            retry_base_delay: Duration::from_millis(100),
            chapter_delay: Duration::from_millis(1000),
        },
        model_ceilings: parse_ceilings(DEFAULT_CEILINGS).unwrap(),
    }
}
