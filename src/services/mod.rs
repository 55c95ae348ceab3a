pub mod chapterizer;
pub mod export;
pub mod invoker;
pub mod library;
pub mod llm;
pub mod metrics;
pub mod originality;
pub mod pipeline;
pub mod prober;
pub mod prompts;
pub mod repair;
pub mod templates;
pub mod validator;
