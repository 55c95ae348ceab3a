pub mod profiles;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use profiles::{SizeProfile, SizeProfiles};

pub const DEFAULT_GENRE: &str = "Fiction";
pub const DEFAULT_AUDIENCE: &str = "Adult";

/// Inbound generation request, as posted by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub size: String,
    pub genre: Option<String>,
    pub audience: Option<String>,
    pub chapter_count: Option<u32>,
}

impl GenerationRequest {
    pub fn genre_or_default(&self) -> &str {
        non_blank(self.genre.as_deref()).unwrap_or(DEFAULT_GENRE)
    }

    pub fn audience_or_default(&self) -> &str {
        non_blank(self.audience.as_deref()).unwrap_or(DEFAULT_AUDIENCE)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Where a chapter's text came from. Only model text is judged for echoes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChapterOrigin {
    #[default]
    Generated,
    Synthesized,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    pub title: String,
    pub content: String,
    #[serde(skip)]
    pub origin: ChapterOrigin,
}

impl Chapter {
    pub fn generated(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            origin: ChapterOrigin::Generated,
        }
    }

    pub fn synthesized(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            origin: ChapterOrigin::Synthesized,
        }
    }

    pub fn default_title(index: usize) -> String {
        format!("Chapter {}", index + 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookDocument {
    pub title: String,
    pub synopsis: String,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookStatistics {
    pub total_characters: usize,
    pub estimated_pages: usize,
    pub estimated_reading_minutes: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationInfo {
    pub model: String,
    pub tokens_used: u32,
    pub generation_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookInfo {
    pub size: String,
    pub estimated_pages: usize,
    pub estimated_reading_time: String,
    pub total_chapters: usize,
    pub total_characters: usize,
    pub genre: String,
    pub audience: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalInfo {
    pub model_available: bool,
    pub max_tokens_config: u32,
    pub final_model: String,
    pub mode: String,
    pub repair_tier: String,
    pub originality_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMetadata {
    pub generation: GenerationInfo,
    pub book_info: BookInfo,
    pub technical: TechnicalInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

/// Successful generation response: the document plus its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedBook {
    #[serde(flatten)]
    pub document: BookDocument,
    pub metadata: BookMetadata,
}

/// The generation parameters stored alongside a book.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookParameters {
    pub size: String,
    pub genre: String,
    pub audience: String,
    pub chapter_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    pub id: Uuid,
    pub premise: String,
    pub parameters: BookParameters,
    pub document: BookDocument,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub owner_id: String,
}

impl BookRecord {
    pub fn new(
        owner_id: impl Into<String>,
        premise: impl Into<String>,
        parameters: BookParameters,
        document: BookDocument,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            premise: premise.into(),
            parameters,
            document,
            created_at: now,
            updated_at: now,
            owner_id: owner_id.into(),
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_accepts_camel_case_and_defaults() {
        let request: GenerationRequest = serde_json::from_str(
            r#"{"description":"A story","size":"small","chapterCount":3,"genre":"  "}"#,
        )
        .unwrap();
        assert_eq!(request.chapter_count, Some(3));
        assert_eq!(request.genre_or_default(), DEFAULT_GENRE);
        assert_eq!(request.audience_or_default(), DEFAULT_AUDIENCE);
    }

    #[test]
    fn chapter_origin_is_not_serialized() {
        let chapter = Chapter::synthesized("Chapter 1", "text");
        let json = serde_json::to_value(&chapter).unwrap();
        assert!(json.get("origin").is_none());

        let back: Chapter = serde_json::from_value(json).unwrap();
        assert_eq!(back.origin, ChapterOrigin::Generated);
    }

    #[test]
    fn generated_book_flattens_document() {
        let book = GeneratedBook {
            document: BookDocument {
                title: "T".to_string(),
                synopsis: "S".to_string(),
                chapters: vec![Chapter::generated("Chapter 1", "body")],
            },
            metadata: BookMetadata {
                generation: GenerationInfo {
                    model: "m".to_string(),
                    tokens_used: 10,
                    generation_time_ms: 5,
                    timestamp: Utc::now(),
                },
                book_info: BookInfo {
                    size: "Small".to_string(),
                    estimated_pages: 1,
                    estimated_reading_time: "1 minutes".to_string(),
                    total_chapters: 1,
                    total_characters: 4,
                    genre: "Fiction".to_string(),
                    audience: "Adult".to_string(),
                },
                technical: TechnicalInfo {
                    model_available: true,
                    max_tokens_config: 100,
                    final_model: "m".to_string(),
                    mode: "single_call".to_string(),
                    repair_tier: "strict_json".to_string(),
                    originality_fallback: false,
                },
                issues: Vec::new(),
            },
        };

        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(json["title"], "T");
        assert_eq!(json["metadata"]["generation"]["tokensUsed"], 10);
        assert_eq!(json["metadata"]["bookInfo"]["totalChapters"], 1);
        assert!(json["metadata"].get("issues").is_none());
    }
}
