//! Turns raw completion text into a structurally valid [`BookDocument`].
//!
//! Structural strategies are tried in order: strict JSON, the first balanced
//! JSON object embedded in prose, heuristic segmentation of the prose. When
//! all of them fail the document is synthesized. Whatever tier succeeds, the
//! fields are then repaired so the document always has a usable title and
//! synopsis and exactly the expected number of non-trivial chapters.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::models::{BookDocument, Chapter};
use crate::services::chapterizer;
use crate::services::invoker::DecomposedOutput;
use crate::services::prompts::SCHEMA_TITLE_PLACEHOLDER;

pub const MIN_CHAPTER_CONTENT_CHARS: usize = 40;
pub const MIN_SYNOPSIS_CHARS: usize = 20;
pub const MAX_TITLE_CHARS: usize = 200;
pub const PLACEHOLDER_TITLE: &str = "An AI-Crafted Story";
pub const PLACEHOLDER_SYNOPSIS: &str = "An engaging story whose characters, conflicts and \
     turning points unfold chapter by chapter toward a satisfying resolution.";

/// Minimum letters for prose to be worth segmenting.
const MIN_PROSE_LETTERS: usize = MIN_CHAPTER_CONTENT_CHARS;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").expect("code fence regex")
});
static JSON_TITLE_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""title"\s*:\s*("(?:[^"\\]|\\.)*")"#).expect("title field regex")
});
static JSON_SYNOPSIS_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""synopsis"\s*:\s*("(?:[^"\\]|\\.)*")"#).expect("synopsis field regex")
});
// Groups 1/2 are title/content in that order, groups 3/4 content/title.
static JSON_CHAPTER_OBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"\{\s*(?:"title"\s*:\s*("(?:[^"\\]|\\.)*")\s*,\s*"content"\s*:\s*("(?:[^"\\]|\\.)*")"#,
        r#"|"content"\s*:\s*("(?:[^"\\]|\\.)*")\s*,\s*"title"\s*:\s*("(?:[^"\\]|\\.)*"))\s*\}"#,
    ))
    .expect("chapter object regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairTier {
    StrictJson,
    EmbeddedJson,
    Segmentation,
    PerChapter,
    Synthesis,
}

impl RepairTier {
    pub fn as_str(self) -> &'static str {
        match self {
            RepairTier::StrictJson => "strict_json",
            RepairTier::EmbeddedJson => "embedded_json",
            RepairTier::Segmentation => "segmentation",
            RepairTier::PerChapter => "per_chapter",
            RepairTier::Synthesis => "synthesis",
        }
    }
}

/// A possibly incomplete book recovered from raw text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftBook {
    pub title: Option<String>,
    pub synopsis: Option<String>,
    pub chapters: Vec<DraftChapter>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftChapter {
    pub title: Option<String>,
    pub content: Option<String>,
}

pub trait RepairStrategy: Sync {
    fn tier(&self) -> RepairTier;
    fn attempt(&self, raw: &str, expected: usize) -> Option<DraftBook>;
}

struct StrictJson;
struct EmbeddedJson;
struct Segmentation;

/// Structural tiers in the order they are tried.
pub static STRATEGIES: [&dyn RepairStrategy; 3] = [&StrictJson, &EmbeddedJson, &Segmentation];

impl RepairStrategy for StrictJson {
    fn tier(&self) -> RepairTier {
        RepairTier::StrictJson
    }

    fn attempt(&self, raw: &str, _expected: usize) -> Option<DraftBook> {
        let value = serde_json::from_str::<Value>(&strip_code_fence(raw)).ok()?;
        draft_from_value(&value)
    }
}

impl RepairStrategy for EmbeddedJson {
    fn tier(&self) -> RepairTier {
        RepairTier::EmbeddedJson
    }

    fn attempt(&self, raw: &str, _expected: usize) -> Option<DraftBook> {
        let candidate = first_balanced_object(raw)?;
        let value = serde_json::from_str::<Value>(candidate).ok()?;
        draft_from_value(&value)
    }
}

impl RepairStrategy for Segmentation {
    fn tier(&self) -> RepairTier {
        RepairTier::Segmentation
    }

    fn attempt(&self, raw: &str, expected: usize) -> Option<DraftBook> {
        let text = strip_code_fence(raw);
        if let Some(draft) = salvage_truncated_json(&text) {
            return Some(draft);
        }

        if text.chars().filter(|c| c.is_alphabetic()).count() < MIN_PROSE_LETTERS {
            return None;
        }

        let segmented = chapterizer::segment(&text, expected);
        if segmented.sections.is_empty() {
            return None;
        }
        Some(DraftBook {
            title: segmented.title,
            synopsis: segmented.synopsis,
            chapters: segmented
                .sections
                .into_iter()
                .map(|section| DraftChapter {
                    title: section.title,
                    content: Some(section.content),
                })
                .collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepairedBook {
    pub document: BookDocument,
    pub tier: RepairTier,
}

/// Never fails: returns a document with exactly `expected` chapters.
pub fn parse(raw: &str, expected: usize) -> RepairedBook {
    tracing::debug!(
        "repairing completion ({} chars): {}",
        raw.len(),
        preview(raw, 300)
    );

    for strategy in STRATEGIES.iter() {
        if let Some(draft) = strategy.attempt(raw, expected) {
            tracing::info!("completion parsed via {}", strategy.tier().as_str());
            return RepairedBook {
                document: finalize(draft, expected),
                tier: strategy.tier(),
            };
        }
    }

    tracing::warn!("no structure recovered from completion, synthesizing placeholder book");
    RepairedBook {
        document: synthesize_placeholder(expected),
        tier: RepairTier::Synthesis,
    }
}

/// Builds a document from the pieces of a chapter-by-chapter generation.
pub fn assemble_decomposed(output: &DecomposedOutput, expected: usize) -> RepairedBook {
    let (title, synopsis) = output
        .outline
        .as_deref()
        .map(parse_outline)
        .unwrap_or_default();

    let chapters = output
        .chapters
        .iter()
        .enumerate()
        .map(|(index, raw)| match raw {
            Some(raw) => draft_chapter_from_raw(raw, index),
            None => DraftChapter::default(),
        })
        .collect();

    RepairedBook {
        document: finalize(
            DraftBook {
                title,
                synopsis,
                chapters,
            },
            expected,
        ),
        tier: RepairTier::PerChapter,
    }
}

/// Title and synopsis from an outline reply.
pub fn parse_outline(raw: &str) -> (Option<String>, Option<String>) {
    let stripped = strip_code_fence(raw);
    let value = serde_json::from_str::<Value>(&stripped).ok().or_else(|| {
        first_balanced_object(&stripped).and_then(|c| serde_json::from_str::<Value>(c).ok())
    });

    if let Some(value) = value.filter(Value::is_object) {
        return (string_field(&value, "title"), string_field(&value, "synopsis"));
    }

    let segmented = chapterizer::segment(&stripped, 1);
    (segmented.title, segmented.synopsis)
}

/// One chapter from a per-chapter reply; degenerate text is synthesized.
pub fn parse_chapter(raw: &str, index: usize) -> Chapter {
    repair_chapter(draft_chapter_from_raw(raw, index), index)
}

fn draft_chapter_from_raw(raw: &str, index: usize) -> DraftChapter {
    let stripped = strip_code_fence(raw);
    let value = serde_json::from_str::<Value>(&stripped).ok().or_else(|| {
        first_balanced_object(&stripped).and_then(|c| serde_json::from_str::<Value>(c).ok())
    });

    if let Some(value) = value.filter(Value::is_object) {
        let content = string_field(&value, "content");
        if content.is_some() {
            return DraftChapter {
                title: string_field(&value, "title"),
                content,
            };
        }
    }

    let trimmed = stripped.trim();
    let mut lines = trimmed.lines();
    if let Some(found) = lines.next().and_then(chapterizer::heading) {
        let body: Vec<&str> = lines.collect();
        return DraftChapter {
            title: Some(found.title),
            content: Some(body.join("\n").trim().to_string()),
        };
    }

    tracing::debug!("chapter {} reply had no structure, using it as prose", index + 1);
    DraftChapter {
        title: None,
        content: Some(trimmed.to_string()),
    }
}

/// Applies the field-level repairs and reconciles the chapter count.
pub fn finalize(draft: DraftBook, expected: usize) -> BookDocument {
    let title = draft
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !is_degenerate_title(t))
        .unwrap_or_else(|| {
            tracing::warn!("title missing or degenerate, using placeholder");
            PLACEHOLDER_TITLE.to_string()
        });

    let synopsis = draft
        .synopsis
        .map(|s| s.trim().to_string())
        .filter(|s| s.chars().count() >= MIN_SYNOPSIS_CHARS)
        .unwrap_or_else(|| {
            tracing::warn!("synopsis missing or too short, using placeholder");
            PLACEHOLDER_SYNOPSIS.to_string()
        });

    if draft.chapters.len() > expected {
        tracing::warn!(
            "model produced {} chapters, truncating to {}",
            draft.chapters.len(),
            expected
        );
    }

    let mut chapters: Vec<Chapter> = draft
        .chapters
        .into_iter()
        .take(expected)
        .enumerate()
        .map(|(index, chapter)| repair_chapter(chapter, index))
        .collect();

    if chapters.len() < expected {
        tracing::warn!(
            "model produced {} chapters, padding to {}",
            chapters.len(),
            expected
        );
    }
    while chapters.len() < expected {
        chapters.push(synthesized_chapter(chapters.len()));
    }

    BookDocument {
        title,
        synopsis,
        chapters,
    }
}

fn repair_chapter(draft: DraftChapter, index: usize) -> Chapter {
    let title = draft
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && t.chars().count() <= MAX_TITLE_CHARS)
        .unwrap_or_else(|| Chapter::default_title(index));

    match draft.content.map(|c| c.trim().to_string()) {
        Some(content) if content.chars().count() >= MIN_CHAPTER_CONTENT_CHARS => {
            Chapter::generated(title, content)
        }
        _ => Chapter::synthesized(title, synthesized_content(index)),
    }
}

fn is_degenerate_title(title: &str) -> bool {
    title.is_empty()
        || title.chars().count() > MAX_TITLE_CHARS
        || title.eq_ignore_ascii_case(SCHEMA_TITLE_PLACEHOLDER)
        || (title.starts_with('[') && title.ends_with(']'))
}

pub fn synthesized_content(index: usize) -> String {
    format!(
        "Chapter {} carries the story forward: the characters face the consequences of \
         their earlier choices, new discoveries complicate their plans, and the tension \
         builds toward the next turning point.",
        index + 1
    )
}

pub fn synthesized_chapter(index: usize) -> Chapter {
    Chapter::synthesized(Chapter::default_title(index), synthesized_content(index))
}

pub fn synthesize_placeholder(expected: usize) -> BookDocument {
    BookDocument {
        title: PLACEHOLDER_TITLE.to_string(),
        synopsis: PLACEHOLDER_SYNOPSIS.to_string(),
        chapters: (0..expected).map(synthesized_chapter).collect(),
    }
}

fn draft_from_value(value: &Value) -> Option<DraftBook> {
    let object = value.as_object()?;
    if !object.contains_key("chapters") && !object.contains_key("synopsis") {
        return None;
    }

    let chapters = object
        .get("chapters")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::Object(_) => DraftChapter {
                        title: string_field(item, "title"),
                        content: string_field(item, "content"),
                    },
                    Value::String(text) => DraftChapter {
                        title: None,
                        content: Some(text.clone()),
                    },
                    _ => DraftChapter::default(),
                })
                .collect()
        })
        .unwrap_or_default();

    Some(DraftBook {
        title: string_field(value, "title"),
        synopsis: string_field(value, "synopsis"),
        chapters,
    })
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Recovers complete fields from JSON that was cut off mid-stream.
fn salvage_truncated_json(text: &str) -> Option<DraftBook> {
    let chapters_at = text.find("\"chapters\"")?;

    let mut chapters_end = chapters_at;
    let chapters: Vec<DraftChapter> = JSON_CHAPTER_OBJECT
        .captures_iter(&text[chapters_at..])
        .map(|caps| {
            chapters_end = chapters_at + caps.get(0).map_or(0, |m| m.end());
            DraftChapter {
                title: decode_literal(caps.get(1).or(caps.get(4))),
                content: decode_literal(caps.get(2).or(caps.get(3))),
            }
        })
        .collect();

    // Book-level fields sit either before the array or after its last complete entry.
    let book_field = |regex: &Regex| {
        [&text[..chapters_at], &text[chapters_end..]]
            .into_iter()
            .find_map(|region| {
                decode_literal(regex.captures(region).and_then(|caps| caps.get(1)))
            })
    };
    let title = book_field(&*JSON_TITLE_FIELD);
    let synopsis = book_field(&*JSON_SYNOPSIS_FIELD);

    if chapters.is_empty() && synopsis.is_none() {
        return None;
    }
    Some(DraftBook {
        title,
        synopsis,
        chapters,
    })
}

fn decode_literal(literal: Option<regex::Match<'_>>) -> Option<String> {
    literal.and_then(|m| serde_json::from_str::<String>(m.as_str()).ok())
}

/// Removes a surrounding Markdown code fence, if any.
pub fn strip_code_fence(raw: &str) -> String {
    let text = raw.trim();
    match CODE_FENCE.captures(text).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str().trim().to_string(),
        None => text.to_string(),
    }
}

/// The first `{...}` span whose braces balance, ignoring braces inside strings.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
