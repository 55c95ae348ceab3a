//! Detects books where the model echoed the request instead of writing a story.

use std::fmt;

use crate::models::{BookDocument, Chapter, ChapterOrigin, SizeProfile};
use crate::services::invoker::GenerationPlan;
use crate::services::prompts;

/// Phrases that show up when the model describes the task instead of doing it.
const ECHO_MARKERS: &[&str] = &[
    "based on the description",
    "based on the premise provided",
    "narrative development of",
    "development of the narrative",
    "as described in the premise",
    "baseado na descrição",
    "baseada na descrição",
    "desenvolvimento da narrativa",
    "desenvolvimento narrativo",
    "conforme a descrição",
];

/// A chapter shorter than this share of the minimum word count is an echo.
const MIN_WORDS_PERCENT: u32 = 10;
const EXCERPT_CHARS: usize = 160;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoReason {
    Marker(&'static str),
    RestatesPremise,
    TooShort { words: usize, min: usize },
}

impl fmt::Display for EchoReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EchoReason::Marker(marker) => write!(f, "contains echo marker \"{marker}\""),
            EchoReason::RestatesPremise => write!(f, "restates the premise"),
            EchoReason::TooShort { words, min } => {
                write!(f, "only {words} words (expected at least {min})")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginalityVerdict {
    /// Chapter index and the first reason it was flagged.
    pub flagged: Vec<(usize, EchoReason)>,
}

impl OriginalityVerdict {
    pub fn needs_regeneration(&self) -> bool {
        !self.flagged.is_empty()
    }
}

/// Judges model-written chapters only; synthesized ones are skipped.
pub fn check_originality(
    document: &BookDocument,
    premise: &str,
    profile: &SizeProfile,
) -> OriginalityVerdict {
    let premise = normalize(premise);
    let min_words = (profile.min_words_per_chapter * MIN_WORDS_PERCENT / 100).max(1) as usize;

    let flagged: Vec<(usize, EchoReason)> = document
        .chapters
        .iter()
        .enumerate()
        .filter(|(_, chapter)| chapter.origin == ChapterOrigin::Generated)
        .filter_map(|(index, chapter)| {
            echo_reason(&chapter.content, &premise, min_words).map(|reason| (index, reason))
        })
        .collect();

    for (index, reason) in &flagged {
        tracing::warn!("chapter {} flagged as echo: {}", index + 1, reason);
    }
    OriginalityVerdict { flagged }
}

fn echo_reason(content: &str, premise: &str, min_words: usize) -> Option<EchoReason> {
    let content = normalize(content);

    if let Some(marker) = ECHO_MARKERS.iter().find(|marker| content.contains(*marker)) {
        return Some(EchoReason::Marker(*marker));
    }

    if !premise.is_empty()
        && content.contains(premise)
        && content.chars().count() < premise.chars().count() * 2
    {
        return Some(EchoReason::RestatesPremise);
    }

    let words = content.split_whitespace().count();
    if words < min_words {
        return Some(EchoReason::TooShort {
            words,
            min: min_words,
        });
    }
    None
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A canned story skeleton built around the premise, used instead of a second
/// model call when the generated book is an echo.
pub fn synthesize_alternative(plan: &GenerationPlan) -> BookDocument {
    let excerpt = excerpt(&plan.premise);
    let genre = plan.genre.to_lowercase();
    let audience = plan.audience.to_lowercase();

    let chapters = (0..plan.chapter_count)
        .map(|index| {
            let stage = stage_text(index, plan.chapter_count);
            Chapter::synthesized(
                Chapter::default_title(index),
                format!(
                    "{stage} The story keeps returning to its starting point: {excerpt} \
                     Each scene in this chapter follows what the characters want, what \
                     stands in their way, and what they are willing to risk to get it."
                ),
            )
        })
        .collect();

    BookDocument {
        title: title_from_premise(&plan.premise, &plan.genre),
        synopsis: format!(
            "A {genre} story for {audience} readers. It opens with this situation: {excerpt} \
             Across {} chapters the characters are tested, their choices carry a cost, and \
             the ending answers the question the first chapter asks.",
            plan.chapter_count
        ),
        chapters,
    }
}

fn stage_text(index: usize, total: usize) -> &'static str {
    let focus = prompts::focus_hint(index, total);
    if index == 0 {
        "The first chapter sets the scene and introduces the people whose lives are about to change."
    } else if focus == prompts::focus_hint(total.saturating_sub(1), total) {
        "In the final chapter the central conflict comes to a head and the survivors decide what kind of people they will be."
    } else if focus.starts_with("raise") {
        "Pressure builds as secrets surface and every path forward starts to close."
    } else {
        "The conflict widens: alliances form and break, and a discovery changes what the characters believed."
    }
}

fn excerpt(premise: &str) -> String {
    let first_sentence = premise
        .split_inclusive(['.', '!', '?'])
        .next()
        .unwrap_or(premise)
        .trim();
    if first_sentence.chars().count() <= EXCERPT_CHARS {
        return first_sentence.to_string();
    }
    let mut cut: String = first_sentence.chars().take(EXCERPT_CHARS).collect();
    if let Some(space) = cut.rfind(' ') {
        cut.truncate(space);
    }
    cut.push_str("...");
    cut
}

fn title_from_premise(premise: &str, genre: &str) -> String {
    let words: Vec<String> = premise
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| word.chars().count() > 3)
        .take(3)
        .map(capitalize)
        .collect();

    if words.is_empty() {
        format!("A {genre} Tale")
    } else {
        format!("The {}", words.join(" "))
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
