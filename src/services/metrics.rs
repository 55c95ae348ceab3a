//! Size estimates before generation and statistics after it.

use serde::Serialize;

use crate::models::{BookDocument, BookStatistics, SizeProfile};

/// Expansion factor from words to completion tokens (1.3), kept as a ratio so
/// budget comparisons stay exact.
pub const TOKENS_PER_WORD: (u32, u32) = (13, 10);
pub const WORDS_PER_PAGE: u32 = 250;
pub const CHARACTERS_PER_PAGE: usize = 1800;
pub const PAGES_PER_MINUTE: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookMetrics {
    pub estimated_min_words: u32,
    pub estimated_max_words: u32,
    pub estimated_avg_words: f64,
    pub estimated_min_pages: u32,
    pub estimated_max_pages: u32,
    pub estimated_tokens: u32,
}

impl BookMetrics {
    pub fn estimate(profile: &SizeProfile, chapter_count: usize) -> Self {
        let chapters = chapter_count as u32;
        let min_words = profile.min_words_per_chapter * chapters;
        let max_words = profile.max_words_per_chapter * chapters;
        let avg_words = f64::from(min_words + max_words) / 2.0;

        Self {
            estimated_min_words: min_words,
            estimated_max_words: max_words,
            estimated_avg_words: avg_words,
            estimated_min_pages: min_words.div_ceil(WORDS_PER_PAGE),
            estimated_max_pages: max_words.div_ceil(WORDS_PER_PAGE),
            estimated_tokens: ((min_words + max_words) * TOKENS_PER_WORD.0)
                .div_ceil(2 * TOKENS_PER_WORD.1),
        }
    }
}

pub fn words_to_tokens(words: u32) -> u32 {
    (words * TOKENS_PER_WORD.0).div_ceil(TOKENS_PER_WORD.1)
}

/// Tokens needed to produce every chapter at the top of the word range.
pub fn required_tokens(profile: &SizeProfile, chapter_count: usize) -> u32 {
    words_to_tokens(profile.max_words_per_chapter * chapter_count as u32)
}

pub fn summarize(document: &BookDocument) -> BookStatistics {
    let total_characters: usize = document
        .chapters
        .iter()
        .map(|chapter| chapter.content.chars().count())
        .sum();
    let estimated_pages = total_characters.div_ceil(CHARACTERS_PER_PAGE);

    BookStatistics {
        total_characters,
        estimated_pages,
        estimated_reading_minutes: estimated_pages.div_ceil(PAGES_PER_MINUTE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chapter, SizeProfiles};

    #[test]
    fn estimates_small_profile() {
        let profiles = SizeProfiles::builtin();
        let metrics = BookMetrics::estimate(profiles.get("small").unwrap(), 4);

        assert_eq!(metrics.estimated_min_words, 3200);
        assert_eq!(metrics.estimated_max_words, 4800);
        assert_eq!(metrics.estimated_avg_words, 4000.0);
        assert_eq!(metrics.estimated_min_pages, 13);
        assert_eq!(metrics.estimated_max_pages, 20);
        assert_eq!(metrics.estimated_tokens, 5200);
    }

    #[test]
    fn required_tokens_uses_max_words() {
        let profiles = SizeProfiles::builtin();
        let small = profiles.get("small").unwrap();
        assert_eq!(required_tokens(small, 4), 6240);
        assert_eq!(required_tokens(small, 1), 1560);
    }

    #[test]
    fn summary_counts_chapter_characters() {
        let document = BookDocument {
            title: "T".to_string(),
            synopsis: "ignored by the count".to_string(),
            chapters: vec![
                Chapter::generated("A", "é".repeat(1800)),
                Chapter::generated("B", "x".repeat(1)),
            ],
        };

        let stats = summarize(&document);
        assert_eq!(stats.total_characters, 1801);
        assert_eq!(stats.estimated_pages, 2);
        assert_eq!(stats.estimated_reading_minutes, 1);
        assert_eq!(summarize(&document), stats);
    }

    #[test]
    fn empty_document_has_zero_pages() {
        let document = BookDocument {
            title: "T".to_string(),
            synopsis: "S".to_string(),
            chapters: Vec::new(),
        };
        let stats = summarize(&document);
        assert_eq!(stats.estimated_pages, 0);
        assert_eq!(stats.estimated_reading_minutes, 0);
    }
}
