use std::fmt;

use crate::error::GenerationError;
use crate::models::{GenerationRequest, SizeProfile, SizeProfiles};

pub const MIN_PREMISE_CHARS: usize = 15;
pub const MAX_PREMISE_CHARS: usize = 10_000;
pub const MIN_PREMISE_WORDS: usize = 5;
pub const MAX_CHAPTERS: u32 = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    TooShort { chars: usize, min: usize },
    Truncated { chars: usize, max: usize },
    TooVague { words: usize, min: usize },
}

impl ValidationIssue {
    /// Blocking issues stop the request; the rest were corrected in place.
    pub fn is_blocking(&self) -> bool {
        !matches!(self, Self::Truncated { .. })
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { chars, min } => {
                write!(f, "description too short ({chars} characters, minimum {min})")
            }
            Self::Truncated { chars, max } => write!(
                f,
                "description too long ({chars} characters), truncated to {max} characters"
            ),
            Self::TooVague { words, min } => {
                write!(f, "description too vague ({words} words, minimum {min})")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPremise {
    pub sanitized: String,
    pub issues: Vec<ValidationIssue>,
}

impl ValidatedPremise {
    pub fn is_blocked(&self) -> bool {
        self.issues.iter().any(ValidationIssue::is_blocking)
    }

    pub fn issue_messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}

/// Trims and truncates the premise, collecting every threshold it violates.
pub fn validate(premise: &str) -> ValidatedPremise {
    let mut issues = Vec::new();
    let mut sanitized = premise.trim().to_string();

    let chars = sanitized.chars().count();
    if chars < MIN_PREMISE_CHARS {
        issues.push(ValidationIssue::TooShort {
            chars,
            min: MIN_PREMISE_CHARS,
        });
    }

    if chars > MAX_PREMISE_CHARS {
        issues.push(ValidationIssue::Truncated {
            chars,
            max: MAX_PREMISE_CHARS,
        });
        sanitized = sanitized.chars().take(MAX_PREMISE_CHARS).collect();
    }

    let words = sanitized.split_whitespace().count();
    if words < MIN_PREMISE_WORDS {
        issues.push(ValidationIssue::TooVague {
            words,
            min: MIN_PREMISE_WORDS,
        });
    }

    ValidatedPremise { sanitized, issues }
}

/// A request that passed validation, with every default resolved.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub premise: String,
    pub profile: SizeProfile,
    pub chapter_count: usize,
    pub genre: String,
    pub audience: String,
    /// Soft issues that were auto-corrected.
    pub issues: Vec<String>,
}

pub fn prepare_request(
    request: &GenerationRequest,
    profiles: &SizeProfiles,
) -> Result<PreparedRequest, GenerationError> {
    if request.description.trim().is_empty() {
        return Err(GenerationError::validation("description is required"));
    }

    let validated = validate(&request.description);
    let mut blocking: Vec<String> = validated
        .issues
        .iter()
        .filter(|issue| issue.is_blocking())
        .map(ToString::to_string)
        .collect();

    let profile = profiles.get(&request.size);
    if profile.is_none() {
        blocking.push(format!(
            "invalid size `{}` (valid sizes: {})",
            request.size,
            profiles.ids().join(", ")
        ));
    }

    if let Some(count) = request.chapter_count {
        if count == 0 || count > MAX_CHAPTERS {
            blocking.push(format!(
                "chapter count {count} out of range (1 to {MAX_CHAPTERS})"
            ));
        }
    }

    let Some(profile) = profile.filter(|_| blocking.is_empty()) else {
        return Err(GenerationError::Validation { issues: blocking });
    };

    let issues = validated
        .issues
        .iter()
        .filter(|issue| !issue.is_blocking())
        .map(ToString::to_string)
        .collect();

    Ok(PreparedRequest {
        premise: validated.sanitized,
        profile: profile.clone(),
        chapter_count: request
            .chapter_count
            .map(|c| c as usize)
            .unwrap_or(profile.chapters),
        genre: request.genre_or_default().to_string(),
        audience: request.audience_or_default().to_string(),
        issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(description: &str) -> GenerationRequest {
        GenerationRequest {
            description: description.to_string(),
            size: "small".to_string(),
            genre: None,
            audience: None,
            chapter_count: None,
        }
    }

    #[test]
    fn minimum_premise_passes() {
        let validated = validate("  aa bb cc dd eee  ");
        assert_eq!(validated.sanitized, "aa bb cc dd eee");
        assert!(validated.issues.is_empty());
    }

    #[test]
    fn one_character_short_fails() {
        let validated = validate("aa bb cc dd ee");
        assert!(validated.is_blocked());
        assert_eq!(
            validated.issues,
            vec![ValidationIssue::TooShort { chars: 14, min: 15 }]
        );
        assert!(validated.issue_messages()[0].contains("minimum 15"));
    }

    #[test]
    fn one_word_short_fails() {
        let validated = validate("aaaaaa bbbbbb cccccc dddddd");
        assert_eq!(
            validated.issues,
            vec![ValidationIssue::TooVague { words: 4, min: 5 }]
        );
        assert!(validated.issue_messages()[0].contains("minimum 5"));
    }

    #[test]
    fn over_length_premise_is_truncated_not_blocked() {
        let long = "word ".repeat(2400);
        let validated = validate(&long);

        assert!(!validated.is_blocked());
        assert_eq!(validated.sanitized.chars().count(), MAX_PREMISE_CHARS);
        assert!(matches!(
            validated.issues.as_slice(),
            [ValidationIssue::Truncated { max: 10_000, .. }]
        ));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "ação ".repeat(2500);
        let validated = validate(&long);
        assert_eq!(validated.sanitized.chars().count(), MAX_PREMISE_CHARS);
    }

    #[test]
    fn prepare_resolves_defaults() {
        let profiles = SizeProfiles::builtin();
        let prepared = prepare_request(
            &request("A lighthouse keeper finds an old letter in a bottle."),
            &profiles,
        )
        .unwrap();

        assert_eq!(prepared.chapter_count, 4);
        assert_eq!(prepared.genre, "Fiction");
        assert_eq!(prepared.audience, "Adult");
        assert!(prepared.issues.is_empty());
    }

    #[test]
    fn prepare_collects_all_blocking_issues() {
        let profiles = SizeProfiles::builtin();
        let mut bad = request("too short");
        bad.size = "colossal".to_string();
        bad.chapter_count = Some(0);

        match prepare_request(&bad, &profiles) {
            Err(GenerationError::Validation { issues }) => {
                assert_eq!(issues.len(), 4, "{issues:?}");
                assert!(issues.iter().any(|i| i.contains("colossal")));
                assert!(issues.iter().any(|i| i.contains("chapter count 0")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn prepare_keeps_truncation_as_soft_issue() {
        let profiles = SizeProfiles::builtin();
        let mut long = request(&"the keeper walks ".repeat(800));
        long.chapter_count = Some(2);

        let prepared = prepare_request(&long, &profiles).unwrap();
        assert_eq!(prepared.chapter_count, 2);
        assert_eq!(prepared.premise.chars().count(), MAX_PREMISE_CHARS);
        assert_eq!(prepared.issues.len(), 1);
    }
}
