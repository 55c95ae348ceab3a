//! Instruction text sent to the completion API. Every function here is pure.

use crate::models::SizeProfile;
use crate::services::metrics::BookMetrics;

/// Share of each chapter given to opening, development, climax and resolution.
pub const CHAPTER_STRUCTURE: [(&str, u32); 4] = [
    ("OPENING", 15),
    ("DEVELOPMENT", 60),
    ("CLIMAX", 15),
    ("RESOLUTION / HOOK", 10),
];

/// Text the schema example uses for the title; a reply that keeps it is degenerate.
pub const SCHEMA_TITLE_PLACEHOLDER: &str = "Creative Title Here";

pub const PROBE_WORD: &str = "AVAILABLE";

pub fn system_message() -> &'static str {
    "You are a professional novelist and experienced editor. You write complete, \
     well-structured and engaging books. You always follow the given guidelines \
     exactly and you format your answer as valid JSON."
}

pub fn probe_prompt() -> String {
    format!("Reply with the single word '{PROBE_WORD}' and nothing else.")
}

fn premise_block(premise: &str) -> String {
    format!("\"\"\"\n{premise}\n\"\"\"")
}

fn structure_section() -> String {
    let mut out = String::from("## STRUCTURE OF EVERY CHAPTER\n");
    let details = [
        "an arresting first scene, the immediate context and the emotional tone",
        "natural plot progression, meaningful dialogue, character growth, conflict and sensory description",
        "the point of highest tension in the chapter, revelations and turns",
        "a partial conclusion that prepares the next chapter and keeps the reader curious",
    ];
    for (index, ((name, share), detail)) in CHAPTER_STRUCTURE.iter().zip(details).enumerate() {
        out.push_str(&format!(
            "{}. {name} ({share}% of the chapter): {detail}\n",
            index + 1
        ));
    }
    out
}

fn anti_echo_section() -> &'static str {
    r#"## NEVER RESTATE THE PREMISE
Do not copy or paraphrase the premise as chapter content. Turn it into scenes.

Bad chapter content (rejected):
"This chapter develops the narrative based on the description provided: a keeper finds a message in a bottle."

Good chapter content (accepted):
"The bottle knocked against the rocks twice before Elias noticed it. Salt had crusted the cork into a grey knot, and when he finally pried it loose the paper inside smelled of tar and something older. 'Nobody writes like this anymore,' he muttered, tilting the page toward the lamp."
"#
}

fn schema_section() -> String {
    format!(
        r#"## EXACT RESPONSE FORMAT (VALID JSON ONLY, NO TEXT BEFORE OR AFTER)
{{
  "title": "{SCHEMA_TITLE_PLACEHOLDER}",
  "synopsis": "A 3-4 paragraph synopsis that introduces the main characters, the central conflict and the stakes.",
  "chapters": [
    {{
      "title": "Evocative chapter title",
      "content": "The full chapter text following the structure above, at least 5-7 rich paragraphs."
    }}
  ]
}}
"#
    )
}

/// Prompt for generating the whole book in a single call.
pub fn build_book_prompt(
    premise: &str,
    profile: &SizeProfile,
    chapter_count: usize,
    genre: &str,
    audience: &str,
) -> String {
    let metrics = BookMetrics::estimate(profile, chapter_count);

    let mut prompt = String::new();
    prompt.push_str(&format!("# BOOK COMMISSION - {}\n\n", profile.label.to_uppercase()));
    prompt.push_str("## WORK METADATA\n");
    prompt.push_str("- TITLE: create an original, compelling title\n");
    prompt.push_str(&format!(
        "- LENGTH: {} ({}-{} pages)\n",
        profile.pages_label, metrics.estimated_min_pages, metrics.estimated_max_pages
    ));
    prompt.push_str(&format!("- CHAPTERS: exactly {chapter_count} complete chapters\n"));
    prompt.push_str(&format!(
        "- WORDS: {}-{} per chapter, {}-{} in total\n",
        profile.min_words_per_chapter,
        profile.max_words_per_chapter,
        metrics.estimated_min_words,
        metrics.estimated_max_words
    ));
    prompt.push_str(&format!("- GENRE: {genre}\n"));
    prompt.push_str(&format!("- AUDIENCE: {audience}\n"));
    prompt.push_str(&format!("- READING TIME: {}\n\n", profile.reading_time));

    prompt.push_str("## AUTHOR'S PREMISE\n");
    prompt.push_str(&premise_block(premise));
    prompt.push_str("\n\n");
    prompt.push_str(
        "Turn this premise into a COMPLETE work with narrative depth, rounded characters \
         and a satisfying emotional arc. Keep every essential element of the premise.\n\n",
    );

    prompt.push_str(&structure_section());
    prompt.push('\n');
    prompt.push_str(&format!(
        "## WRITING GUIDELINES\n\
         - Three-dimensional characters with clear motivations and visible growth\n\
         - Language suited to a {audience} audience, with the conventions of {genre}\n\
         - At least 3-5 meaningful dialogue exchanges and 2-3 descriptive paragraphs per chapter\n\
         - Vary the pacing to serve the drama\n\n"
    ));
    prompt.push_str(anti_echo_section());
    prompt.push('\n');
    prompt.push_str(&schema_section());
    prompt.push_str(&format!(
        "\nThe \"chapters\" array must contain exactly {chapter_count} objects. \
         Each chapter must be a complete narrative unit that also advances the whole book.\n"
    ));
    prompt
}

/// Prompt for the title and synopsis when chapters are generated one by one.
pub fn build_outline_prompt(
    premise: &str,
    profile: &SizeProfile,
    chapter_count: usize,
    genre: &str,
    audience: &str,
) -> String {
    format!(
        "Plan a {genre} book for a {audience} audience with {chapter_count} chapters \
         ({pages}).\n\n## AUTHOR'S PREMISE\n{block}\n\n\
         Answer with valid JSON only:\n\
         {{\"title\": \"an original title\", \"synopsis\": \"3-4 paragraphs presenting the \
         characters, the central conflict and the stakes\"}}\n\n\
         Do not restate the premise word for word; expand it creatively.\n",
        pages = profile.pages_label,
        block = premise_block(premise),
    )
}

/// Position-keyed focus for a chapter generated on its own.
pub fn focus_hint(index: usize, total: usize) -> &'static str {
    let last = total.saturating_sub(1);
    if total <= 1 {
        "tell the whole arc: introduce the characters, build to the climax and resolve the central conflict"
    } else if index == 0 {
        "introduce the main characters, their world and the inciting event"
    } else if index >= last {
        "resolve the central conflict and close the emotional arcs"
    } else if index * 4 >= total * 3 || index + 1 == last {
        "raise the tension toward the climax"
    } else {
        "develop the conflict, deepen relationships and complicate the plot"
    }
}

/// Prompt for one chapter in decomposed mode.
pub fn build_chapter_prompt(
    premise_summary: &str,
    index: usize,
    total: usize,
    focus: &str,
    profile: &SizeProfile,
    genre: &str,
    audience: &str,
) -> String {
    let mut prompt = format!(
        "Write chapter {number} of {total} of a {genre} book for a {audience} audience.\n\n\
         ## BOOK PREMISE\n{block}\n\n\
         ## FOCUS OF THIS CHAPTER\n{focus}\n\n\
         Length: {min}-{max} words.\n\n",
        number = index + 1,
        block = premise_block(premise_summary),
        min = profile.min_words_per_chapter,
        max = profile.max_words_per_chapter,
    );
    prompt.push_str(&structure_section());
    prompt.push('\n');
    prompt.push_str(anti_echo_section());
    prompt.push_str(
        "\nAnswer with valid JSON only: {\"title\": \"chapter title\", \"content\": \"full chapter text\"}\n",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SizeProfiles;

    const PREMISE: &str =
        "A lighthouse keeper discovers a message in a bottle from a ship lost a century ago.";

    #[test]
    fn book_prompt_embeds_premise_verbatim_in_block() {
        let profiles = SizeProfiles::builtin();
        let prompt =
            build_book_prompt(PREMISE, profiles.get("small").unwrap(), 4, "mystery", "adult");

        assert!(prompt.contains(&format!("\"\"\"\n{PREMISE}\n\"\"\"")));
        assert!(prompt.contains("exactly 4 complete chapters"));
        assert!(prompt.contains("GENRE: mystery"));
        assert!(prompt.contains("AUDIENCE: adult"));
    }

    #[test]
    fn book_prompt_carries_structure_schema_and_anti_echo() {
        let profiles = SizeProfiles::builtin();
        let prompt = build_book_prompt(PREMISE, profiles.get("medium").unwrap(), 8, "f", "a");

        for (name, share) in CHAPTER_STRUCTURE {
            assert!(prompt.contains(&format!("{name} ({share}% of the chapter)")));
        }
        assert!(prompt.contains("\"chapters\": ["));
        assert!(prompt.contains("\"synopsis\":"));
        assert!(prompt.contains("NEVER RESTATE THE PREMISE"));
        assert!(prompt.contains("Bad chapter content"));
        assert!(prompt.contains("Good chapter content"));
    }

    #[test]
    fn structure_shares_sum_to_whole_chapter() {
        let total: u32 = CHAPTER_STRUCTURE.iter().map(|(_, share)| share).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn book_prompt_is_deterministic() {
        let profiles = SizeProfiles::builtin();
        let profile = profiles.get("large").unwrap();
        assert_eq!(
            build_book_prompt(PREMISE, profile, 12, "g", "a"),
            build_book_prompt(PREMISE, profile, 12, "g", "a")
        );
    }

    #[test]
    fn focus_hints_follow_position() {
        assert!(focus_hint(0, 8).starts_with("introduce"));
        assert!(focus_hint(2, 8).starts_with("develop"));
        assert!(focus_hint(6, 8).starts_with("raise"));
        assert!(focus_hint(7, 8).starts_with("resolve"));
        assert!(focus_hint(0, 2).starts_with("introduce"));
        assert!(focus_hint(1, 2).starts_with("resolve"));
    }

    #[test]
    fn single_chapter_gets_the_whole_arc() {
        let hint = focus_hint(0, 1);
        assert!(hint.starts_with("tell the whole arc"));
        assert!(hint.contains("resolve the central conflict"));
    }

    #[test]
    fn chapter_prompt_names_position_and_focus() {
        let profiles = SizeProfiles::builtin();
        let prompt = build_chapter_prompt(
            PREMISE,
            2,
            8,
            focus_hint(2, 8),
            profiles.get("medium").unwrap(),
            "mystery",
            "adult",
        );
        assert!(prompt.contains("Write chapter 3 of 8"));
        assert!(prompt.contains("develop the conflict"));
        assert!(prompt.contains("1500-2500 words"));
    }
}
