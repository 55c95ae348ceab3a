use serde::Serialize;

/// Target extent of a book for one size selector.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SizeProfile {
    pub id: String,
    pub label: String,
    pub description: String,
    pub chapters: usize,
    pub min_words_per_chapter: u32,
    pub max_words_per_chapter: u32,
    pub token_budget: u32,
    pub model: String,
    pub pages_label: String,
    pub reading_time: String,
}

impl SizeProfile {
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: &str,
        label: &str,
        description: &str,
        chapters: usize,
        words: (u32, u32),
        token_budget: u32,
        model: &str,
        pages_label: &str,
        reading_time: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            description: description.to_string(),
            chapters,
            min_words_per_chapter: words.0,
            max_words_per_chapter: words.1,
            token_budget,
            model: model.to_string(),
            pages_label: pages_label.to_string(),
            reading_time: reading_time.to_string(),
        }
    }

    /// The profile to use once the requested model turned out to be unreachable.
    ///
    /// Chapter count is preserved; words per chapter shrink with the budget.
    pub fn degraded(&self, model: &str, token_budget: u32) -> Self {
        let ratio = if self.token_budget == 0 {
            1.0
        } else {
            (f64::from(token_budget) / f64::from(self.token_budget)).min(1.0)
        };
        let scale = |words: u32| ((f64::from(words) * ratio).floor() as u32).max(1);

        let first_page = self
            .pages_label
            .split(|c: char| !c.is_ascii_digit())
            .find(|part| !part.is_empty())
            .and_then(|part| part.parse::<f64>().ok())
            .unwrap_or(0.0);

        Self {
            model: model.to_string(),
            token_budget,
            min_words_per_chapter: scale(self.min_words_per_chapter),
            max_words_per_chapter: scale(self.max_words_per_chapter),
            pages_label: format!("~{} pages", (first_page / 1.5).ceil() as u64),
            ..self.clone()
        }
    }
}

/// Immutable lookup of the size profiles, loaded once at startup.
#[derive(Debug, Clone)]
pub struct SizeProfiles {
    profiles: Vec<SizeProfile>,
}

impl SizeProfiles {
    pub fn builtin() -> Self {
        Self {
            profiles: vec![
                SizeProfile::new(
                    "small",
                    "Small",
                    "Short novella or story collection",
                    4,
                    (800, 1200),
                    6000,
                    "gpt-3.5-turbo",
                    "40-60 pages",
                    "1-2 hours",
                ),
                SizeProfile::new(
                    "medium",
                    "Medium",
                    "Standard-length novel",
                    8,
                    (1500, 2500),
                    12000,
                    "gpt-3.5-turbo-16k",
                    "80-120 pages",
                    "3-4 hours",
                ),
                SizeProfile::new(
                    "large",
                    "Large",
                    "Long novel with layered plots",
                    12,
                    (2000, 3500),
                    14000,
                    "gpt-3.5-turbo-16k",
                    "150-200 pages",
                    "5-7 hours",
                ),
                SizeProfile::new(
                    "epic",
                    "Epic",
                    "Full saga with several arcs",
                    16,
                    (2500, 4000),
                    16000,
                    "gpt-3.5-turbo-16k",
                    "200-300 pages",
                    "8-10 hours",
                ),
            ],
        }
    }

    /// Looks a profile up by id, accepting the legacy Portuguese selectors.
    pub fn get(&self, id: &str) -> Option<&SizeProfile> {
        let key = id.trim().to_lowercase();
        let canonical = match key.as_str() {
            "pequeno" => "small",
            "medio" | "médio" => "medium",
            "grande" => "large",
            "epico" | "épico" => "epic",
            other => other,
        };
        self.profiles.iter().find(|p| p.id == canonical)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SizeProfile> {
        self.profiles.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_profiles_are_well_formed() {
        let profiles = SizeProfiles::builtin();
        assert_eq!(profiles.ids(), vec!["small", "medium", "large", "epic"]);
        for profile in profiles.iter() {
            assert!(profile.chapters >= 1);
            assert!(profile.min_words_per_chapter <= profile.max_words_per_chapter);
            assert!(profile.token_budget > 0);
        }
    }

    #[test]
    fn legacy_selectors_resolve() {
        let profiles = SizeProfiles::builtin();
        assert_eq!(profiles.get("pequeno").unwrap().id, "small");
        assert_eq!(profiles.get("Épico").unwrap().id, "epic");
        assert_eq!(profiles.get(" Medium ").unwrap().id, "medium");
        assert!(profiles.get("huge").is_none());
    }

    #[test]
    fn degraded_profile_keeps_chapters_and_shrinks_words() {
        let profiles = SizeProfiles::builtin();
        let medium = profiles.get("medium").unwrap();
        let degraded = medium.degraded("gpt-3.5-turbo", 3000);

        assert_eq!(degraded.chapters, medium.chapters);
        assert_eq!(degraded.model, "gpt-3.5-turbo");
        assert_eq!(degraded.token_budget, 3000);
        assert_eq!(degraded.min_words_per_chapter, 375);
        assert_eq!(degraded.max_words_per_chapter, 625);
        assert_eq!(degraded.pages_label, "~54 pages");
    }
}
