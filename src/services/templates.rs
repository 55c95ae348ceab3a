//! Built-in book templates offered as starting points for a premise.

use rand::seq::SliceRandom;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookTemplate {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub genre: &'static str,
    pub audience: &'static str,
    pub icon: &'static str,
    pub recommended_size: &'static str,
    pub prompt: &'static str,
    pub tags: &'static [&'static str],
}

pub static TEMPLATES: &[BookTemplate] = &[
    BookTemplate {
        id: "fantasy-adventure",
        title: "Fantasy Adventure",
        description: "An epic journey through a world of magic and mythical creatures",
        genre: "fantasy",
        audience: "young",
        icon: "🐉",
        recommended_size: "large",
        prompt: "Write an epic adventure in a fantasy world with:\n\
                 - A hero or heroine with a special destiny\n\
                 - A loyal, funny companion\n\
                 - A powerful villain with complex motives\n\
                 - Magic, mythical creatures and enchanted places\n\
                 - A journey full of thrilling challenges\n\
                 - A theme of friendship, courage and self-discovery",
        tags: &["epic", "magic", "journey", "friendship"],
    },
    BookTemplate {
        id: "space-opera",
        title: "Space Opera",
        description: "Interstellar adventures with starships and alien civilizations",
        genre: "fiction",
        audience: "adult",
        icon: "🚀",
        recommended_size: "large",
        prompt: "Write a gripping space opera with:\n\
                 - A diverse starship crew\n\
                 - The discovery of ancient alien civilizations\n\
                 - Interstellar conflict and galactic diplomacy\n\
                 - Advanced technology and faster-than-light travel\n\
                 - Cosmic mysteries and strange phenomena\n\
                 - Themes of humanity, exploration and coexistence",
        tags: &["space", "aliens", "technology", "exploration"],
    },
    BookTemplate {
        id: "romantic-comedy",
        title: "Romantic Comedy",
        description: "Love stories with funny situations and happy endings",
        genre: "romance",
        audience: "adult",
        icon: "💕",
        recommended_size: "medium",
        prompt: "Write a fun romantic comedy with:\n\
                 - Two characters with opposite personalities\n\
                 - Chance meetings and embarrassing situations\n\
                 - Friends or family who get in the way or help\n\
                 - Conflicts that test the relationship\n\
                 - Romantic scenes and funny moments\n\
                 - A happy, satisfying ending",
        tags: &["love", "humor", "relationship", "happiness"],
    },
    BookTemplate {
        id: "mystery-thriller",
        title: "Mystery Thriller",
        description: "Intriguing stories full of twists and investigations",
        genre: "thriller",
        audience: "adult",
        icon: "🕵️",
        recommended_size: "medium",
        prompt: "Write a mystery thriller with:\n\
                 - A crime or unexplained event\n\
                 - A determined detective or investigator\n\
                 - Clues that lead to surprising revelations\n\
                 - Suspects with motives and secrets\n\
                 - Rising tension and moments of danger\n\
                 - An unexpected final twist",
        tags: &["mystery", "investigation", "suspense", "twist"],
    },
    BookTemplate {
        id: "children-fable",
        title: "Children's Fable",
        description: "Educational tales with talking animals and a moral",
        genre: "children",
        audience: "children",
        icon: "🐻",
        recommended_size: "small",
        prompt: "Write an educational children's fable with:\n\
                 - Animals with human traits\n\
                 - A simple conflict or problem\n\
                 - A journey of learning and discovery\n\
                 - Simple dialogue suitable for children\n\
                 - A positive moral at the end\n\
                 - Gentle elements of fantasy and magic",
        tags: &["educational", "animals", "lesson", "fantasy"],
    },
    BookTemplate {
        id: "superhero-origin",
        title: "Superhero Origin",
        description: "How an ordinary person gains extraordinary powers",
        genre: "adventure",
        audience: "young",
        icon: "🦸",
        recommended_size: "medium",
        prompt: "Write a superhero origin story with:\n\
                 - An ordinary character who gains unexpected powers\n\
                 - Discovering and learning to use those powers\n\
                 - A villain or threat that must be faced\n\
                 - Conflict between normal life and a hero's duties\n\
                 - Allies who help along the way\n\
                 - A thrilling final battle",
        tags: &["powers", "hero", "responsibility", "action"],
    },
    BookTemplate {
        id: "time-travel",
        title: "Time Travel",
        description: "Adventures through time with paradoxes and consequences",
        genre: "fiction",
        audience: "adult",
        icon: "⏰",
        recommended_size: "medium",
        prompt: "Write a time travel story with:\n\
                 - A device or ability to travel through time\n\
                 - Several historical periods visited\n\
                 - Paradoxes and unexpected consequences\n\
                 - Characters from different eras\n\
                 - Decisions that change the timeline\n\
                 - A moral dilemma about meddling with the past",
        tags: &["time", "history", "paradox", "adventure"],
    },
    BookTemplate {
        id: "magic-school",
        title: "School of Magic",
        description: "Young apprentices and their adventures at a magic school",
        genre: "fantasy",
        audience: "young",
        icon: "🏰",
        recommended_size: "large",
        prompt: "Write a story set in a school of magic with:\n\
                 - Young students learning spells and potions\n\
                 - Eccentric, wise teachers\n\
                 - Friendships, rivalries and school competitions\n\
                 - Mysteries and secrets inside the school\n\
                 - Magical threats that must be faced\n\
                 - Personal growth and discovering hidden talents",
        tags: &["school", "magic", "friendship", "learning"],
    },
    BookTemplate {
        id: "detective-noir",
        title: "Detective Noir",
        description: "Detective stories in dark urban settings",
        genre: "thriller",
        audience: "adult",
        icon: "🎩",
        recommended_size: "medium",
        prompt: "Write a noir story with:\n\
                 - A cynical, hardened detective\n\
                 - A big city full of shadows and secrets\n\
                 - A mysterious femme fatale\n\
                 - Corruption and crime behind the scenes of power\n\
                 - Sharp dialogue and a melancholy atmosphere\n\
                 - An ambiguous or surprising ending",
        tags: &["noir", "detective", "city", "mystery"],
    },
    BookTemplate {
        id: "animal-adventure",
        title: "Animal Adventure",
        description: "Exciting journeys led by animal heroes",
        genre: "adventure",
        audience: "children",
        icon: "🐾",
        recommended_size: "small",
        prompt: "Write an adventure with animals as the main characters:\n\
                 - A group of animal friends on a mission\n\
                 - A natural setting (forest, savanna, ocean)\n\
                 - Natural challenges and real dangers\n\
                 - Teamwork and cooperation\n\
                 - Values like friendship, courage and perseverance\n\
                 - A happy, comforting ending",
        tags: &["animals", "nature", "friendship", "adventure"],
    },
];

/// Starting point with no preset prompt.
pub static CUSTOM_TEMPLATE: BookTemplate = BookTemplate {
    id: "custom",
    title: "Custom Creation",
    description: "Create a completely unique book from your own idea",
    genre: "adventure",
    audience: "adult",
    icon: "✨",
    recommended_size: "medium",
    prompt: "",
    tags: &["custom", "unique", "creativity"],
};

pub fn by_id(id: &str) -> Option<&'static BookTemplate> {
    if id == CUSTOM_TEMPLATE.id {
        return Some(&CUSTOM_TEMPLATE);
    }
    TEMPLATES.iter().find(|template| template.id == id)
}

pub fn by_genre(genre: &str) -> Vec<&'static BookTemplate> {
    TEMPLATES
        .iter()
        .filter(|template| template.genre.eq_ignore_ascii_case(genre))
        .collect()
}

pub fn by_audience(audience: &str) -> Vec<&'static BookTemplate> {
    TEMPLATES
        .iter()
        .filter(|template| template.audience.eq_ignore_ascii_case(audience))
        .collect()
}

/// Case-insensitive match on title, description or any tag.
pub fn search(query: &str) -> Vec<&'static BookTemplate> {
    let query = query.to_lowercase();
    TEMPLATES
        .iter()
        .filter(|template| {
            template.title.to_lowercase().contains(&query)
                || template.description.to_lowercase().contains(&query)
                || template
                    .tags
                    .iter()
                    .any(|tag| tag.to_lowercase().contains(&query))
        })
        .collect()
}

pub fn random() -> &'static BookTemplate {
    TEMPLATES
        .choose(&mut rand::thread_rng())
        .unwrap_or(&CUSTOM_TEMPLATE)
}
