//! Splits unstructured model prose into pseudo-chapters.

use once_cell::sync::Lazy;
use regex::Regex;

const MAX_HEADING_CHARS: usize = 100;

// Chapter-like headings; group 1 is the number, group 2 an optional subtitle.
static NUMBERED_HEADINGS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^chapter\s+(\d+|[a-z]+)\s*(?:[-:.–—]\s*(.*))?$",
        r"(?i)^chap\.?\s*(\d+)\s*(?:[-:.–—]\s*(.*))?$",
        r"(?i)^cap[ií]tulo\s+(\d+|[a-zà-ú]+)\s*(?:[-:.–—]\s*(.*))?$",
        r"(?i)^(?:part|section|parte)\s+(\d+|[a-z]+)\s*(?:[-:.–—]\s*(.*))?$",
        r"^第\s*([0-9一二三四五六七八九十百千万]+)\s*[章节回话]\s*(.*)$",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

static MARKDOWN_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,3})\s+(.+?)\s*#*$").expect("markdown heading regex"));
static BOLD_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\*\*([^*]+)\*\*$").expect("bold heading regex"));
static NUMBERED_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}\.\s+([^.!?]+)$").expect("numbered title regex"));
static LABELLED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^(title|t[ií]tulo|synopsis|sinopse)\s*:\s*(.+)$").expect("label regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub title: String,
    /// Chapter/part style heading rather than a free-standing title.
    pub numbered: bool,
    /// Markdown level, when the heading used `#` markers.
    pub level: Option<usize>,
}

/// Recognises a heading line and returns its display title.
pub fn heading(line: &str) -> Option<Heading> {
    let line = line.trim();
    if line.is_empty() || line.chars().count() > MAX_HEADING_CHARS {
        return None;
    }

    if let Some(caps) = MARKDOWN_HEADING.captures(line) {
        let level = caps.get(1).map(|m| m.as_str().len());
        let inner = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let inner = inner.trim_matches('*').trim();
        return Some(match numbered_heading(inner) {
            Some(title) => Heading {
                title,
                numbered: true,
                level,
            },
            None => Heading {
                title: inner.to_string(),
                numbered: false,
                level,
            },
        });
    }

    let unbolded = BOLD_HEADING
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim());

    if let Some(title) = numbered_heading(unbolded.unwrap_or(line)) {
        return Some(Heading {
            title,
            numbered: true,
            level: None,
        });
    }

    if let Some(inner) = unbolded {
        return Some(Heading {
            title: inner.to_string(),
            numbered: false,
            level: None,
        });
    }

    NUMBERED_TITLE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| Heading {
            title: m.as_str().trim().to_string(),
            numbered: true,
            level: None,
        })
}

fn numbered_heading(line: &str) -> Option<String> {
    NUMBERED_HEADINGS.iter().find_map(|regex| {
        let caps = regex.captures(line)?;
        let subtitle = caps
            .get(2)
            .map(|m| m.as_str().trim().trim_matches('"').trim())
            .filter(|s| !s.is_empty());
        Some(match subtitle {
            Some(subtitle) => subtitle.to_string(),
            None => line.to_string(),
        })
    })
}

/// `Title: ...` / `Synopsis: ...` prefixes at the start of a paragraph.
pub fn labelled(paragraph: &str) -> Option<(Label, String)> {
    let caps = LABELLED.captures(paragraph.trim())?;
    let label = match caps.get(1)?.as_str().to_lowercase().as_str() {
        "title" | "titulo" | "título" => Label::Title,
        _ => Label::Synopsis,
    };
    let value = caps.get(2)?.as_str().trim().trim_matches('"').trim().to_string();
    Some((label, value))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Title,
    Synopsis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmented {
    pub title: Option<String>,
    pub synopsis: Option<String>,
    pub sections: Vec<Section>,
}

/// Splits prose on chapter headings, or on blank lines when there are none.
pub fn segment(text: &str, expected: usize) -> Segmented {
    let lines: Vec<&str> = text.lines().collect();
    let headings: Vec<(usize, Heading)> = lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| heading(line).map(|h| (idx, h)))
        .collect();

    let mut result = Segmented::default();

    let mut chapter_headings: &[(usize, Heading)] = &headings;
    if let Some((first_idx, first)) = headings.first() {
        let is_book_title = !first.numbered
            && first.level.is_some_and(|level| level == 1)
            && headings.len() > 1;
        if is_book_title {
            result.title = Some(first.title.clone());
            chapter_headings = &headings[1..];
            let preface = join_lines(&lines[first_idx + 1..chapter_headings[0].0]);
            apply_preface(&mut result, &preface);
        }
    }

    if chapter_headings.is_empty() {
        let mut paragraphs = paragraphs(text);
        take_labels(&mut result, &mut paragraphs);
        if result.title.is_none() {
            if let Some(first) = paragraphs.first() {
                if looks_like_title(first) && paragraphs.len() > 1 {
                    result.title = Some(first.trim_matches('"').to_string());
                    paragraphs.remove(0);
                }
            }
        }
        result.sections = distribute(paragraphs, expected)
            .into_iter()
            .map(|content| Section {
                title: None,
                content,
            })
            .collect();
        return result;
    }

    if result.title.is_none() {
        let preface = join_lines(&lines[..chapter_headings[0].0]);
        apply_preface(&mut result, &preface);
    }

    for (pos, (idx, found)) in chapter_headings.iter().enumerate() {
        let end = chapter_headings
            .get(pos + 1)
            .map(|(next, _)| *next)
            .unwrap_or(lines.len());
        result.sections.push(Section {
            title: Some(found.title.clone()),
            content: join_lines(&lines[idx + 1..end]),
        });
    }
    result
}

fn apply_preface(result: &mut Segmented, preface: &str) {
    let mut paragraphs = paragraphs(preface);
    take_labels(result, &mut paragraphs);
    if result.synopsis.is_none() && !paragraphs.is_empty() {
        result.synopsis = Some(paragraphs.join("\n\n"));
    }
}

fn take_labels(result: &mut Segmented, paragraphs: &mut Vec<String>) {
    paragraphs.retain(|paragraph| match labelled(paragraph) {
        Some((Label::Title, value)) if result.title.is_none() => {
            result.title = Some(value);
            false
        }
        Some((Label::Synopsis, value)) if result.synopsis.is_none() => {
            result.synopsis = Some(value);
            false
        }
        _ => true,
    });
}

fn looks_like_title(paragraph: &str) -> bool {
    let trimmed = paragraph.trim();
    !trimmed.contains('\n')
        && trimmed.chars().count() <= 80
        && !trimmed.ends_with(['.', '!', '?', ':', ','])
}

fn join_lines(lines: &[&str]) -> String {
    lines.join("\n").trim().to_string()
}

/// Blank-line separated paragraphs, trimmed, empty ones dropped.
pub fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n").trim().to_string());
    }
    out
}

/// Groups paragraphs into at most `expected` contiguous chunks of similar size.
pub fn distribute(paragraphs: Vec<String>, expected: usize) -> Vec<String> {
    if paragraphs.is_empty() || expected == 0 {
        return Vec::new();
    }
    let per_chunk = paragraphs.len().div_ceil(expected);
    paragraphs
        .chunks(per_chunk)
        .map(|chunk| chunk.join("\n\n"))
        .collect()
}
