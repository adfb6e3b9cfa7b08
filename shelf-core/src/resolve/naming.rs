//! Filename and folder-name conventions shared by the built-in resolvers.

use once_cell::sync::Lazy;
use regex::Regex;

static COLLAPSE_WHITESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex should compile"));

static TITLE_YEAR_PARENS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)\s*[\(\[]((?:19|20)\d{2})[\)\]]")
        .expect("title year paren regex should compile")
});

static TITLE_YEAR_DOT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)[\.\s_]+((?:19|20)\d{2})(?:[\.\s_]|$)")
        .expect("title year dot regex should compile")
});

static SEASON_FOLDER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^season[\s._-]*(\d+)$",
        r"(?i)^s(\d{1,2})$",
        r"(?i)^series[\s._-]*(\d+)$",
    ]
    .iter()
    .map(|pattern| {
        Regex::new(pattern).expect("season folder regex should compile")
    })
    .collect()
});

static SPECIALS_FOLDER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^specials?$").expect("specials regex should compile")
});

static EPISODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"[Ss](\d{1,3})[\s._-]*[Ee](\d{1,4})(?:-?[Ee](\d{1,4}))?",
        r"(?:^|[^\d])(\d{1,2})[xX](\d{2,3})(?:-[xX]?(\d{2,3}))?",
        r"(?i)season[\s._-]*(\d+)[\s._-]*episode[\s._-]*(\d+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("episode regex should compile"))
    .collect()
});

static BARE_EPISODE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[\s._-])(?:e|ep|episode)[\s._-]*(\d{1,4})(?:[\s._-]|$)")
        .expect("bare episode regex should compile")
});

static MULTI_PART_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.*?)[\s._-]*(?:cd|dvd|part|pt|disc|disk)[\s._-]*(\d{1,2})$")
        .expect("multi-part regex should compile")
});

static SAMPLE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[\s._-])sample$")
        .expect("sample regex should compile")
});

const EXTRAS_FOLDERS: &[&str] = &[
    "extras",
    "featurettes",
    "behind the scenes",
    "deleted scenes",
    "interviews",
    "trailers",
    "shorts",
];

/// Collapse separators and redundant whitespace.
pub fn clean_title(title: &str) -> String {
    let collapsed = title.replace(['.', '_'], " ");
    COLLAPSE_WHITESPACE_REGEX
        .replace_all(collapsed.trim().trim_matches('-').trim(), " ")
        .to_string()
}

/// Split `"Alien (1979)"` or `"Alien.1979.1080p"` into title and year.
pub fn parse_title_year(name: &str) -> (String, Option<u16>) {
    for pattern in [&*TITLE_YEAR_PARENS_PATTERN, &*TITLE_YEAR_DOT_PATTERN] {
        if let Some(caps) = pattern.captures(name) {
            let title = clean_title(&caps[1]);
            if !title.is_empty() {
                return (title, caps[2].parse().ok());
            }
        }
    }
    (clean_title(name), None)
}

/// Season number for a season folder name; specials map to season 0.
pub fn parse_season_folder(name: &str) -> Option<u32> {
    let name = name.trim();
    if SPECIALS_FOLDER_PATTERN.is_match(name) {
        return Some(0);
    }
    SEASON_FOLDER_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(name))
        .and_then(|caps| caps[1].parse().ok())
}

/// Season/episode numbers encoded in a file stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeNumbers {
    pub season: Option<u32>,
    pub episode: u32,
    pub end_episode: Option<u32>,
}

/// Parse `S01E02`, `1x02`, `Season 1 Episode 2`, and bare `E02`.
pub fn parse_episode(stem: &str) -> Option<EpisodeNumbers> {
    for pattern in EPISODE_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(stem) {
            let season = caps.get(1)?.as_str().parse().ok()?;
            let episode = caps.get(2)?.as_str().parse().ok()?;
            let end_episode = caps.get(3).and_then(|m| m.as_str().parse().ok());
            return Some(EpisodeNumbers {
                season: Some(season),
                episode,
                end_episode,
            });
        }
    }
    BARE_EPISODE_PATTERN.captures(stem).and_then(|caps| {
        Some(EpisodeNumbers {
            season: None,
            episode: caps[1].parse().ok()?,
            end_episode: None,
        })
    })
}

/// Text after the episode token, used as the episode title when present.
pub fn episode_title(stem: &str) -> Option<String> {
    let end = EPISODE_PATTERNS
        .iter()
        .chain(std::iter::once(&*BARE_EPISODE_PATTERN))
        .find_map(|pattern| pattern.find(stem))?
        .end();
    let title = clean_title(stem[end..].trim_start_matches([' ', '.', '_', '-']));
    (!title.is_empty()).then_some(title)
}

/// Split `"Movie cd2"` into `("Movie", 2)`. Compare bases case-insensitively.
pub fn parse_multi_part(stem: &str) -> Option<(String, u32)> {
    let caps = MULTI_PART_PATTERN.captures(stem)?;
    let base = caps[1].trim().to_string();
    if base.is_empty() {
        return None;
    }
    Some((base, caps[2].parse().ok()?))
}

pub fn is_sample(stem: &str) -> bool {
    SAMPLE_PATTERN.is_match(stem)
}

pub fn is_extras_folder(name: &str) -> bool {
    EXTRAS_FOLDERS
        .iter()
        .any(|folder| name.eq_ignore_ascii_case(folder))
}
