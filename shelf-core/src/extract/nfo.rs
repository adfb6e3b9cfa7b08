use std::path::PathBuf;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use shelf_model::{Credit, CreditRole, FileDescriptor, ItemKind, MetadataItem};
use tracing::debug;

use super::{LocalExtractor, LocalMetadata};
use crate::error::{Result, ScanError};

static ROOT_ELEMENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(movie|tvshow|season|episodedetails)\b[^>]*>.*</(movie|tvshow|season|episodedetails)>")
        .expect("nfo root regex should compile")
});

static ACTOR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<actor\b[^>]*>(.*?)</actor>")
        .expect("nfo actor regex should compile")
});

static ELEMENT_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        "genre", "tag", "director", "credits", "writer", "producer", "studio",
        "name", "role",
    ]
    .into_iter()
    .map(|element| {
        let pattern = format!(r"(?is)<{element}\b[^>]*>(.*?)</{element}>");
        (
            element,
            Regex::new(&pattern).expect("nfo element regex should compile"),
        )
    })
    .collect()
});

/// Reads Kodi-style `.nfo` sidecars.
///
/// Looks for `<stem>.nfo` first, then `movie.nfo` for movies, `tvshow.nfo`
/// inside series folders and `season.nfo` inside season folders.
#[derive(Debug, Default, Clone, Copy)]
pub struct NfoExtractor;

impl NfoExtractor {
    fn sidecar_for(
        item: &MetadataItem,
        candidates: &[FileDescriptor],
    ) -> Option<PathBuf> {
        let stem = item.file.stem();
        let named = |wanted: &str| {
            candidates
                .iter()
                .find(|c| !c.is_dir && c.name().eq_ignore_ascii_case(wanted))
                .map(|c| c.path.clone())
        };

        match item.kind {
            ItemKind::Movie => named(&format!("{stem}.nfo"))
                .or_else(|| named("movie.nfo")),
            ItemKind::Episode => named(&format!("{stem}.nfo")),
            ItemKind::Series => named("tvshow.nfo"),
            ItemKind::Season => named("season.nfo"),
        }
    }
}

#[async_trait]
impl LocalExtractor for NfoExtractor {
    fn name(&self) -> &'static str {
        "nfo"
    }

    async fn extract(
        &self,
        item: &MetadataItem,
        candidates: &[FileDescriptor],
    ) -> Result<Option<LocalMetadata>> {
        let Some(path) = Self::sidecar_for(item, candidates) else {
            return Ok(None);
        };
        let contents = tokio::fs::read_to_string(&path).await?;
        let metadata = parse_nfo(&contents).map_err(|err| {
            ScanError::InvalidInput(format!("{}: {err}", path.display()))
        })?;
        debug!(
            target: "scan::extract",
            path = %path.display(),
            genres = metadata.genres.len(),
            credits = metadata.credits.len(),
            "parsed nfo sidecar"
        );
        Ok(Some(metadata))
    }
}

/// Pull genres, tags and credits out of an nfo document.
pub fn parse_nfo(contents: &str) -> std::result::Result<LocalMetadata, String> {
    if !ROOT_ELEMENT_PATTERN.is_match(contents) {
        return Err("no recognised nfo root element".to_string());
    }

    let mut metadata = LocalMetadata {
        applied: true,
        ..LocalMetadata::default()
    };
    let actors_stripped = ACTOR_PATTERN.replace_all(contents, "");

    for (element, pattern) in ELEMENT_PATTERNS.iter() {
        let role = match *element {
            "genre" | "tag" => None,
            "director" => Some(CreditRole::Director),
            "credits" | "writer" => Some(CreditRole::Writer),
            "producer" => Some(CreditRole::Producer),
            "studio" => Some(CreditRole::Group),
            _ => continue,
        };
        for caps in pattern.captures_iter(&actors_stripped) {
            let value = decode_entities(caps[1].trim());
            if value.is_empty() {
                continue;
            }
            match (*element, role) {
                ("genre", _) => push_unique(&mut metadata.genres, value),
                ("tag", _) => push_unique(&mut metadata.tags, value),
                (_, Some(role)) => push_credit(&mut metadata.credits, value, role, None),
                _ => {}
            }
        }
    }

    for actor in ACTOR_PATTERN.captures_iter(contents) {
        let body = &actor[1];
        let Some(name) = first_element(body, "name") else {
            continue;
        };
        let character = first_element(body, "role");
        push_credit(&mut metadata.credits, name, CreditRole::Actor, character);
    }

    Ok(metadata)
}

fn first_element(body: &str, element: &str) -> Option<String> {
    ELEMENT_PATTERNS
        .iter()
        .find(|(name, _)| *name == element)
        .and_then(|(_, pattern)| pattern.captures(body))
        .map(|caps| decode_entities(caps[1].trim()))
        .filter(|value| !value.is_empty())
}

fn push_unique(values: &mut Vec<String>, value: String) {
    if !values.iter().any(|v| v.eq_ignore_ascii_case(&value)) {
        values.push(value);
    }
}

fn push_credit(
    credits: &mut Vec<Credit>,
    name: String,
    role: CreditRole,
    character: Option<String>,
) {
    if credits.iter().any(|c| c.role == role && c.name == name) {
        return;
    }
    credits.push(Credit {
        name,
        role,
        character,
    });
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
