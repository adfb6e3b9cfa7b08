use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::ModelError;
use crate::ids::{LibraryId, LocationId};

/// The type of content a library contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "PascalCase"))]
pub enum LibraryType {
    Movies,
    Series,
}

impl LibraryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryType::Movies => "movies",
            LibraryType::Series => "series",
        }
    }
}

impl std::fmt::Display for LibraryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryType::Movies => write!(f, "Movies"),
            LibraryType::Series => write!(f, "TV Shows"),
        }
    }
}

impl FromStr for LibraryType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movies" | "movie" => Ok(LibraryType::Movies),
            "series" | "tv" | "shows" | "tvshows" => Ok(LibraryType::Series),
            other => Err(ModelError::InvalidKind(other.to_string())),
        }
    }
}

/// One configured root directory of a library.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LibraryLocation {
    pub id: LocationId,
    pub path: PathBuf,
}

impl LibraryLocation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            id: LocationId::new(),
            path: path.into(),
        }
    }
}

/// Represents a media library and the root locations it scans
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    pub library_type: LibraryType,
    pub locations: Vec<LibraryLocation>,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Library {
    pub fn new(
        name: impl Into<String>,
        library_type: LibraryType,
        paths: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: LibraryId::new(),
            name: name.into(),
            library_type,
            locations: paths.into_iter().map(LibraryLocation::new).collect(),
            last_scanned_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_scanned(&mut self, at: DateTime<Utc>) {
        self.last_scanned_at = Some(at);
        self.updated_at = at;
    }
}
