use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ModelError;
use crate::files::FileDescriptor;
use crate::ids::{ItemId, LibraryId, LocationId};

/// Typed classification assigned by a resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ItemKind {
    Movie,
    Series,
    Season,
    Episode,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Movie => "movie",
            ItemKind::Series => "series",
            ItemKind::Season => "season",
            ItemKind::Episode => "episode",
        }
    }

    /// Folder-backed kinds that may act as parents for later entries.
    pub fn is_container(&self) -> bool {
        matches!(self, ItemKind::Series | ItemKind::Season)
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(ItemKind::Movie),
            "series" => Ok(ItemKind::Series),
            "season" => Ok(ItemKind::Season),
            "episode" => Ok(ItemKind::Episode),
            other => Err(ModelError::InvalidKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CreditRole {
    Actor,
    Director,
    Writer,
    Producer,
    /// Studios, bands and other group credits.
    Group,
}

/// Person or group credit discovered from local sources.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Credit {
    pub name: String,
    pub role: CreditRole,
    pub character: Option<String>,
}

/// Resolved metadata node. Resolvers may nest children (a season producing
/// its episodes, for example); the tree is flattened before insertion.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetadataItem {
    pub id: Option<ItemId>,
    pub kind: ItemKind,
    pub library_id: LibraryId,
    pub location_id: LocationId,
    pub parent_id: Option<ItemId>,
    pub title: String,
    pub year: Option<u16>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    pub file: FileDescriptor,
    /// Extra parts of a multi-part item (cd1/cd2, part1/part2).
    pub additional_files: Vec<FileDescriptor>,
    pub genres: Vec<String>,
    pub tags: Vec<String>,
    pub credits: Vec<Credit>,
    pub local_metadata_applied: bool,
    pub children: Vec<MetadataItem>,
}

impl MetadataItem {
    pub fn new(
        kind: ItemKind,
        library_id: LibraryId,
        location_id: LocationId,
        file: FileDescriptor,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            kind,
            library_id,
            location_id,
            parent_id: None,
            title: title.into(),
            year: None,
            season_number: None,
            episode_number: None,
            file,
            additional_files: Vec::new(),
            genres: Vec::new(),
            tags: Vec::new(),
            credits: Vec::new(),
            local_metadata_applied: false,
            children: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub fn with_year(mut self, year: Option<u16>) -> Self {
        self.year = year;
        self
    }

    pub fn with_parent(mut self, parent_id: Option<ItemId>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_child(mut self, child: MetadataItem) -> Self {
        self.children.push(child);
        self
    }

    /// Every file path this item claims, primary first.
    pub fn file_paths(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.file.path.as_path())
            .chain(self.additional_files.iter().map(|f| f.path.as_path()))
    }

    /// Number of nodes in this tree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(MetadataItem::node_count)
            .sum::<usize>()
    }
}

/// Flattened, identifier-bearing row written to the catalog.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CatalogItem {
    pub id: ItemId,
    pub kind: ItemKind,
    pub library_id: LibraryId,
    pub location_id: LocationId,
    pub parent_id: Option<ItemId>,
    pub title: String,
    pub year: Option<u16>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<chrono::DateTime<chrono::Utc>>,
    pub additional_files: Vec<FileDescriptor>,
    pub genres: Vec<String>,
    pub tags: Vec<String>,
    pub credits: Vec<Credit>,
    pub local_metadata_applied: bool,
}
