//! Built-in resolvers for movie and series libraries.

use async_trait::async_trait;
use shelf_model::{FileDescriptor, ItemKind, LibraryType, MetadataItem};

use super::naming::{
    episode_title, is_extras_folder, is_sample, parse_episode,
    parse_multi_part, parse_season_folder, parse_title_year,
};
use super::{ResolveRequest, Resolver};
use crate::error::Result;

/// Top-level folders of a series library.
#[derive(Debug, Default, Clone, Copy)]
pub struct SeriesResolver;

#[async_trait]
impl Resolver for SeriesResolver {
    fn name(&self) -> &'static str {
        "series"
    }

    fn order(&self) -> i32 {
        10
    }

    fn supports(&self, library_type: LibraryType) -> bool {
        library_type == LibraryType::Series
    }

    async fn resolve(
        &self,
        request: &ResolveRequest<'_>,
    ) -> Result<Option<MetadataItem>> {
        let file = request.file;
        if !file.is_dir
            || request.is_root
            || file.path.parent() != Some(request.location_root)
        {
            return Ok(None);
        }
        let name = file.name();
        if is_extras_folder(&name) || parse_season_folder(&name).is_some() {
            return Ok(None);
        }
        let (title, year) = parse_title_year(&name);
        Ok(Some(request.item(ItemKind::Series, title).with_year(year)))
    }
}

/// Season folders directly beneath a resolved series.
#[derive(Debug, Default, Clone, Copy)]
pub struct SeasonResolver;

#[async_trait]
impl Resolver for SeasonResolver {
    fn name(&self) -> &'static str {
        "season"
    }

    fn order(&self) -> i32 {
        20
    }

    fn supports(&self, library_type: LibraryType) -> bool {
        library_type == LibraryType::Series
    }

    async fn resolve(
        &self,
        request: &ResolveRequest<'_>,
    ) -> Result<Option<MetadataItem>> {
        if !request.file.is_dir {
            return Ok(None);
        }
        let Some(series) = request
            .parent()
            .filter(|parent| parent.item.kind == ItemKind::Series)
        else {
            return Ok(None);
        };
        let Some(number) = parse_season_folder(&request.file.name()) else {
            return Ok(None);
        };

        let title = if number == 0 {
            "Specials".to_string()
        } else {
            format!("Season {number}")
        };
        let mut item = request
            .item(ItemKind::Season, title)
            .with_parent(series.item.id);
        item.season_number = Some(number);
        item.year = series.item.year;
        Ok(Some(item))
    }
}

/// Media files inside a series or season folder.
#[derive(Debug, Default, Clone, Copy)]
pub struct EpisodeResolver;

#[async_trait]
impl Resolver for EpisodeResolver {
    fn name(&self) -> &'static str {
        "episode"
    }

    fn order(&self) -> i32 {
        30
    }

    fn supports(&self, library_type: LibraryType) -> bool {
        library_type == LibraryType::Series
    }

    async fn resolve(
        &self,
        request: &ResolveRequest<'_>,
    ) -> Result<Option<MetadataItem>> {
        if !request.is_media_file() {
            return Ok(None);
        }
        let stem = request.file.stem();
        if is_sample(&stem) {
            return Ok(None);
        }
        let Some(parent) = request.parent() else {
            return Ok(None);
        };
        let Some(numbers) = parse_episode(&stem) else {
            return Ok(None);
        };

        let season = match parent.item.kind {
            ItemKind::Season => parent.item.season_number,
            ItemKind::Series => numbers.season.or(Some(1)),
            _ => return Ok(None),
        };

        let title = episode_title(&stem).unwrap_or(stem);
        let mut item = request
            .item(ItemKind::Episode, title)
            .with_parent(parent.item.id);
        item.season_number = season;
        item.episode_number = Some(numbers.episode);
        Ok(Some(item))
    }
}

/// Movie files, folding multi-part siblings (`cd1`, `part2`, ...) into the
/// lowest-numbered part.
#[derive(Debug, Default, Clone, Copy)]
pub struct MovieResolver;

impl MovieResolver {
    /// Every part of the multi-part movie this file belongs to, owner first.
    /// Always contains the requested file.
    fn part_group<'a>(
        request: &ResolveRequest<'a>,
        base: &str,
        part: u32,
    ) -> Vec<&'a FileDescriptor> {
        let siblings = request.siblings.unwrap_or(&[]);
        let mut parts: Vec<(u32, &FileDescriptor)> = siblings
            .iter()
            .filter(|sibling| {
                !sibling.is_dir
                    && sibling
                        .extension()
                        .is_some_and(|ext| request.config.is_media_extension(&ext))
            })
            .filter_map(|sibling| {
                let (sibling_base, sibling_part) =
                    parse_multi_part(&sibling.stem())?;
                sibling_base
                    .eq_ignore_ascii_case(base)
                    .then_some((sibling_part, sibling))
            })
            .collect();
        if parts.iter().all(|(_, f)| f.path != request.file.path) {
            parts.push((part, request.file));
        }
        parts.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.path.cmp(&b.1.path)));
        parts.into_iter().map(|(_, file)| file).collect()
    }
}

#[async_trait]
impl Resolver for MovieResolver {
    fn name(&self) -> &'static str {
        "movie"
    }

    fn order(&self) -> i32 {
        40
    }

    fn supports(&self, library_type: LibraryType) -> bool {
        library_type == LibraryType::Movies
    }

    async fn resolve(
        &self,
        request: &ResolveRequest<'_>,
    ) -> Result<Option<MetadataItem>> {
        if !request.is_media_file() {
            return Ok(None);
        }
        let stem = request.file.stem();
        if is_sample(&stem) {
            return Ok(None);
        }
        let components = request.relative_components();
        let folders = &components[..components.len().saturating_sub(1)];
        if folders.iter().any(|folder| is_extras_folder(folder)) {
            return Ok(None);
        }

        let mut primary = request.file;
        let mut existing = None;
        let mut additional_files = Vec::new();
        let mut title_source = stem.clone();
        if let Some((base, part)) = parse_multi_part(&stem) {
            let group = Self::part_group(request, &base, part);
            let owner = group.first().copied().unwrap_or(request.file);
            if owner.path != request.file.path {
                // Non-owning parts are written through an unchanged owner's
                // item; a changed owner carries them itself.
                let Some(owner_id) = request.unchanged_sibling(&owner.path)
                else {
                    return Ok(None);
                };
                primary = owner;
                existing = Some(owner_id);
            }
            if group.len() > 1 {
                additional_files = group
                    .iter()
                    .filter(|file| file.path != primary.path)
                    .map(|file| (*file).clone())
                    .collect();
                title_source = base;
            }
        }

        let (file_title, file_year) = parse_title_year(&title_source);
        let (title, year) = match folders.last() {
            Some(folder) => match parse_title_year(folder) {
                (folder_title, Some(year)) => (folder_title, Some(year)),
                _ if file_year.is_some() => (file_title, file_year),
                (folder_title, None) if !additional_files.is_empty() => {
                    (folder_title, None)
                }
                _ => (file_title, None),
            },
            None => (file_title, file_year),
        };

        let mut item = MetadataItem::new(
            ItemKind::Movie,
            request.library_id,
            request.location_id,
            primary.clone(),
            title,
        )
        .with_year(year);
        item.id = existing;
        item.additional_files = additional_files;
        Ok(Some(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanPipelineConfig;
    use crate::resolve::{CachedAncestor, ResolverChain};
    use shelf_model::{ItemId, LibraryId, LocationId};
    use std::path::Path;
    use std::sync::Arc;

    struct Fixture {
        config: ScanPipelineConfig,
        library_id: LibraryId,
        location_id: LocationId,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                config: ScanPipelineConfig::default(),
                library_id: LibraryId::new(),
                location_id: LocationId::new(),
            }
        }

        fn request<'a>(
            &'a self,
            library_type: LibraryType,
            root: &'a Path,
            file: &'a FileDescriptor,
            siblings: Option<&'a [FileDescriptor]>,
            ancestors: &'a [Arc<CachedAncestor>],
        ) -> ResolveRequest<'a> {
            ResolveRequest {
                file,
                library_id: self.library_id,
                library_type,
                location_id: self.location_id,
                location_root: root,
                is_root: false,
                children: None,
                siblings,
                ancestors,
                unchanged_siblings: None,
                config: &self.config,
            }
        }

        fn ancestor(
            &self,
            kind: ItemKind,
            path: &str,
            season: Option<u32>,
        ) -> Arc<CachedAncestor> {
            let file = FileDescriptor::directory(path, None);
            let mut item = MetadataItem::new(
                kind,
                self.library_id,
                self.location_id,
                file.clone(),
                "x",
            );
            item.id = Some(ItemId::new());
            item.season_number = season;
            Arc::new(CachedAncestor { item, file })
        }
    }

    #[tokio::test]
    async fn movie_takes_title_and_year_from_folder() {
        let fx = Fixture::new();
        let file = FileDescriptor::file("/movies/Alien (1979)/Alien.mkv", 1, None);
        let item = MovieResolver
            .resolve(&fx.request(
                LibraryType::Movies,
                Path::new("/movies"),
                &file,
                None,
                &[],
            ))
            .await
            .expect("ok")
            .expect("movie");
        assert_eq!(item.kind, ItemKind::Movie);
        assert_eq!(item.title, "Alien");
        assert_eq!(item.year, Some(1979));
    }

    #[tokio::test]
    async fn non_media_samples_and_extras_are_skipped() {
        let fx = Fixture::new();
        let root = Path::new("/movies");
        for path in [
            "/movies/Alien (1979)/Alien.nfo",
            "/movies/Alien (1979)/alien-sample.mkv",
            "/movies/Alien (1979)/Extras/Making Of.mkv",
        ] {
            let file = FileDescriptor::file(path, 1, None);
            let resolved = MovieResolver
                .resolve(&fx.request(LibraryType::Movies, root, &file, None, &[]))
                .await
                .expect("ok");
            assert!(resolved.is_none(), "{path} should not resolve");
        }
    }

    #[tokio::test]
    async fn multi_part_movies_fold_into_first_part() {
        let fx = Fixture::new();
        let root = Path::new("/movies");
        let cd1 = FileDescriptor::file("/movies/Heat (1995)/Heat cd1.mkv", 1, None);
        let cd2 = FileDescriptor::file("/movies/Heat (1995)/Heat cd2.mkv", 1, None);
        let listing = vec![cd1.clone(), cd2.clone()];

        let first = MovieResolver
            .resolve(&fx.request(
                LibraryType::Movies,
                root,
                &cd1,
                Some(&listing),
                &[],
            ))
            .await
            .expect("ok")
            .expect("movie");
        assert_eq!(first.title, "Heat");
        assert_eq!(first.additional_files, vec![cd2.clone()]);

        let second = MovieResolver
            .resolve(&fx.request(
                LibraryType::Movies,
                root,
                &cd2,
                Some(&listing),
                &[],
            ))
            .await
            .expect("ok");
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn new_part_is_written_through_an_unchanged_owner() {
        let fx = Fixture::new();
        let root = Path::new("/movies");
        let cd1 = FileDescriptor::file("/movies/Heat (1995)/Heat cd1.mkv", 1, None);
        let cd2 = FileDescriptor::file("/movies/Heat (1995)/Heat cd2.mkv", 1, None);
        let listing = vec![cd1.clone(), cd2.clone()];
        let owner_id = ItemId::new();
        let unchanged = std::collections::HashMap::from([(
            cd1.path.clone(),
            owner_id,
        )]);

        let mut request =
            fx.request(LibraryType::Movies, root, &cd2, Some(&listing), &[]);
        request.unchanged_siblings = Some(&unchanged);
        let item = MovieResolver
            .resolve(&request)
            .await
            .expect("ok")
            .expect("owner item");

        assert_eq!(item.id, Some(owner_id));
        assert_eq!(item.file.path, cd1.path);
        assert_eq!(item.additional_files, vec![cd2.clone()]);
        assert_eq!(item.title, "Heat");
        assert_eq!(item.year, Some(1995));
    }

    #[tokio::test]
    async fn series_season_episode_hierarchy() {
        let fx = Fixture::new();
        let root = Path::new("/tv");
        let chain = ResolverChain::with_defaults();

        let show = FileDescriptor::directory("/tv/The Wire (2002)", None);
        let series = chain
            .resolve(&fx.request(LibraryType::Series, root, &show, None, &[]))
            .await
            .expect("ok")
            .expect("series");
        assert_eq!(series.kind, ItemKind::Series);
        assert_eq!(series.title, "The Wire");

        let series_ancestor =
            fx.ancestor(ItemKind::Series, "/tv/The Wire (2002)", None);
        let season_dir =
            FileDescriptor::directory("/tv/The Wire (2002)/Season 2", None);
        let ancestors = vec![Arc::clone(&series_ancestor)];
        let season = chain
            .resolve(&fx.request(
                LibraryType::Series,
                root,
                &season_dir,
                None,
                &ancestors,
            ))
            .await
            .expect("ok")
            .expect("season");
        assert_eq!(season.kind, ItemKind::Season);
        assert_eq!(season.season_number, Some(2));
        assert_eq!(season.parent_id, series_ancestor.item.id);

        let season_ancestor = fx.ancestor(
            ItemKind::Season,
            "/tv/The Wire (2002)/Season 2",
            Some(2),
        );
        let ancestors = vec![series_ancestor, Arc::clone(&season_ancestor)];
        let episode_file = FileDescriptor::file(
            "/tv/The Wire (2002)/Season 2/The Wire - S02E03 - Hot Shots.mkv",
            1,
            None,
        );
        let episode = chain
            .resolve(&fx.request(
                LibraryType::Series,
                root,
                &episode_file,
                None,
                &ancestors,
            ))
            .await
            .expect("ok")
            .expect("episode");
        assert_eq!(episode.kind, ItemKind::Episode);
        assert_eq!(episode.season_number, Some(2));
        assert_eq!(episode.episode_number, Some(3));
        assert_eq!(episode.title, "Hot Shots");
        assert_eq!(episode.parent_id, season_ancestor.item.id);
    }

    #[tokio::test]
    async fn episodes_without_resolved_parent_are_left_alone() {
        let fx = Fixture::new();
        let file = FileDescriptor::file("/tv/loose S01E01.mkv", 1, None);
        let resolved = ResolverChain::with_defaults()
            .resolve(&fx.request(
                LibraryType::Series,
                Path::new("/tv"),
                &file,
                None,
                &[],
            ))
            .await
            .expect("ok");
        assert!(resolved.is_none());
    }
}
