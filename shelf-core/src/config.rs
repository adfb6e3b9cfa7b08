use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};

/// Video extensions recognised by the built-in resolvers.
pub const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "webm", "flv", "wmv", "m4v", "mpg", "mpeg",
    "ts", "m2ts",
];

fn default_media_extensions() -> Vec<String> {
    DEFAULT_MEDIA_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

/// Worker count for bounded parallel stages: `min(8, max(2, cores))`.
pub fn default_parallelism() -> usize {
    num_cpus::get().clamp(2, 8)
}

/// How reconciliation removes catalog rows for paths that vanished.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionMode {
    /// Rows are flagged deleted and kept for history.
    #[default]
    Soft,
    /// Rows are removed outright.
    Hard,
}

/// Source that produced the pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScanConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Tuning knobs for the scan pipeline and its orchestrator.
///
/// Every field carries a default so partial TOML/JSON payloads are accepted.
/// The prune and memory-trim intervals are throughput knobs, not correctness
/// requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanPipelineConfig {
    /// Resolved items buffered before a bulk insert.
    pub batch_size: usize,
    /// Items between ancestor cache prune cycles.
    pub ancestor_prune_interval: usize,
    /// Files between memory-trim hints on very large libraries.
    pub memory_trim_interval: u64,
    /// Paths per deletion statement during reconciliation.
    pub delete_chunk_size: usize,
    /// Persist progress after this many observed entries.
    pub progress_persist_every: u64,
    /// Persist progress at least this often (milliseconds) while running.
    pub progress_persist_interval_ms: u64,
    pub deletion_mode: DeletionMode,
    /// Concurrent local metadata extractions. Order is preserved.
    pub extraction_concurrency: usize,
    /// Page size used when streaming known paths out of the catalog.
    pub known_path_page_size: usize,
    /// Capacity of the scan event broadcast channel.
    pub event_capacity: usize,
    pub follow_links: bool,
    pub include_hidden: bool,
    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,
}

impl Default for ScanPipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            ancestor_prune_interval: 5_000,
            memory_trim_interval: 10_000,
            delete_chunk_size: 2_000,
            progress_persist_every: 500,
            progress_persist_interval_ms: 5_000,
            deletion_mode: DeletionMode::Soft,
            extraction_concurrency: default_parallelism(),
            known_path_page_size: 5_000,
            event_capacity: 256,
            follow_links: false,
            include_hidden: false,
            media_extensions: default_media_extensions(),
        }
    }
}

impl ScanPipelineConfig {
    pub fn progress_persist_interval(&self) -> Duration {
        Duration::from_millis(self.progress_persist_interval_ms)
    }

    pub fn is_media_extension(&self, ext: &str) -> bool {
        self.media_extensions
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
    }

    /// Replace zero values that would stall the pipeline with defaults.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.batch_size == 0 {
            self.batch_size = defaults.batch_size;
        }
        if self.ancestor_prune_interval == 0 {
            self.ancestor_prune_interval = defaults.ancestor_prune_interval;
        }
        if self.memory_trim_interval == 0 {
            self.memory_trim_interval = defaults.memory_trim_interval;
        }
        if self.delete_chunk_size == 0 {
            self.delete_chunk_size = defaults.delete_chunk_size;
        }
        if self.progress_persist_every == 0 {
            self.progress_persist_every = defaults.progress_persist_every;
        }
        if self.known_path_page_size == 0 {
            self.known_path_page_size = defaults.known_path_page_size;
        }
        if self.event_capacity == 0 {
            self.event_capacity = defaults.event_capacity;
        }
        self.extraction_concurrency = self.extraction_concurrency.clamp(1, 64);
        if self.media_extensions.is_empty() {
            self.media_extensions = default_media_extensions();
        }
        self
    }

    /// Load pipeline configuration overrides using environment variables.
    /// Evaluation order:
    /// 1) `$SHELF_SCAN_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$SHELF_SCAN_CONFIG_JSON` (inline JSON),
    /// 3) a well-known file in the working directory,
    /// 4) defaults.
    pub fn load_from_env() -> anyhow::Result<(Self, ScanConfigSource)> {
        if let Ok(path_str) = env::var("SHELF_SCAN_CONFIG_PATH")
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, ScanConfigSource::EnvPath(path)));
        }

        if let Ok(raw) = env::var("SHELF_SCAN_CONFIG_JSON")
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .context("failed to parse SHELF_SCAN_CONFIG_JSON")?;
            return Ok((parsed, ScanConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file() {
            let config = Self::load_from_file(&path)?;
            return Ok((config, ScanConfigSource::File(path)));
        }

        Ok((Self::default(), ScanConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read scan config from {}", path.display())
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents).with_context(|| {
                format!("invalid scan config {}", path.display())
            }),
            Some("toml") => toml::from_str::<Self>(&contents)
                .map(Self::validated)
                .map_err(|err| {
                    anyhow!("invalid scan config {}: {}", path.display(), err)
                }),
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    pub fn parse_from_str(
        contents: &str,
        origin: &str,
    ) -> anyhow::Result<Self> {
        // Try TOML first, then JSON for convenience.
        toml::from_str::<Self>(contents)
            .or_else(|toml_err| {
                serde_json::from_str::<Self>(contents).map_err(|json_err| {
                    anyhow!(
                        "failed to parse scan config {}: toml error: {}; json error: {}",
                        origin,
                        toml_err,
                        json_err
                    )
                })
            })
            .map(Self::validated)
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str::<Self>(raw)
            .map(Self::validated)
            .map_err(|err| anyhow!("invalid scan config json: {err}"))
    }

    fn find_default_file() -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &[
            "shelf-scan.toml",
            "shelf-scan.json",
            "config/shelf-scan.toml",
            "config/shelf-scan.json",
        ];

        CANDIDATES
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(|path| path.to_path_buf())
    }
}
