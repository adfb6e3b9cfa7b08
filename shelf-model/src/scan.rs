use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::ModelError;
use crate::ids::{LibraryId, ScanId};

/// Lifecycle of a scan run: `Pending -> Running -> {Completed | Failed | Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
            ScanStatus::Cancelled => "cancelled",
        }
    }

    /// Pending or Running; at most one active scan exists per library.
    pub fn is_active(&self) -> bool {
        matches!(self, ScanStatus::Pending | ScanStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScanStatus::Pending),
            "running" => Ok(ScanStatus::Running),
            "completed" => Ok(ScanStatus::Completed),
            "failed" => Ok(ScanStatus::Failed),
            "cancelled" => Ok(ScanStatus::Cancelled),
            other => Err(ModelError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanCounters {
    /// Every filesystem entry observed this run.
    pub total: u64,
    /// Entries that went through resolution.
    pub processed: u64,
    pub added: u64,
    pub updated: u64,
    pub removed: u64,
}

/// Persisted record of one scan run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LibraryScan {
    pub id: ScanId,
    pub library_id: LibraryId,
    pub status: ScanStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub counters: ScanCounters,
    pub error_message: Option<String>,
    /// Name of the stage that owns `resume_cursor`.
    pub current_stage: Option<String>,
    /// Opaque, stage-specific resume position.
    pub resume_cursor: Option<String>,
    pub checkpoint_version: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

impl LibraryScan {
    pub fn pending(library_id: LibraryId) -> Self {
        let now = Utc::now();
        Self {
            id: ScanId::new(),
            library_id,
            status: ScanStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            counters: ScanCounters::default(),
            error_message: None,
            current_stage: None,
            resume_cursor: None,
            checkpoint_version: None,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Left `Running` with a checkpoint: the owning process stopped mid-run.
    pub fn is_interrupted(&self) -> bool {
        self.status == ScanStatus::Running
            && self.current_stage.is_some()
            && self.resume_cursor.is_some()
    }

    pub fn mark_running(&mut self) {
        let now = Utc::now();
        self.status = ScanStatus::Running;
        self.started_at.get_or_insert(now);
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self) {
        self.finish(ScanStatus::Completed);
        self.clear_checkpoint();
    }

    pub fn mark_cancelled(&mut self) {
        self.finish(ScanStatus::Cancelled);
        self.clear_checkpoint();
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.finish(ScanStatus::Failed);
        self.error_message = Some(message.into());
        self.clear_checkpoint();
    }

    pub fn clear_checkpoint(&mut self) {
        self.current_stage = None;
        self.resume_cursor = None;
        self.checkpoint_version = None;
    }

    fn finish(&mut self, status: ScanStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}
