//! Batch job model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a job does to each of its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    VersionGeneration,
    AudioMatch,
    Review,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::VersionGeneration => write!(f, "version-generation"),
            JobKind::AudioMatch => write!(f, "audio-match"),
            JobKind::Review => write!(f, "review"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Cancelled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Succeeded | ItemStatus::Failed | ItemStatus::Skipped)
    }
}

/// Input for one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub target_id: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl BatchItem {
    pub fn new(target_id: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            target_id: target_id.into(),
            params,
        }
    }
}

/// One tracked unit of work inside a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobItem {
    pub id: Uuid,
    pub target_id: String,
    pub params: serde_json::Value,
    pub status: ItemStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl JobItem {
    pub(crate) fn pending(item: BatchItem) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_id: item.target_id,
            params: item.params,
            status: ItemStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub(crate) fn as_batch_item(&self) -> BatchItem {
        BatchItem::new(self.target_id.clone(), self.params.clone())
    }
}

/// An item that failed, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub target_id: String,
    pub error: String,
}

/// Target ids of the items in each terminal state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<ItemFailure>,
    pub skipped: Vec<String>,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.skipped.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.target_id.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: Uuid,
    pub kind: JobKind,
    pub items: Vec<JobItem>,
    /// 0-100; only ever increases.
    pub progress_percent: u8,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    /// Set once no item is pending or running.
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchJob {
    pub(crate) fn new(kind: JobKind, items: Vec<BatchItem>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            items: items.into_iter().map(JobItem::pending).collect(),
            progress_percent: 0,
            status: JobStatus::Running,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn outcome(&self) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for item in &self.items {
            let target_id = item.target_id.clone();
            match item.status {
                ItemStatus::Succeeded => outcome.succeeded.push(target_id),
                ItemStatus::Failed => outcome.failed.push(ItemFailure {
                    target_id,
                    error: item.error.clone().unwrap_or_default(),
                }),
                ItemStatus::Skipped => outcome.skipped.push(target_id),
                ItemStatus::Pending | ItemStatus::Running => {}
            }
        }
        outcome
    }

    pub fn terminal_count(&self) -> usize {
        self.items.iter().filter(|i| i.status.is_terminal()).count()
    }

    pub fn running_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.status == ItemStatus::Running)
            .count()
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Recompute progress from terminal items and close the job if nothing is left.
    pub(crate) fn refresh(&mut self) {
        let total = self.items.len();
        let percent = if total == 0 {
            100
        } else {
            ((self.terminal_count() * 100 + total / 2) / total) as u8
        };
        self.progress_percent = self.progress_percent.max(percent);

        if self.finished_at.is_none() && self.terminal_count() == total {
            if self.status == JobStatus::Running {
                self.status = JobStatus::Completed;
            }
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn progress(&self) -> JobProgress {
        JobProgress {
            job_id: self.id,
            status: self.status,
            progress_percent: self.progress_percent,
            outcome: self.outcome(),
            total: self.items.len(),
            finished: self.is_finished(),
        }
    }
}

/// Snapshot broadcast to subscribers after every state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub outcome: BatchOutcome,
    pub total: usize,
    pub finished: bool,
}
