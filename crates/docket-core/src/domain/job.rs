//! Job session record: everything the client remembers about one async job.
//!
//! Design: following the same pattern as the instance aggregate.
//! - Serialized with camelCase keys (that is the persisted shape)
//! - Times are epoch milliseconds
//! - State transitions via methods, so `last_updated` is never forgotten

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::status::{ItemStatus, JobStatus};

/// Where a job's output belongs. Unknown keys are kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,

    /// Draft id of the document that started the job; tells unsaved siblings apart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DocumentContext {
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Self::default()
        }
    }

    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn with_draft(mut self, draft_id: impl Into<String>) -> Self {
        self.draft_id = Some(draft_id.into());
        self
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn with_stage(mut self, stage_id: impl Into<String>) -> Self {
        self.stage_id = Some(stage_id.into());
        self
    }

    /// Enough to reopen the document later: a project plus a document id or task type.
    pub fn is_resolvable(&self) -> bool {
        let has_project = self
            .project_id
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty());
        has_project && (self.document_id.is_some() || self.task_type.is_some())
    }

    /// Does this context point at the given document?
    ///
    /// Jobs started before the document's first save carry no document id; those are tied
    /// to the document through its draft id, which also survives the first save. Contexts
    /// with neither id match any unsaved document of the same project and task type.
    pub fn refers_to(
        &self,
        project_id: &str,
        document_id: Option<&str>,
        draft_id: Option<&str>,
        task_type: &str,
    ) -> bool {
        if self.project_id.as_deref() != Some(project_id) {
            return false;
        }
        if let Some(ours) = self.document_id.as_deref() {
            return document_id == Some(ours);
        }
        match (self.draft_id.as_deref(), draft_id) {
            (Some(ours), Some(theirs)) => ours == theirs,
            (Some(_), None) => false,
            (None, _) => {
                document_id.is_none() && self.task_type.as_deref().is_none_or(|t| t == task_type)
            }
        }
    }
}

/// One processed item (e.g. an answered question) inside a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingItem {
    #[serde(alias = "id")]
    pub item_id: String,
    pub status: ItemStatus,
    #[serde(default)]
    pub at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Bounded ring of recent item outcomes (oldest first).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessingItems(VecDeque<ProcessingItem>);

impl ProcessingItems {
    /// Append, dropping the oldest entries beyond `capacity`.
    pub fn push(&mut self, item: ProcessingItem, capacity: usize) {
        self.0.push_back(item);
        self.truncate_to(capacity);
    }

    pub fn truncate_to(&mut self, capacity: usize) {
        while self.0.len() > capacity {
            self.0.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessingItem> {
        self.0.iter()
    }

    pub(crate) fn from_items(items: impl IntoIterator<Item = ProcessingItem>) -> Self {
        Self(items.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecoveryData {
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub resumable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Value>,
}

/// Provenance: which session wrote the record, and whether it came through a migration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub schema_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrated_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrated_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSessionRecord {
    pub job_id: String,

    #[serde(default)]
    pub job_type: String,

    #[serde(default)]
    pub status: JobStatus,

    /// 0..=100
    #[serde(default)]
    pub progress: u8,

    pub start_time: i64,
    pub last_updated: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_time: Option<i64>,

    /// Verbatim status/progress payloads from the job execution service.
    #[serde(default)]
    pub meta: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_context: Option<DocumentContext>,

    #[serde(default)]
    pub processing_items: ProcessingItems,

    #[serde(default)]
    pub recovery_data: RecoveryData,

    #[serde(default)]
    pub session_info: SessionInfo,
}

impl JobSessionRecord {
    pub fn new(job_id: impl Into<String>, job_type: impl Into<String>, now_ms: i64) -> Self {
        Self {
            job_id: job_id.into(),
            job_type: job_type.into(),
            status: JobStatus::Pending,
            progress: 0,
            start_time: now_ms,
            last_updated: now_ms,
            last_active_time: None,
            meta: Map::new(),
            document_context: None,
            processing_items: ProcessingItems::default(),
            recovery_data: RecoveryData::default(),
            session_info: SessionInfo::default(),
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_context(mut self, context: DocumentContext) -> Self {
        self.document_context = Some(context);
        self
    }

    /// Older than `max_age_ms` since start. Provenance never participates.
    pub fn is_expired(&self, now_ms: i64, max_age_ms: i64) -> bool {
        now_ms.saturating_sub(self.start_time) > max_age_ms
    }

    /// Most recent of `last_updated` and `last_active_time`.
    pub fn last_touched(&self) -> i64 {
        self.last_active_time
            .map_or(self.last_updated, |t| t.max(self.last_updated))
    }

    /// Stage this job works for: document context first, then `meta.stageId`.
    pub fn stage_id(&self) -> Option<&str> {
        self.document_context
            .as_ref()
            .and_then(|c| c.stage_id.as_deref())
            .or_else(|| self.meta.get("stageId").and_then(Value::as_str))
    }

    /// Apply a status transition. `COMPLETED` is final for a job: later deliveries
    /// (a stale `RUNNING` from another tab, a retried webhook) are ignored and `false`
    /// is returned.
    pub fn set_status(&mut self, status: JobStatus, now_ms: i64) -> bool {
        if self.status == JobStatus::Completed && status != JobStatus::Completed {
            tracing::debug!(
                job_id = %self.job_id,
                ignored = %status,
                "job already completed; keeping COMPLETED"
            );
            return false;
        }
        self.status = status;
        if status == JobStatus::Completed {
            self.progress = 100;
        }
        if status == JobStatus::Failed {
            self.recovery_data.attempts += 1;
        }
        self.last_updated = now_ms;
        true
    }

    pub fn set_progress(&mut self, progress: f64, now_ms: i64) {
        if self.status == JobStatus::Completed {
            return;
        }
        self.progress = clamp_progress(progress);
        self.last_updated = now_ms;
    }
}

/// Clamp any numeric progress into 0..=100.
pub fn clamp_progress(progress: f64) -> u8 {
    if progress.is_nan() {
        return 0;
    }
    progress.round().clamp(0.0, 100.0) as u8
}
