//! Document task instance: the serializable aggregate behind one open document.
//!
//! Stage status lives in two places:
//! - `stages[i].status` (the ordered stage array)
//! - `stage_data[stage_id]["status"]` (the shadow status inside each stage payload)
//!
//! The two may diverge right after an async job event; the reconciler converges them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::status::{JobStatus, StageStatus};
use super::task::TaskType;

/// Key of the shadow status inside a stage payload.
pub const MIRROR_STATUS_KEY: &str = "status";

/// The document's own lifecycle field (independent of stage progress).
///
/// Unknown values decode as `Draft`; older builds wrote free-form strings here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Draft,
    Active,
    Archived,
}

impl<'de> Deserialize<'de> for DocumentStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(match raw.trim().to_ascii_lowercase().as_str() {
            "active" | "in_progress" => DocumentStatus::Active,
            "archived" | "closed" => DocumentStatus::Archived,
            _ => DocumentStatus::Draft,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageEntry {
    pub stage_id: String,
    #[serde(default)]
    pub status: StageStatus,
}

impl StageEntry {
    pub fn not_started(stage_id: impl Into<String>) -> Self {
        Self {
            stage_id: stage_id.into(),
            status: StageStatus::NotStarted,
        }
    }
}

/// One job as remembered by the document (`stageData.jobHistory[]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHistoryEntry {
    #[serde(alias = "id")]
    pub job_id: String,

    #[serde(default)]
    pub job_type: String,

    #[serde(default)]
    pub status: JobStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl JobHistoryEntry {
    pub fn new(job_id: impl Into<String>, job_type: impl Into<String>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            job_type: job_type.into(),
            status,
            stage_id: None,
            metadata: Map::new(),
            started_at: None,
            updated_at: None,
            result: None,
        }
    }

    pub fn for_stage(mut self, stage_id: impl Into<String>) -> Self {
        self.stage_id = Some(stage_id.into());
        self
    }

    /// Explicit stage id, falling back to `metadata.stageId`.
    pub fn stage_id(&self) -> Option<&str> {
        self.stage_id
            .as_deref()
            .or_else(|| self.metadata.get("stageId").and_then(Value::as_str))
    }
}

/// `stageData`: stage payloads keyed by stage id, plus the document's job history.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StageData {
    #[serde(rename = "jobHistory", default, skip_serializing_if = "Vec::is_empty")]
    pub job_history: Vec<JobHistoryEntry>,

    #[serde(flatten)]
    pub entries: BTreeMap<String, Value>,
}

impl StageData {
    pub fn payload(&self, stage_id: &str) -> Option<&Value> {
        self.entries.get(stage_id)
    }

    /// Payload for `stage_id`, created as `{}` (or coerced to an object) if needed.
    pub fn payload_mut(&mut self, stage_id: &str) -> &mut Map<String, Value> {
        let slot = self
            .entries
            .entry(stage_id.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => map,
            _ => unreachable!("slot was coerced to an object above"),
        }
    }

    pub fn mirror_status(&self, stage_id: &str) -> Option<StageStatus> {
        self.entries
            .get(stage_id)?
            .get(MIRROR_STATUS_KEY)?
            .as_str()
            .and_then(StageStatus::parse)
    }

    pub fn set_mirror_status(&mut self, stage_id: &str, status: StageStatus) {
        self.payload_mut(stage_id).insert(
            MIRROR_STATUS_KEY.to_string(),
            Value::String(status.as_str().to_string()),
        );
    }

    /// Jobs whose explicit or metadata-embedded stage id is `stage_id`.
    pub fn jobs_for_stage<'a>(
        &'a self,
        stage_id: &'a str,
    ) -> impl Iterator<Item = &'a JobHistoryEntry> + 'a {
        self.job_history
            .iter()
            .filter(move |job| job.stage_id() == Some(stage_id))
    }
}

/// Lightweight pointer from a document to a job it started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub job_id: String,
    #[serde(default)]
    pub job_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTaskInstance {
    pub task_type: TaskType,

    /// Composite `accountId#projectId`.
    pub project_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_project_id: Option<String>,

    #[serde(default)]
    pub project_name: String,

    #[serde(default)]
    pub owner: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,

    #[serde(default)]
    pub title: String,

    /// Title assigned at creation; any other title counts as user content.
    #[serde(default)]
    pub default_title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<String>,

    #[serde(default)]
    pub status: DocumentStatus,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_saved_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub is_dirty: bool,

    #[serde(default)]
    pub is_saved: bool,

    #[serde(default)]
    pub stages: Vec<StageEntry>,

    #[serde(default)]
    pub stage_data: StageData,

    #[serde(default)]
    pub job_references: Vec<JobReference>,

    /// Bumped on every mutation; lets auto-save notice edits that raced a write.
    #[serde(skip)]
    revision: u64,
}

impl DocumentTaskInstance {
    /// Fresh instance with every stage `NOT_STARTED`. Callers go through the factory.
    pub(crate) fn blank(
        task_type: TaskType,
        project_id: String,
        created_at: DateTime<Utc>,
        stage_ids: &[&str],
    ) -> Self {
        Self {
            task_type,
            project_id,
            account_id: None,
            base_project_id: None,
            project_name: String::new(),
            owner: String::new(),
            document_id: None,
            title: String::new(),
            default_title: String::new(),
            draft_id: None,
            status: DocumentStatus::Draft,
            created_at,
            last_saved_at: None,
            is_dirty: true,
            is_saved: false,
            stages: stage_ids.iter().map(|id| StageEntry::not_started(*id)).collect(),
            stage_data: StageData::default(),
            job_references: Vec::new(),
            revision: 0,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
        self.revision += 1;
    }

    /// Never saved and not yet known to the document store.
    pub fn is_brand_new(&self) -> bool {
        !self.is_saved && self.document_id.is_none() && self.last_saved_at.is_none()
    }

    pub fn has_default_title(&self) -> bool {
        self.title.trim().is_empty() || self.title == self.default_title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.mark_dirty();
    }

    pub fn stage_status(&self, stage_id: &str) -> Option<StageStatus> {
        self.stages
            .iter()
            .find(|s| s.stage_id == stage_id)
            .map(|s| s.status)
    }

    /// Write `status` to both the stage array and the stageData mirror.
    pub fn set_stage_status(&mut self, stage_id: &str, status: StageStatus) {
        if let Some(entry) = self.stages.iter_mut().find(|s| s.stage_id == stage_id) {
            entry.status = status;
        }
        self.stage_data.set_mirror_status(stage_id, status);
        self.mark_dirty();
    }

    /// Set one field of a stage payload (what a stage form does on edit).
    pub fn set_stage_field(&mut self, stage_id: &str, key: impl Into<String>, value: Value) {
        self.stage_data.payload_mut(stage_id).insert(key.into(), value);
        self.mark_dirty();
    }

    /// Shallow-merge an object into a stage payload. Non-objects are ignored.
    pub fn merge_stage_payload(&mut self, stage_id: &str, patch: &Value) {
        let Some(patch) = patch.as_object() else {
            return;
        };
        let payload = self.stage_data.payload_mut(stage_id);
        for (k, v) in patch {
            payload.insert(k.clone(), v.clone());
        }
        self.mark_dirty();
    }

    /// Insert or replace a job-history entry by job id. Returns true when anything changed.
    pub fn upsert_job_history(&mut self, entry: JobHistoryEntry) -> bool {
        let history = &mut self.stage_data.job_history;
        let changed = match history.iter_mut().find(|e| e.job_id == entry.job_id) {
            Some(existing) if *existing == entry => false,
            Some(existing) => {
                *existing = entry;
                true
            }
            None => {
                history.push(entry);
                true
            }
        };
        if changed {
            self.mark_dirty();
        }
        changed
    }

    pub fn add_job_reference(&mut self, reference: JobReference) {
        if self.job_references.iter().any(|r| r.job_id == reference.job_id) {
            return;
        }
        self.job_references.push(reference);
        self.mark_dirty();
    }

    /// Mark as persisted. `is_dirty` is cleared only if nothing changed since `revision`.
    pub fn mark_saved(&mut self, document_id: String, at: DateTime<Utc>, revision: u64) {
        self.document_id = Some(document_id);
        self.last_saved_at = Some(at);
        self.is_saved = true;
        if self.revision == revision {
            self.is_dirty = false;
        }
    }

    pub(crate) fn mark_clean(&mut self) {
        self.is_dirty = false;
    }
}
