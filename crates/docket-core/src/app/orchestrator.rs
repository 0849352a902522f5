//! Orchestrator - UI に公開する操作の入り口
//!
//! registry / factory / job store / reconciler / auto-save を束ねる composition root。
//! 構築は `OrchestratorBuilder` 経由（起動時検証つき）。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex as AsyncMutex;

use super::autosave::AutoSaveScheduler;
use super::factory::InstanceFactory;
use super::forms::FormTable;
use super::job_event::JobEvent;
use super::reconciler::{self, ReconcileReport};
use super::session::SessionContext;
use crate::config::DocketConfig;
use crate::domain::{
    AggregateStatus, DocketError, DocumentContext, DocumentTaskInstance, ItemStatus,
    JobHistoryEntry, JobReference, JobSessionRecord, JobStatus, TaskDefinition,
};
use crate::jobs::{CleanupReport, JobSessionStore};
use crate::observability::document_span;
use crate::ports::{Clock, DocumentSink, IdGenerator, StageForm, StatusAggregator};
use crate::registry::{TaskRegistry, TaskTypeSummary};

/// What `logout` did to the job store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogoutOutcome {
    Cleaned(CleanupReport),
    Cleared,
    /// Nobody was logged in.
    NoSession,
}

pub struct Orchestrator {
    pub(crate) config: DocketConfig,
    pub(crate) registry: Arc<TaskRegistry>,
    pub(crate) forms: Arc<FormTable>,
    pub(crate) factory: InstanceFactory,
    pub(crate) jobs: Arc<JobSessionStore>,
    pub(crate) sink: Arc<dyn DocumentSink>,
    pub(crate) aggregator: Arc<dyn StatusAggregator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) session: RwLock<Option<SessionContext>>,
}

impl Orchestrator {
    pub fn config(&self) -> &DocketConfig {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// The job session store (CRUD and cleanup surface).
    pub fn jobs(&self) -> &JobSessionStore {
        &self.jobs
    }

    // ========================================
    // task types
    // ========================================

    pub fn list_task_types(&self) -> Vec<TaskTypeSummary> {
        self.registry.list_task_types()
    }

    pub fn definition(&self, task_type: &str) -> Option<&TaskDefinition> {
        self.registry.get_definition(task_type)
    }

    pub fn stage_for_data_source(
        &self,
        task_type: &str,
        data_source_name: &str,
    ) -> Result<String, DocketError> {
        self.registry
            .resolve_stage_for_data_source(task_type, data_source_name)
    }

    pub fn form_for(&self, task_type: &str, stage_id: &str) -> Result<Arc<dyn StageForm>, DocketError> {
        let def = self
            .registry
            .get_definition(task_type)
            .ok_or_else(|| DocketError::NotFound(format!("task type '{task_type}'")))?;
        let stage = def.stage(stage_id).ok_or_else(|| {
            DocketError::NotFound(format!("stage '{stage_id}' of '{task_type}'"))
        })?;
        self.forms.resolve(stage)
    }

    // ========================================
    // documents
    // ========================================

    pub fn create_new(
        &self,
        task_type: &str,
        project_id: &str,
        project_name: &str,
        owner: &str,
    ) -> Result<DocumentTaskInstance, DocketError> {
        self.factory
            .create_new(task_type, project_id, project_name, owner)
    }

    pub fn restore(&self, serialized: Value) -> Result<DocumentTaskInstance, DocketError> {
        self.factory.restore(serialized)
    }

    /// Restore a document previously written through the document sink.
    pub async fn restore_document(
        &self,
        document_id: &str,
    ) -> Result<DocumentTaskInstance, DocketError> {
        let stored = self
            .sink
            .load(document_id)
            .await?
            .ok_or_else(|| DocketError::NotFound(format!("document '{document_id}'")))?;
        self.factory.restore(stored)
    }

    /// Reconcile and hand the instance to a fresh auto-save scheduler.
    pub fn open(&self, mut instance: DocumentTaskInstance) -> AutoSaveScheduler {
        self.reconcile(&mut instance);
        let forms: Vec<Arc<dyn StageForm>> = self
            .registry
            .get_definition(instance.task_type.as_str())
            .map(|def| {
                def.stages
                    .iter()
                    .filter_map(|stage| self.forms.resolve(stage).ok())
                    .collect()
            })
            .unwrap_or_default();

        AutoSaveScheduler::new(
            Arc::new(AsyncMutex::new(instance)),
            Arc::clone(&self.sink),
            forms,
            Arc::clone(&self.clock),
            self.config.auto_save.debounce(),
        )
    }

    // ========================================
    // reconciliation
    // ========================================

    /// Refresh job history from the job store, then re-derive every stage's status.
    ///
    /// Never fails; an instance whose task type is no longer registered is left untouched.
    pub fn reconcile(&self, instance: &mut DocumentTaskInstance) -> ReconcileReport {
        let span = document_span("reconcile", &instance.project_id, instance.task_type.as_str());
        let _guard = span.enter();

        let Some(def) = self.registry.get_definition(instance.task_type.as_str()) else {
            tracing::warn!("task type not registered; reconciliation skipped");
            return ReconcileReport::default();
        };
        let synced = self.sync_job_history(instance);
        if synced > 0 {
            tracing::debug!(synced, "job history refreshed from job store");
        }
        reconciler::reconcile(instance, def)
    }

    /// Bring `stageData.jobHistory` in line with the job store. Returns the number of
    /// entries added or updated.
    pub fn sync_job_history(&self, instance: &mut DocumentTaskInstance) -> usize {
        let live: HashMap<String, JobSessionRecord> = self
            .jobs
            .list_all()
            .into_iter()
            .map(|r| (r.job_id.clone(), r))
            .collect();

        let mut changed = 0;
        let known: Vec<JobHistoryEntry> = instance.stage_data.job_history.clone();
        for entry in known {
            let Some(record) = live.get(&entry.job_id) else {
                continue;
            };
            if entry.status == JobStatus::Completed && record.status != JobStatus::Completed {
                continue;
            }
            let mut updated = entry.clone();
            updated.status = record.status;
            updated.updated_at = Some(record.last_updated);
            if updated.result.is_none() {
                updated.result = record.meta.get("result").cloned();
            }
            if updated.status != entry.status || updated.result != entry.result {
                instance.upsert_job_history(updated);
                changed += 1;
            }
        }

        let project_id = instance.project_id.clone();
        let document_id = instance.document_id.clone();
        let draft_id = instance.draft_id.clone();
        let task_type = instance.task_type.as_str().to_string();
        let mut missing: Vec<&JobSessionRecord> = live
            .values()
            .filter(|r| {
                r.document_context
                    .as_ref()
                    .is_some_and(|c| c.refers_to(
                    &project_id,
                    document_id.as_deref(),
                    draft_id.as_deref(),
                    &task_type,
                ))
            })
            .filter(|r| {
                !instance
                    .stage_data
                    .job_history
                    .iter()
                    .any(|e| e.job_id == r.job_id)
            })
            .collect();
        missing.sort_by_key(|r| (r.start_time, r.job_id.clone()));

        for record in missing {
            let Some(stage_id) = record.stage_id() else {
                continue;
            };
            let mut entry = JobHistoryEntry::new(&record.job_id, &record.job_type, record.status)
                .for_stage(stage_id);
            entry.metadata = record.meta.clone();
            entry.started_at = Some(record.start_time);
            entry.updated_at = Some(record.last_updated);
            entry.result = record.meta.get("result").cloned();
            instance.upsert_job_history(entry);
            changed += 1;
        }
        changed
    }

    /// Display status of the whole document.
    pub fn aggregate_status(&self, instance: &DocumentTaskInstance) -> AggregateStatus {
        let doc_jobs = self.jobs.find_by_document(
            &instance.project_id,
            instance.document_id.as_deref(),
            instance.draft_id.as_deref(),
            instance.task_type.as_str(),
        );
        if doc_jobs.iter().any(|r| r.status == JobStatus::Running) {
            return AggregateStatus::Running;
        }
        let stages: Vec<_> = instance.stages.iter().map(|s| s.status).collect();
        let items: Vec<ItemStatus> = doc_jobs
            .iter()
            .flat_map(|r| r.processing_items.iter().map(|i| i.status))
            .collect();
        self.aggregator.aggregate(&stages, &items)
    }

    // ========================================
    // job events
    // ========================================

    /// Apply one job callback: job store first, then the instance, then reconcile.
    pub fn record_job_event(
        &self,
        instance: &mut DocumentTaskInstance,
        event: JobEvent,
    ) -> Result<ReconcileReport, DocketError> {
        let task_type = instance.task_type.as_str().to_string();
        let stage_id = match (&event.stage_id, &event.data_source) {
            (Some(stage_id), _) => stage_id.clone(),
            (None, Some(source)) => self
                .registry
                .resolve_stage_for_data_source(&task_type, source)?,
            (None, None) => {
                return Err(DocketError::Validation(format!(
                    "job event '{}' names neither a stage nor a data source",
                    event.job_id
                )));
            }
        };
        let def = self
            .registry
            .get_definition(&task_type)
            .ok_or_else(|| DocketError::NotFound(format!("task type '{task_type}'")))?;
        if def.stage(&stage_id).is_none() {
            return Err(DocketError::NotFound(format!(
                "stage '{stage_id}' of '{task_type}'"
            )));
        }

        self.store_job_event(instance, &stage_id, &event);

        let now_ms = self.clock.now_ms();
        let previous = instance
            .stage_data
            .job_history
            .iter()
            .find(|e| e.job_id == event.job_id)
            .cloned();
        match previous {
            Some(prev)
                if prev.status == JobStatus::Completed && event.status != JobStatus::Completed =>
            {
                tracing::debug!(
                    job_id = %event.job_id,
                    ignored = %event.status,
                    "late event for a completed job; history entry kept"
                );
            }
            previous => {
                let mut entry = JobHistoryEntry::new(&event.job_id, &event.job_type, event.status)
                    .for_stage(&stage_id);
                entry.metadata = event.meta.clone();
                entry.started_at = previous.as_ref().and_then(|p| p.started_at).or(Some(now_ms));
                entry.updated_at = Some(now_ms);
                entry.result = event
                    .result
                    .clone()
                    .or_else(|| previous.and_then(|p| p.result));
                instance.upsert_job_history(entry);
            }
        }
        instance.add_job_reference(JobReference {
            job_id: event.job_id.clone(),
            job_type: event.job_type.clone(),
            stage_id: Some(stage_id.clone()),
        });

        if event.status == JobStatus::Completed
            && let Some(result @ Value::Object(_)) = &event.result
        {
            instance.merge_stage_payload(&stage_id, result);
        }

        Ok(self.reconcile(instance))
    }

    /// Job store side of a callback. Failures are logged by the store, never raised.
    fn store_job_event(&self, instance: &DocumentTaskInstance, stage_id: &str, event: &JobEvent) {
        let context = DocumentContext {
            project_id: Some(instance.project_id.clone()),
            document_id: instance.document_id.clone(),
            draft_id: instance.draft_id.clone(),
            task_type: Some(instance.task_type.as_str().to_string()),
            stage_id: Some(stage_id.to_string()),
            title: Some(instance.title.clone()).filter(|t| !t.is_empty()),
            extra: Map::new(),
        };
        let mut patch = json!({ "documentContext": context });
        if !event.job_type.is_empty() {
            patch["jobType"] = Value::String(event.job_type.clone());
        }
        if let Some(progress) = event.progress {
            patch["progress"] = json!(progress);
        }

        let mut meta = event.meta.clone();
        if let Some(result) = &event.result {
            meta.insert("result".into(), result.clone());
        }
        if let Some(error) = &event.error {
            meta.insert("error".into(), Value::String(error.clone()));
        }

        if !self.jobs.save(&event.job_id, patch) {
            return;
        }
        self.jobs
            .update_status(&event.job_id, event.status, Some(&Value::Object(meta)));
        for item in &event.items {
            self.jobs.record_item(&event.job_id, item.clone());
        }
    }

    // ========================================
    // sessions
    // ========================================

    pub fn login(&self, username: &str) -> SessionContext {
        let context = SessionContext::new(self.ids.generate_session_id(), username, self.clock.now());
        self.jobs.set_session(Some(context.session_id));
        tracing::info!(username, session_id = %context.session_id, "session started");
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(context.clone());
        context
    }

    pub fn session(&self) -> Option<SessionContext> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// End the session and tidy the job store (cleanup, or a full wipe when configured).
    pub fn logout(&self) -> LogoutOutcome {
        let ended = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(ended) = ended else {
            return LogoutOutcome::NoSession;
        };

        let outcome = if self.config.job_store.clear_on_logout {
            self.jobs.clear();
            LogoutOutcome::Cleared
        } else {
            LogoutOutcome::Cleaned(self.jobs.cleanup())
        };
        self.jobs.set_session(None);
        tracing::info!(username = %ended.username, ?outcome, "session ended");
        outcome
    }
}
