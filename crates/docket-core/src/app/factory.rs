//! InstanceFactory - DocumentTaskInstance の生成と復元
//!
//! - `create_new`: composite project id を検証し、全 stage NOT_STARTED の新規インスタンスを作る
//! - `restore`: 保存済み JSON から復元し、stage 配列を現在の定義に揃える
//!
//! 未知の task type は既定の task type にフォールバック（strict モードではエラー）。

use std::sync::Arc;

use serde_json::Value;

use super::forms::FormTable;
use crate::domain::{
    CompositeProjectId, DocketError, DocumentTaskInstance, StageEntry, StageStatus,
    TaskDefinition, TaskType,
};
use crate::ports::{Clock, IdGenerator};
use crate::registry::TaskRegistry;

pub struct InstanceFactory {
    registry: Arc<TaskRegistry>,
    forms: Arc<FormTable>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    default_task_type: TaskType,
    strict: bool,
}

impl InstanceFactory {
    pub fn new(
        registry: Arc<TaskRegistry>,
        forms: Arc<FormTable>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        default_task_type: TaskType,
        strict: bool,
    ) -> Self {
        Self {
            registry,
            forms,
            ids,
            clock,
            default_task_type,
            strict,
        }
    }

    /// Definition for `requested`, or the default one when unknown (unless strict).
    pub fn resolve_definition(&self, requested: &str) -> Result<&TaskDefinition, DocketError> {
        if let Some(def) = self.registry.get_definition(requested) {
            return Ok(def);
        }
        if self.strict {
            return Err(DocketError::Configuration(format!(
                "unknown task type '{requested}'"
            )));
        }
        tracing::warn!(
            requested,
            fallback = %self.default_task_type,
            "unknown task type; falling back to the default"
        );
        self.registry
            .get_definition(self.default_task_type.as_str())
            .ok_or_else(|| {
                DocketError::Configuration(format!(
                    "default task type '{}' is not registered",
                    self.default_task_type
                ))
            })
    }

    pub fn create_new(
        &self,
        task_type: &str,
        project_id: &str,
        project_name: &str,
        owner: &str,
    ) -> Result<DocumentTaskInstance, DocketError> {
        let composite = CompositeProjectId::parse(project_id)?;
        let def = self.resolve_definition(task_type)?;
        require_stages(def)?;

        let stage_ids: Vec<&str> = def.stage_ids().collect();
        let mut instance = DocumentTaskInstance::blank(
            def.task_type.clone(),
            composite.to_string(),
            self.clock.now(),
            &stage_ids,
        );
        instance.account_id = Some(composite.account_id().to_string());
        instance.base_project_id = Some(composite.project_id().to_string());
        instance.project_name = project_name.to_string();
        instance.owner = owner.to_string();

        let draft = self.ids.generate_draft_id().short();
        instance.default_title = format!("{} {}", def.display_label, draft);
        instance.title = instance.default_title.clone();
        instance.draft_id = Some(draft);

        for stage in &def.stages {
            let initial = self.forms.resolve(stage)?.initial_payload();
            if let Value::Object(fields) = initial {
                instance
                    .stage_data
                    .payload_mut(&stage.stage_id)
                    .extend(fields);
            }
        }

        tracing::debug!(
            task_type = %instance.task_type,
            project_id = %instance.project_id,
            stages = stage_ids.len(),
            "document instance created"
        );
        Ok(instance)
    }

    pub fn restore(&self, serialized: Value) -> Result<DocumentTaskInstance, DocketError> {
        let mut instance: DocumentTaskInstance = serde_json::from_value(serialized)?;

        let def = self.resolve_definition(instance.task_type.as_str())?;
        require_stages(def)?;
        instance.task_type = def.task_type.clone();

        if instance.account_id.is_none() || instance.base_project_id.is_none() {
            match CompositeProjectId::parse(&instance.project_id) {
                Ok(composite) => {
                    instance
                        .account_id
                        .get_or_insert_with(|| composite.account_id().to_string());
                    instance
                        .base_project_id
                        .get_or_insert_with(|| composite.project_id().to_string());
                }
                Err(err) => {
                    tracing::warn!(
                        project_id = %instance.project_id,
                        error = %err,
                        "restored document has a malformed project id"
                    );
                }
            }
        }

        align_stages(&mut instance, def);
        instance.mark_clean();
        Ok(instance)
    }
}

fn require_stages(def: &TaskDefinition) -> Result<(), DocketError> {
    if def.stages.is_empty() {
        return Err(DocketError::Configuration(format!(
            "task type '{}' declares no stages",
            def.task_type
        )));
    }
    Ok(())
}

/// Reorder the stage array to follow the definition, keeping recorded statuses.
fn align_stages(instance: &mut DocumentTaskInstance, def: &TaskDefinition) {
    let recorded = std::mem::take(&mut instance.stages);
    let dropped = recorded
        .iter()
        .filter(|e| def.stage(&e.stage_id).is_none())
        .count();

    let mut appended = 0;
    instance.stages = def
        .stages
        .iter()
        .map(|stage| {
            let status = recorded
                .iter()
                .find(|e| e.stage_id == stage.stage_id)
                .map(|e| e.status)
                .unwrap_or_else(|| {
                    appended += 1;
                    StageStatus::NotStarted
                });
            StageEntry {
                stage_id: stage.stage_id.clone(),
                status,
            }
        })
        .collect();

    if dropped > 0 || appended > 0 {
        tracing::info!(
            task_type = %def.task_type,
            dropped,
            appended,
            "restored stage array aligned with current definition"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TASK_TYPE;
    use crate::impls::builtin_form_factories;
    use crate::ports::{FixedClock, UlidGenerator};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn factory(strict: bool) -> InstanceFactory {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
        ));
        let mut forms = FormTable::new();
        for f in builtin_form_factories() {
            forms.register(f).unwrap();
        }
        InstanceFactory::new(
            Arc::new(TaskRegistry::builtin()),
            Arc::new(forms),
            Arc::new(UlidGenerator::new(clock.clone())),
            clock,
            TaskType::new(DEFAULT_TASK_TYPE),
            strict,
        )
    }

    #[test]
    fn create_new_initializes_every_stage() {
        let inst = factory(false)
            .create_new(DEFAULT_TASK_TYPE, "acct1#proj1", "Proj One", "alice")
            .unwrap();

        assert_eq!(inst.account_id.as_deref(), Some("acct1"));
        assert_eq!(inst.base_project_id.as_deref(), Some("proj1"));
        assert!(inst.is_dirty);
        assert!(inst.is_brand_new());
        assert!(inst.has_default_title());
        assert_eq!(inst.stages.len(), 4);
        assert!(inst.stages.iter().all(|s| s.status == StageStatus::NotStarted));

        let draft = inst.draft_id.clone().unwrap();
        assert!(inst.title.ends_with(&draft));
    }

    #[test]
    fn malformed_project_id_is_a_validation_error() {
        for bad in ["proj1", "#proj1", "acct1#", "  #  "] {
            let err = factory(false)
                .create_new(DEFAULT_TASK_TYPE, bad, "p", "o")
                .unwrap_err();
            assert!(matches!(err, DocketError::Validation(_)), "{bad}");
        }
    }

    #[test]
    fn unknown_task_type_falls_back_unless_strict() {
        let inst = factory(false)
            .create_new("no_such_type", "a#p", "p", "o")
            .unwrap();
        assert_eq!(inst.task_type.as_str(), DEFAULT_TASK_TYPE);

        let err = factory(true)
            .create_new("no_such_type", "a#p", "p", "o")
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn restore_rederives_project_parts_and_aligns_stages() {
        let stored = json!({
            "taskType": "rfp_question_list",
            "projectId": "acct9#proj9",
            "title": "Q3 RFP",
            "isDirty": true,
            "stages": [
                {"stageId": "generate_answers", "status": "RUNNING"},
                {"stageId": "retired_stage", "status": "COMPLETED"}
            ],
            "stageData": {"generate_answers": {"status": "RUNNING"}}
        });

        let inst = factory(false).restore(stored).unwrap();
        assert_eq!(inst.account_id.as_deref(), Some("acct9"));
        assert_eq!(inst.base_project_id.as_deref(), Some("proj9"));
        assert!(!inst.is_dirty);

        let stages: Vec<_> = inst
            .stages
            .iter()
            .map(|s| (s.stage_id.as_str(), s.status))
            .collect();
        assert_eq!(
            stages,
            [
                ("upload_questions", StageStatus::NotStarted),
                ("generate_answers", StageStatus::Running),
            ]
        );
    }

    #[test]
    fn restore_with_unknown_task_type_uses_default() {
        let inst = factory(false)
            .restore(json!({"taskType": "gone", "projectId": "a#p"}))
            .unwrap();
        assert_eq!(inst.task_type.as_str(), DEFAULT_TASK_TYPE);
        assert_eq!(inst.stages.len(), 4);
    }

    #[test]
    fn restore_rejects_non_document_json() {
        let err = factory(false).restore(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, DocketError::Serialization(_)));
    }
}
