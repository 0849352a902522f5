//! TaskRegistry - task type の静的カタログ
//!
//! 起動時に組み立て（mutable）、実行時は読み取りのみ（immutable）。
//! ロックは不要。

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::catalog::builtin_definitions;
use crate::domain::{DocketError, TaskDefinition, TaskType};

/// One row of `list_task_types`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTypeSummary {
    pub task_type: TaskType,
    pub display_label: String,
    pub stage_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    definitions: HashMap<TaskType, TaskDefinition>,
    /// Registration order, so listings are stable.
    order: Vec<TaskType>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in catalogue. It is validated by the unit tests below, so this cannot fail.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for def in builtin_definitions() {
            registry.insert(def);
        }
        registry
    }

    /// Build from custom definitions; every definition is validated.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = TaskDefinition>,
    ) -> Result<Self, DocketError> {
        let mut registry = Self::new();
        for def in definitions {
            registry.register(def)?;
        }
        registry.validate_all()?;
        Ok(registry)
    }

    pub fn register(&mut self, definition: TaskDefinition) -> Result<(), DocketError> {
        if self.definitions.contains_key(&definition.task_type) {
            return Err(DocketError::Configuration(format!(
                "task type '{}' is already registered",
                definition.task_type
            )));
        }
        self.insert(definition);
        Ok(())
    }

    fn insert(&mut self, definition: TaskDefinition) {
        self.order.push(definition.task_type.clone());
        self.definitions
            .insert(definition.task_type.clone(), definition);
    }

    pub fn list_task_types(&self) -> Vec<TaskTypeSummary> {
        self.order
            .iter()
            .filter_map(|t| self.definitions.get(t))
            .map(|d| TaskTypeSummary {
                task_type: d.task_type.clone(),
                display_label: d.display_label.clone(),
                stage_count: d.stages.len(),
            })
            .collect()
    }

    pub fn get_definition(&self, task_type: &str) -> Option<&TaskDefinition> {
        self.definitions.get(&TaskType::new(task_type))
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.get_definition(task_type).is_some()
    }

    fn require(&self, task_type: &str) -> Result<&TaskDefinition, DocketError> {
        self.get_definition(task_type)
            .ok_or_else(|| DocketError::NotFound(format!("task type '{task_type}'")))
    }

    /// Fails on any `dataSourceName` claimed by more than one stage.
    pub fn validate_unique_data_sources(&self, task_type: &str) -> Result<(), DocketError> {
        check_unique_data_sources(self.require(task_type)?)
    }

    /// Startup check of every definition: at least one stage, unique stage ids, unique
    /// data sources.
    pub fn validate_all(&self) -> Result<(), DocketError> {
        for task_type in &self.order {
            let def = self.require(task_type.as_str())?;
            if def.stages.is_empty() {
                return Err(DocketError::Configuration(format!(
                    "task type '{task_type}' declares no stages"
                )));
            }
            let mut seen = HashSet::new();
            for stage in &def.stages {
                if !seen.insert(stage.stage_id.as_str()) {
                    return Err(DocketError::Configuration(format!(
                        "task type '{task_type}' declares stage '{}' twice",
                        stage.stage_id
                    )));
                }
            }
            check_unique_data_sources(def)?;
        }
        Ok(())
    }

    /// The one stage that claims `data_source_name`.
    ///
    /// Re-validates first so drift in the definition fails fast here rather than
    /// mis-routing data.
    pub fn resolve_stage_for_data_source(
        &self,
        task_type: &str,
        data_source_name: &str,
    ) -> Result<String, DocketError> {
        self.validate_unique_data_sources(task_type)?;
        let def = self.require(task_type)?;

        let claims: Vec<&str> = def
            .stages
            .iter()
            .filter(|s| s.data_source_name.as_deref() == Some(data_source_name))
            .map(|s| s.stage_id.as_str())
            .collect();

        match claims.as_slice() {
            [stage_id] => Ok((*stage_id).to_string()),
            [] => Err(DocketError::NotFound(format!(
                "no stage of '{task_type}' claims data source '{data_source_name}'"
            ))),
            many => Err(DocketError::InternalConsistency(format!(
                "data source '{data_source_name}' of '{task_type}' resolves to {} stages: {}",
                many.len(),
                many.join(", ")
            ))),
        }
    }
}

fn check_unique_data_sources(def: &TaskDefinition) -> Result<(), DocketError> {
    let mut seen = HashSet::new();
    for name in def.stages.iter().filter_map(|s| s.data_source_name.as_deref()) {
        if !seen.insert(name) {
            return Err(DocketError::Configuration(format!(
                "task type '{}' uses data source '{name}' on more than one stage",
                def.task_type
            )));
        }
    }
    Ok(())
}
