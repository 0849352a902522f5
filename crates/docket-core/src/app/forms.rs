//! FormTable - form module 名から StageFormFactory への対応表
//!
//! 起動時に組み立て、`OrchestratorBuilder::build` で「定義が参照する form module ⊆ 登録済み」を検証する。
//!
//! # 内部実装
//! - HashMap<String, Arc<dyn StageFormFactory>> で管理
//! - `resolve` は stage 定義ごとに StageForm を作る

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::domain::{DocketError, StageDefinition};
use crate::ports::{StageForm, StageFormFactory};
use crate::registry::TaskRegistry;

#[derive(Debug, thiserror::Error)]
pub enum FormTableError {
    #[error("Form module '{0}' is already registered")]
    AlreadyRegistered(String),
}

#[derive(Default, Clone)]
pub struct FormTable {
    factories: HashMap<String, Arc<dyn StageFormFactory>>,
}

impl FormTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn StageFormFactory>) -> Result<(), FormTableError> {
        let module = factory.form_module().to_string();
        if self.factories.contains_key(&module) {
            return Err(FormTableError::AlreadyRegistered(module));
        }
        self.factories.insert(module, factory);
        Ok(())
    }

    pub fn contains(&self, form_module: &str) -> bool {
        self.factories.contains_key(form_module)
    }

    pub fn registered_modules(&self) -> Vec<String> {
        let mut modules: Vec<String> = self.factories.keys().cloned().collect();
        modules.sort();
        modules
    }

    /// Form modules referenced by `registry` but not registered here (sorted, deduplicated).
    pub fn missing_modules(&self, registry: &TaskRegistry) -> Vec<String> {
        registry
            .list_task_types()
            .iter()
            .filter_map(|t| registry.get_definition(t.task_type.as_str()))
            .flat_map(|def| def.stages.iter())
            .map(|stage| stage.form_module.as_str())
            .filter(|module| !self.contains(module))
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn resolve(&self, stage: &StageDefinition) -> Result<Arc<dyn StageForm>, DocketError> {
        self.factories
            .get(&stage.form_module)
            .map(|factory| factory.create(stage))
            .ok_or_else(|| {
                DocketError::Configuration(format!(
                    "stage '{}' uses unregistered form module '{}'",
                    stage.stage_id, stage.form_module
                ))
            })
    }
}

impl std::fmt::Debug for FormTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormTable")
            .field("modules", &self.registered_modules())
            .finish()
    }
}
