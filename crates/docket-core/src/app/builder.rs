//! OrchestratorBuilder - Orchestrator の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 設定値の検証（`DocketConfig::validate`）
//! - task 定義カタログの検証（stage あり、stage id / data source の一意性）
//! - 既定の task type がカタログに存在すること
//! - 定義が参照する form module が全て登録済みであること（期待集合 ⊆ 登録済み集合）
//!
//! 不足があれば `build()` が BuildError を返す。
//!
//! # 使用例
//! ```ignore
//! let orchestrator = OrchestratorBuilder::new()
//!     .with_config(config)
//!     .with_kv_store(Arc::new(FileKvStore::open(dir)?))
//!     .with_builtin_forms()?
//!     .build()?;
//! ```

use std::sync::{Arc, RwLock};

use super::factory::InstanceFactory;
use super::forms::{FormTable, FormTableError};
use super::orchestrator::Orchestrator;
use crate::config::DocketConfig;
use crate::domain::{DocketError, TaskType};
use crate::impls::{DefaultAggregator, InMemoryKvStore, KvDocumentSink, builtin_form_factories};
use crate::jobs::JobSessionStore;
use crate::ports::{
    Clock, DocumentSink, IdGenerator, KvStore, StageFormFactory, StatusAggregator, SystemClock,
    UlidGenerator,
};
use crate::registry::TaskRegistry;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing stage forms: {0:?}. These form modules are referenced by task definitions but not registered.")]
    MissingStageForms(Vec<String>),

    #[error("Default task type '{0}' is not in the task catalogue")]
    UnknownDefaultTaskType(String),

    #[error("Invalid task catalogue: {0}")]
    InvalidCatalogue(#[source] DocketError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[source] DocketError),

    #[error(transparent)]
    Forms(#[from] FormTableError),
}

pub struct OrchestratorBuilder {
    config: DocketConfig,
    registry: Option<TaskRegistry>,
    forms: FormTable,
    kv: Option<Arc<dyn KvStore>>,
    sink: Option<Arc<dyn DocumentSink>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    aggregator: Option<Arc<dyn StatusAggregator>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: DocketConfig::default(),
            registry: None,
            forms: FormTable::new(),
            kv: None,
            sink: None,
            clock: None,
            ids: None,
            aggregator: None,
        }
    }

    pub fn with_config(mut self, config: DocketConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the built-in catalogue.
    pub fn with_registry(mut self, registry: TaskRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn register_form(
        mut self,
        factory: Arc<dyn StageFormFactory>,
    ) -> Result<Self, FormTableError> {
        self.forms.register(factory)?;
        Ok(self)
    }

    pub fn with_builtin_forms(mut self) -> Result<Self, FormTableError> {
        for factory in builtin_form_factories() {
            self.forms.register(factory)?;
        }
        Ok(self)
    }

    pub fn with_kv_store(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Defaults to a `KvDocumentSink` over the configured key-value store.
    pub fn with_document_sink(mut self, sink: Arc<dyn DocumentSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_aggregator(mut self, aggregator: Arc<dyn StatusAggregator>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn build(self) -> Result<Orchestrator, BuildError> {
        self.config.validate().map_err(BuildError::InvalidConfig)?;

        let registry = self.registry.unwrap_or_else(TaskRegistry::builtin);
        registry
            .validate_all()
            .map_err(BuildError::InvalidCatalogue)?;
        if !registry.contains(&self.config.default_task_type) {
            return Err(BuildError::UnknownDefaultTaskType(
                self.config.default_task_type.clone(),
            ));
        }

        let missing = self.forms.missing_modules(&registry);
        if !missing.is_empty() {
            return Err(BuildError::MissingStageForms(missing));
        }

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let kv: Arc<dyn KvStore> = self.kv.unwrap_or_else(|| Arc::new(InMemoryKvStore::new()));
        let sink: Arc<dyn DocumentSink> = self
            .sink
            .unwrap_or_else(|| Arc::new(KvDocumentSink::new(Arc::clone(&kv), Arc::clone(&ids))));
        let aggregator = self
            .aggregator
            .unwrap_or_else(|| Arc::new(DefaultAggregator));

        let registry = Arc::new(registry);
        let forms = Arc::new(self.forms);
        let factory = InstanceFactory::new(
            Arc::clone(&registry),
            Arc::clone(&forms),
            Arc::clone(&ids),
            Arc::clone(&clock),
            TaskType::new(self.config.default_task_type.clone()),
            self.config.strict_task_types,
        );
        let jobs = Arc::new(JobSessionStore::new(
            kv,
            Arc::clone(&clock),
            self.config.job_store.clone(),
        ));

        tracing::debug!(
            task_types = registry.list_task_types().len(),
            form_modules = forms.registered_modules().len(),
            "orchestrator built"
        );

        Ok(Orchestrator {
            config: self.config,
            registry,
            forms,
            factory,
            jobs,
            sink,
            aggregator,
            clock,
            ids,
            session: RwLock::new(None),
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{StageDefinition, TaskDefinition};
    use crate::impls::GenericFormFactory;

    #[test]
    fn build_success() {
        let orchestrator = OrchestratorBuilder::new()
            .with_builtin_forms()
            .unwrap()
            .build();
        assert!(orchestrator.is_ok());
    }

    #[test]
    fn build_missing_stage_forms() {
        let result = OrchestratorBuilder::new()
            .register_form(Arc::new(GenericFormFactory::new("review_export")))
            .unwrap()
            .build();
        assert!(matches!(
            result,
            Err(BuildError::MissingStageForms(missing)) if missing.contains(&"question_upload".to_string())
                && !missing.contains(&"review_export".to_string())
        ));
    }

    #[test]
    fn build_rejects_duplicate_data_sources() {
        let registry = {
            let mut r = TaskRegistry::new();
            r.register(
                TaskDefinition::new(crate::config::DEFAULT_TASK_TYPE, "Broken")
                    .with_stage(StageDefinition::new("a", "A", "review_export").with_data_source("x"))
                    .with_stage(StageDefinition::new("b", "B", "review_export").with_data_source("x")),
            )
            .unwrap();
            r
        };
        let result = OrchestratorBuilder::new()
            .with_registry(registry)
            .with_builtin_forms()
            .unwrap()
            .build();
        assert!(matches!(result, Err(BuildError::InvalidCatalogue(e)) if e.is_fatal()));
    }

    #[test]
    fn build_rejects_unknown_default_task_type() {
        let config = DocketConfig {
            default_task_type: "nope".into(),
            ..DocketConfig::default()
        };
        let result = OrchestratorBuilder::new()
            .with_config(config)
            .with_builtin_forms()
            .unwrap()
            .build();
        assert!(matches!(result, Err(BuildError::UnknownDefaultTaskType(t)) if t == "nope"));
    }

    #[test]
    fn double_form_registration() {
        let result = OrchestratorBuilder::new()
            .with_builtin_forms()
            .unwrap()
            .register_form(Arc::new(GenericFormFactory::new("review_export")));
        assert!(matches!(result, Err(FormTableError::AlreadyRegistered(_))));
    }
}
