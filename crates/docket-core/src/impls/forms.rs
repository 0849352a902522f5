//! Generic stage forms.
//!
//! Every built-in `formModule` is served by the same factory type; only the initial payload
//! and the content heuristic differ per module.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::domain::StageDefinition;
use crate::domain::content::carries_user_content;
use crate::ports::{StageForm, StageFormFactory};
use crate::registry::BUILTIN_FORM_MODULES;

#[derive(Debug, Clone)]
pub struct GenericForm {
    stage_id: String,
    initial: Value,
}

impl StageForm for GenericForm {
    fn stage_id(&self) -> &str {
        &self.stage_id
    }

    fn initial_payload(&self) -> Value {
        self.initial.clone()
    }

    fn has_user_content(&self, payload: &Value) -> bool {
        carries_user_content(payload)
    }
}

#[derive(Debug, Clone)]
pub struct GenericFormFactory {
    form_module: String,
    initial: Value,
}

impl GenericFormFactory {
    pub fn new(form_module: impl Into<String>) -> Self {
        Self {
            form_module: form_module.into(),
            initial: json!({}),
        }
    }

    pub fn with_initial_payload(mut self, initial: Value) -> Self {
        self.initial = initial;
        self
    }
}

impl StageFormFactory for GenericFormFactory {
    fn form_module(&self) -> &str {
        &self.form_module
    }

    fn create(&self, stage: &StageDefinition) -> Arc<dyn StageForm> {
        Arc::new(GenericForm {
            stage_id: stage.stage_id.clone(),
            initial: self.initial.clone(),
        })
    }
}

/// Upload forms only count an actual file (or imported rows) as content; a typed
/// file name without an upload does not.
#[derive(Debug, Clone)]
pub struct UploadForm {
    stage_id: String,
}

impl StageForm for UploadForm {
    fn stage_id(&self) -> &str {
        &self.stage_id
    }

    fn initial_payload(&self) -> Value {
        json!({ "uploadedFile": null, "importSummary": null })
    }

    fn has_user_content(&self, payload: &Value) -> bool {
        ["/uploadedFile", "/importSummary", "/externalInput"]
            .iter()
            .filter_map(|p| payload.pointer(p))
            .any(carries_user_content)
            || payload
                .pointer("/importSummary/totalQuestionsImported")
                .and_then(Value::as_u64)
                .is_some_and(|n| n > 0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadFormFactory;

impl StageFormFactory for UploadFormFactory {
    fn form_module(&self) -> &str {
        "question_upload"
    }

    fn create(&self, stage: &StageDefinition) -> Arc<dyn StageForm> {
        Arc::new(UploadForm {
            stage_id: stage.stage_id.clone(),
        })
    }
}

/// One factory per built-in form module.
pub fn builtin_form_factories() -> Vec<Arc<dyn StageFormFactory>> {
    BUILTIN_FORM_MODULES
        .iter()
        .map(|module| -> Arc<dyn StageFormFactory> {
            match *module {
                "question_upload" => Arc::new(UploadFormFactory),
                "corpus_selection" => Arc::new(
                    GenericFormFactory::new(*module).with_initial_payload(json!({ "corpora": [] })),
                ),
                _ => Arc::new(GenericFormFactory::new(*module)),
            }
        })
        .collect()
}
