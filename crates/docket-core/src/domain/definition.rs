//! Task and stage definitions (the static topology documents follow).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::task::TaskType;

/// One task type: an ordered list of stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub task_type: TaskType,
    pub display_label: String,
    pub stages: Vec<StageDefinition>,
}

impl TaskDefinition {
    pub fn new(task_type: impl Into<TaskType>, display_label: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            display_label: display_label.into(),
            stages: Vec::new(),
        }
    }

    pub fn with_stage(mut self, stage: StageDefinition) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stage(&self, stage_id: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.stage_id == stage_id)
    }

    pub fn stage_ids(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.stage_id.as_str())
    }
}

/// One step of a document workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDefinition {
    pub stage_id: String,
    pub stage_name: String,

    /// Reference into the stage-form table (resolved at startup).
    pub form_module: String,

    /// Data-source tag jobs and imports use to address this stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source_name: Option<String>,

    /// Content-based rule that marks the stage complete regardless of job state.
    #[serde(default)]
    pub completion: CompletionRule,
}

impl StageDefinition {
    pub fn new(
        stage_id: impl Into<String>,
        stage_name: impl Into<String>,
        form_module: impl Into<String>,
    ) -> Self {
        Self {
            stage_id: stage_id.into(),
            stage_name: stage_name.into(),
            form_module: form_module.into(),
            data_source_name: None,
            completion: CompletionRule::None,
        }
    }

    pub fn with_data_source(mut self, name: impl Into<String>) -> Self {
        self.data_source_name = Some(name.into());
        self
    }

    pub fn with_completion(mut self, rule: CompletionRule) -> Self {
        self.completion = rule;
        self
    }
}

/// Declarative dynamic-completion predicate.
///
/// `pointer` is an RFC 6901 JSON pointer evaluated against a stage payload or a job result,
/// e.g. `/importSummary/totalQuestionsImported`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompletionRule {
    #[default]
    None,

    /// Value exists and is a non-blank string, a non-empty array/object, `true`, or a
    /// non-zero number.
    NonEmpty { pointer: String },

    /// Value is a number `>= min`, or an array with at least `min` elements.
    MinCount { pointer: String, min: u64 },
}

impl CompletionRule {
    pub fn is_none(&self) -> bool {
        matches!(self, CompletionRule::None)
    }

    /// Evaluate against one JSON document.
    pub fn is_satisfied_by(&self, doc: &Value) -> bool {
        match self {
            CompletionRule::None => false,
            CompletionRule::NonEmpty { pointer } => match doc.pointer(pointer) {
                Some(Value::String(s)) => !s.trim().is_empty(),
                Some(Value::Array(a)) => !a.is_empty(),
                Some(Value::Object(o)) => !o.is_empty(),
                Some(Value::Bool(b)) => *b,
                Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
                Some(Value::Null) | None => false,
            },
            CompletionRule::MinCount { pointer, min } => match doc.pointer(pointer) {
                Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v >= *min as f64),
                Some(Value::Array(a)) => a.len() as u64 >= *min,
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn imported_at_least_one() -> CompletionRule {
        CompletionRule::MinCount {
            pointer: "/importSummary/totalQuestionsImported".into(),
            min: 1,
        }
    }

    #[rstest]
    #[case::five(json!({"importSummary": {"totalQuestionsImported": 5}}), true)]
    #[case::zero(json!({"importSummary": {"totalQuestionsImported": 0}}), false)]
    #[case::missing(json!({"importSummary": {}}), false)]
    #[case::string(json!({"importSummary": {"totalQuestionsImported": "5"}}), false)]
    fn min_count_on_numbers(#[case] doc: Value, #[case] expected: bool) {
        assert_eq!(imported_at_least_one().is_satisfied_by(&doc), expected);
    }

    #[test]
    fn min_count_on_arrays() {
        let rule = CompletionRule::MinCount {
            pointer: "/questions".into(),
            min: 2,
        };
        assert!(rule.is_satisfied_by(&json!({"questions": [1, 2]})));
        assert!(!rule.is_satisfied_by(&json!({"questions": [1]})));
    }

    #[rstest]
    #[case::blank_string(json!({"answer": "   "}), false)]
    #[case::string(json!({"answer": "yes"}), true)]
    #[case::empty_array(json!({"answer": []}), false)]
    #[case::null(json!({"answer": null}), false)]
    #[case::object(json!({"answer": {"a": 1}}), true)]
    fn non_empty(#[case] doc: Value, #[case] expected: bool) {
        let rule = CompletionRule::NonEmpty {
            pointer: "/answer".into(),
        };
        assert_eq!(rule.is_satisfied_by(&doc), expected);
    }

    #[test]
    fn none_never_fires() {
        assert!(!CompletionRule::None.is_satisfied_by(&json!({"anything": true})));
    }

    #[test]
    fn completion_rule_is_tagged() {
        let v = serde_json::to_value(imported_at_least_one()).unwrap();
        assert_eq!(v["kind"], "min_count");
        assert_eq!(v["min"], 1);

        let stage: StageDefinition = serde_json::from_value(json!({
            "stageId": "s1",
            "stageName": "Upload",
            "formModule": "upload"
        }))
        .unwrap();
        assert!(stage.completion.is_none());
        assert_eq!(stage.data_source_name, None);
    }
}
