//! JobEvent - status/progress callback from the job execution service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{JobStatus, ProcessingItem};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    #[serde(alias = "id")]
    pub job_id: String,

    #[serde(default, alias = "type")]
    pub job_type: String,

    pub status: JobStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,

    /// Target stage. When absent, `data_source` is resolved through the registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,

    /// Output of a finished job. Objects are merged into the stage payload on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ProcessingItem>,
}

impl JobEvent {
    pub fn new(job_id: impl Into<String>, job_type: impl Into<String>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            job_type: job_type.into(),
            status,
            progress: None,
            stage_id: None,
            data_source: None,
            result: None,
            meta: Map::new(),
            error: None,
            items: Vec::new(),
        }
    }

    pub fn for_stage(mut self, stage_id: impl Into<String>) -> Self {
        self.stage_id = Some(stage_id.into());
        self
    }

    pub fn from_data_source(mut self, name: impl Into<String>) -> Self {
        self.data_source = Some(name.into());
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_callback_payload() {
        let event: JobEvent = serde_json::from_value(json!({
            "id": "job-7",
            "type": "question_import",
            "status": "SUCCESS",
            "dataSource": "question_import",
            "result": {"importSummary": {"totalQuestionsImported": 5}}
        }))
        .unwrap();
        assert_eq!(event.job_id, "job-7");
        assert_eq!(event.status, JobStatus::Completed);
        assert_eq!(event.data_source.as_deref(), Some("question_import"));
        assert!(event.items.is_empty());
    }
}
