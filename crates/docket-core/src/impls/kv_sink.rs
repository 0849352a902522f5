//! KvDocumentSink - DocumentSink を KvStore 上に実装
//!
//! key: `docket.document.<documentId>`、値はインスタンスの JSON。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{DocketError, DocumentTaskInstance};
use crate::ports::{DocumentSink, IdGenerator, KvStore, SaveReceipt};

pub const DOCUMENT_KEY_PREFIX: &str = "docket.document.";

pub fn document_key(document_id: &str) -> String {
    format!("{DOCUMENT_KEY_PREFIX}{document_id}")
}

pub struct KvDocumentSink {
    kv: Arc<dyn KvStore>,
    ids: Arc<dyn IdGenerator>,
}

impl KvDocumentSink {
    pub fn new(kv: Arc<dyn KvStore>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { kv, ids }
    }

    /// Ids of every stored document.
    pub fn list_document_ids(&self) -> Result<Vec<String>, DocketError> {
        let keys = self
            .kv
            .keys_with_prefix(DOCUMENT_KEY_PREFIX)
            .map_err(|e| DocketError::Storage(e.to_string()))?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(DOCUMENT_KEY_PREFIX).map(str::to_string))
            .collect())
    }
}

#[async_trait]
impl DocumentSink for KvDocumentSink {
    async fn persist(&self, instance: &DocumentTaskInstance) -> Result<SaveReceipt, DocketError> {
        let document_id = match &instance.document_id {
            Some(id) => id.clone(),
            None => self.ids.generate_document_id().to_string(),
        };

        // The stored copy always names its own id, even on the first write.
        let mut value = serde_json::to_value(instance)?;
        if let Value::Object(map) = &mut value {
            map.insert("documentId".into(), Value::String(document_id.clone()));
        }
        let text = serde_json::to_string(&value)?;

        self.kv
            .set(&document_key(&document_id), &text)
            .map_err(|e| DocketError::Storage(e.to_string()))?;
        tracing::debug!(document_id = %document_id, bytes = text.len(), "document persisted");
        Ok(SaveReceipt { document_id })
    }

    async fn load(&self, document_id: &str) -> Result<Option<Value>, DocketError> {
        let raw = self
            .kv
            .get(&document_key(document_id))
            .map_err(|e| DocketError::Storage(e.to_string()))?;
        raw.map(|text| serde_json::from_str(&text).map_err(DocketError::from))
            .transpose()
    }
}
