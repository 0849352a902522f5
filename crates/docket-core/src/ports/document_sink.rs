//! DocumentSink port - 外部のドキュメント保存先
//!
//! Auto-save の書き込み先。保存の仕組み自体（アーカイブ、タブ管理）はこの core の外側。

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{DocketError, DocumentTaskInstance};

/// What a successful write hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReceipt {
    pub document_id: String,
}

#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Persist a snapshot. Assigns a document id on the first write.
    async fn persist(&self, instance: &DocumentTaskInstance) -> Result<SaveReceipt, DocketError>;

    /// Serialized form of a previously persisted document, for `restore`.
    async fn load(&self, document_id: &str) -> Result<Option<Value>, DocketError>;
}
