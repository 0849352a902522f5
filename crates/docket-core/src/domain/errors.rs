//! Errors - エラー型と分類
//!
//! - `Configuration`: 起動時に検出すべき致命的な設定ミス（重複 data source、stage なし）
//! - `Validation`: 境界での入力エラー（composite project id の形式不正）
//! - `NotFound` / `InternalConsistency`: data source → stage の解決失敗
//! - `Storage`: 永続化先の失敗（job store はこれを bool に落とす）

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocketError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal consistency error: {0}")]
    InternalConsistency(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DocketError {
    /// Fatal errors must be surfaced immediately and never silently recovered.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DocketError::Configuration(_))
    }
}

pub type Result<T, E = DocketError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_errors_are_fatal() {
        assert!(DocketError::Configuration("dup".into()).is_fatal());
        assert!(!DocketError::Validation("bad id".into()).is_fatal());
        assert!(!DocketError::Storage("disk".into()).is_fatal());
    }

    #[test]
    fn messages_carry_the_category() {
        let msg = DocketError::NotFound("data source 'x'".into()).to_string();
        assert!(msg.starts_with("not found"));
    }
}
