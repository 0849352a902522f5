//! SessionContext - ログイン中のユーザーと session ID
//!
//! グローバルな singleton の代わりに、`Orchestrator::login` が明示的に作る。
//! session ID は job store の書き込みの provenance にだけ使われる。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::SessionId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub session_id: SessionId,
    pub username: String,
    pub logged_in_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(session_id: SessionId, username: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            username: username.into(),
            logged_in_at: at,
        }
    }
}
