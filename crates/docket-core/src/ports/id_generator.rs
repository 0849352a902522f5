//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{DocumentId, DraftId, SessionId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は session / draft の ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数スレッドから使える）
pub trait IdGenerator: Send + Sync {
    /// Session ID を生成（ログインごとに 1 回）
    fn generate_session_id(&self) -> SessionId;

    /// Draft ID を生成（新規ドキュメントのデフォルトタイトル用）
    fn generate_draft_id(&self) -> DraftId;

    /// Document ID を生成（document sink の最初の保存時）
    fn generate_document_id(&self) -> DocumentId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now_ms().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_session_id(&self) -> SessionId {
        SessionId::from(self.next_ulid())
    }

    fn generate_draft_id(&self) -> DraftId {
        DraftId::from(self.next_ulid())
    }

    fn generate_document_id(&self) -> DocumentId {
        DocumentId::from(self.next_ulid())
    }
}
