//! Domain identifiers (strongly-typed IDs).
//!
//! ULID ベースの ID + Phantom type パターン。
//! `SessionId` と `DraftId` は同じ表現（ULID）を持つが、型としては混同できない。
//!
//! - `SessionId`: ログインごとに 1 回だけ生成され、その session の書き込みの provenance に使う
//! - `DraftId`: 新規ドキュメントのデフォルトタイトルにだけ使う短い ID
//! - `DocumentId`: document sink が最初の保存で割り当てる ID

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Number of trailing ULID characters used by [`Id::short`].
const SHORT_LEN: usize = 6;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"session-", "draft-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData で、実行時にはメモリを消費しません。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// Short lowercase form built from the random tail of the ULID.
    ///
    /// Not unique enough to identify anything; only meant for display.
    pub fn short(&self) -> String {
        let s = self.ulid.to_string();
        s[s.len() - SHORT_LEN..].to_ascii_lowercase()
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Session のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Session {}

impl IdMarker for Session {
    fn prefix() -> &'static str {
        "session-"
    }
}

/// Draft のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Draft {}

impl IdMarker for Draft {
    fn prefix() -> &'static str {
        "draft-"
    }
}

/// Document のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Document {}

impl IdMarker for Document {
    fn prefix() -> &'static str {
        "document-"
    }
}

/// Identifier of one login session (provenance of job-store writes).
pub type SessionId = Id<Session>;

/// Identifier generated for a brand-new document, used for its default title.
pub type DraftId = Id<Draft>;

/// Identifier a document sink assigns on the first write.
pub type DocumentId = Id<Document>;
