//! Impls - ports の実装
//!
//! - **InMemoryKvStore**: 開発・テスト用
//! - **FileKvStore**: ディレクトリ上の atomic な key-value ストア（CLI 用）
//! - **KvDocumentSink**: KvStore 上の DocumentSink
//! - **GenericFormFactory / UploadFormFactory**: 組み込み form module
//! - **DefaultAggregator**: 表示用ステータスの集約

pub mod aggregator;
pub mod file_kv;
pub mod forms;
pub mod kv_sink;
pub mod memory_kv;

pub use self::aggregator::DefaultAggregator;
pub use self::file_kv::FileKvStore;
pub use self::forms::{
    GenericForm, GenericFormFactory, UploadForm, UploadFormFactory, builtin_form_factories,
};
pub use self::kv_sink::{DOCUMENT_KEY_PREFIX, KvDocumentSink, document_key};
pub use self::memory_kv::InMemoryKvStore;
