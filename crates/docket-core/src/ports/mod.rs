//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部の協力者（key-value ストア、ドキュメント保存先、フォーム、時刻）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod aggregator;
pub mod clock;
pub mod document_sink;
pub mod id_generator;
pub mod kv_store;
pub mod stage_form;

pub use self::aggregator::StatusAggregator;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::document_sink::{DocumentSink, SaveReceipt};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::kv_store::{KvError, KvStore};
pub use self::stage_form::{StageForm, StageFormFactory};
