//! docket-core
//!
//! Core building blocks for multi-stage document workflows driven by asynchronous jobs.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, status, definition, instance, job, errors）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, KvStore, DocumentSink, StageForm, StatusAggregator）
//! - **registry**: task 定義のカタログ
//! - **jobs**: Job Session Store（正規化、migration、eviction）
//! - **app**: アプリケーションロジック（builder, orchestrator, reconciler, autosave）
//! - **impls**: 実装（InMemoryKvStore, FileKvStore, KvDocumentSink, 組み込みフォーム）
//! - **config**: 実行時設定
//! - **observability**: ログ初期化と集計ビュー

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod jobs;
pub mod observability;
pub mod ports;
pub mod registry;

pub use app::{JobEvent, Orchestrator, OrchestratorBuilder};
pub use config::DocketConfig;
pub use domain::{DocketError, Result};
