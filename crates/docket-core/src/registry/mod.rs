//! Registry - task type のカタログ
//!
//! - **catalog**: 組み込みの task 定義
//! - **task_registry**: 検索、data source の一意性検証、data source → stage の解決

pub mod catalog;
pub mod task_registry;

pub use self::catalog::{BUILTIN_FORM_MODULES, builtin_definitions};
pub use self::task_registry::{TaskRegistry, TaskTypeSummary};
