//! App - アプリケーション層
//!
//! ports と domain を組み合わせて、UI に公開する操作を実装します。
//!
//! # 主要コンポーネント
//! - **OrchestratorBuilder**: 構築とワイヤリング（起動時検証）
//! - **Orchestrator**: composition root
//! - **InstanceFactory**: DocumentTaskInstance の生成と復元
//! - **reconciler**: stage ステータスの再導出
//! - **AutoSaveScheduler**: debounce 付き自動保存
//! - **FormTable**: form module → StageFormFactory
//! - **SessionContext**: ログイン中の session

pub mod autosave;
pub mod builder;
pub mod factory;
pub mod forms;
pub mod job_event;
pub mod orchestrator;
pub mod reconciler;
pub mod session;

// 主要な型を再エクスポート
pub use self::autosave::{AutoSaveScheduler, SaveStatus, SharedInstance, is_save_eligible};
pub use self::builder::{BuildError, OrchestratorBuilder};
pub use self::factory::InstanceFactory;
pub use self::forms::{FormTable, FormTableError};
pub use self::job_event::JobEvent;
pub use self::orchestrator::{LogoutOutcome, Orchestrator};
pub use self::reconciler::{ChangeReason, ReconcileReport, StageChange, reconcile};
pub use self::session::SessionContext;
