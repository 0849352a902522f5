//! StatusAggregator port - ドキュメント全体の表示用ステータス
//!
//! 実行中の document-scoped job があれば常に RUNNING（orchestrator 側で判定）。
//! それ以外の場合の集約ルールは外部から差し替えられる。

use crate::domain::{AggregateStatus, ItemStatus, StageStatus};

pub trait StatusAggregator: Send + Sync {
    fn aggregate(&self, stages: &[StageStatus], items: &[ItemStatus]) -> AggregateStatus;
}
