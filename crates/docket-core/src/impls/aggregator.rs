//! DefaultAggregator - 表示用の集約ステータス
//!
//! 優先順位: 全 stage 完了 > RUNNING > FAILED > 一部完了 > 未着手

use crate::domain::{AggregateStatus, ItemStatus, StageStatus};
use crate::ports::StatusAggregator;

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAggregator;

impl StatusAggregator for DefaultAggregator {
    fn aggregate(&self, stages: &[StageStatus], items: &[ItemStatus]) -> AggregateStatus {
        let all_completed =
            !stages.is_empty() && stages.iter().all(|s| *s == StageStatus::Completed);
        if all_completed {
            return if items.contains(&ItemStatus::Failed) {
                AggregateStatus::CompletedWithIssues
            } else {
                AggregateStatus::Completed
            };
        }
        if stages.contains(&StageStatus::Running) {
            return AggregateStatus::Running;
        }
        if stages.contains(&StageStatus::Failed) {
            return AggregateStatus::Failed;
        }
        if stages.contains(&StageStatus::Completed) {
            return AggregateStatus::InProgress;
        }
        AggregateStatus::NotStarted
    }
}
