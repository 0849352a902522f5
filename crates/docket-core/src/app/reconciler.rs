//! Stage Status Reconciler
//!
//! 各 stage のステータスを、証拠（completion rule と job history）から決め直す純粋関数。
//!
//! # 優先順位
//! 1. completion rule が満たされている → COMPLETED
//! 2. stage に紐づく job がない → 証拠なし
//! 3. COMPLETED > RUNNING > FAILED（それ以外は証拠なし）
//!
//! 証拠なしの stage は NOT_STARTED に戻す。終了後は stage 配列と stageData の
//! status が必ず一致する。例外は投げない。

use serde::Serialize;

use crate::domain::{
    CompletionRule, DocumentTaskInstance, JobHistoryEntry, JobStatus, StageStatus,
    TaskDefinition,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// The stage's completion rule matched its payload or a job result.
    CompletionRule,
    /// Derived from the statuses of the stage's jobs.
    JobEvidence,
    /// No evidence at all; reset to NOT_STARTED.
    NoEvidence,
    /// Status was right but the stageData mirror disagreed.
    MirrorRepaired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageChange {
    pub stage_id: String,
    pub from: StageStatus,
    pub to: StageStatus,
    pub reason: ChangeReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub changes: Vec<StageChange>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn change_for(&self, stage_id: &str) -> Option<&StageChange> {
        self.changes.iter().find(|c| c.stage_id == stage_id)
    }
}

/// Evidence-derived status for one stage. `None` means no evidence.
pub fn stage_evidence(
    instance: &DocumentTaskInstance,
    stage_id: &str,
    rule: &CompletionRule,
) -> Option<(StageStatus, ChangeReason)> {
    let jobs: Vec<&JobHistoryEntry> = instance.stage_data.jobs_for_stage(stage_id).collect();

    let payload_satisfies = instance
        .stage_data
        .payload(stage_id)
        .is_some_and(|p| rule.is_satisfied_by(p));
    let result_satisfies = jobs
        .iter()
        .filter_map(|j| j.result.as_ref())
        .any(|r| rule.is_satisfied_by(r));
    if payload_satisfies || result_satisfies {
        return Some((StageStatus::Completed, ChangeReason::CompletionRule));
    }

    let has = |status: JobStatus| jobs.iter().any(|j| j.status == status);
    let derived = if has(JobStatus::Completed) {
        StageStatus::Completed
    } else if has(JobStatus::Running) {
        StageStatus::Running
    } else if has(JobStatus::Failed) {
        StageStatus::Failed
    } else {
        return None;
    };
    Some((derived, ChangeReason::JobEvidence))
}

/// Re-derive every stage's status and converge both status representations.
pub fn reconcile(
    instance: &mut DocumentTaskInstance,
    definition: &TaskDefinition,
) -> ReconcileReport {
    let none = CompletionRule::None;
    let mut report = ReconcileReport::default();

    let stage_ids: Vec<String> = instance.stages.iter().map(|s| s.stage_id.clone()).collect();
    for stage_id in stage_ids {
        let rule = definition
            .stage(&stage_id)
            .map_or(&none, |stage| &stage.completion);

        let recorded = instance.stage_status(&stage_id).unwrap_or_default();
        let mirror = instance.stage_data.mirror_status(&stage_id);

        let (target, reason) = stage_evidence(instance, &stage_id, rule)
            .unwrap_or((StageStatus::NotStarted, ChangeReason::NoEvidence));

        if recorded == target && mirror == Some(target) {
            continue;
        }
        let reason = if recorded == target {
            ChangeReason::MirrorRepaired
        } else {
            reason
        };

        instance.set_stage_status(&stage_id, target);
        tracing::info!(
            stage_id = %stage_id,
            from = %recorded,
            to = %target,
            ?reason,
            "stage status reconciled"
        );
        report.changes.push(StageChange {
            stage_id,
            from: recorded,
            to: target,
            reason,
        });
    }
    report
}
