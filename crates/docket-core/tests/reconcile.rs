//! Stage reconciliation through the orchestrator: evidence, idempotence, cross-tab convergence.

mod common;

use common::{PROJECT, TASK, harness, harness_on};
use docket_core::DocketConfig;
use docket_core::app::ChangeReason;
use docket_core::domain::{AggregateStatus, JobStatus, StageStatus};
use docket_core::JobEvent;
use pretty_assertions::assert_eq;
use serde_json::json;

const ANSWERS: &str = "generate_answers";

#[test]
fn reconcile_is_idempotent() {
    let h = harness();
    let mut inst = h
        .orchestrator
        .create_new(TASK, PROJECT, "Project One", "alice")
        .unwrap();

    h.orchestrator.reconcile(&mut inst);
    let snapshot = inst.clone();
    let second = h.orchestrator.reconcile(&mut inst);

    assert!(second.is_empty());
    assert_eq!(inst, snapshot);
}

#[test]
fn completed_dominates_running_and_failed() {
    let h = harness();
    let mut inst = h
        .orchestrator
        .create_new(TASK, PROJECT, "Project One", "alice")
        .unwrap();

    let failed = JobEvent::new("job-f", "answer_generation", JobStatus::Failed).for_stage(ANSWERS);
    h.orchestrator.record_job_event(&mut inst, failed).unwrap();
    assert_eq!(inst.stage_status(ANSWERS), Some(StageStatus::Failed));

    let running =
        JobEvent::new("job-r", "answer_generation", JobStatus::Running).for_stage(ANSWERS);
    h.orchestrator.record_job_event(&mut inst, running).unwrap();
    assert_eq!(inst.stage_status(ANSWERS), Some(StageStatus::Running));

    let done =
        JobEvent::new("job-c", "answer_generation", JobStatus::Completed).for_stage(ANSWERS);
    let report = h.orchestrator.record_job_event(&mut inst, done).unwrap();
    assert_eq!(inst.stage_status(ANSWERS), Some(StageStatus::Completed));
    assert_eq!(
        report.change_for(ANSWERS).map(|c| c.reason),
        Some(ChangeReason::JobEvidence)
    );

    // 別の job がまた RUNNING になっても COMPLETED のまま
    let rerun =
        JobEvent::new("job-r2", "answer_generation", JobStatus::Running).for_stage(ANSWERS);
    h.orchestrator.record_job_event(&mut inst, rerun).unwrap();
    assert_eq!(inst.stage_status(ANSWERS), Some(StageStatus::Completed));
}

#[test]
fn late_running_for_a_completed_job_is_ignored() {
    let h = harness();
    let mut inst = h
        .orchestrator
        .create_new(TASK, PROJECT, "Project One", "alice")
        .unwrap();

    let done = JobEvent::new("job-a", "answer_generation", JobStatus::Completed)
        .for_stage(ANSWERS)
        .with_result(json!({"answered": 12}));
    h.orchestrator.record_job_event(&mut inst, done).unwrap();
    assert_eq!(inst.stage_status(ANSWERS), Some(StageStatus::Completed));

    // 遅れて届いた同じ job の RUNNING
    let stale = JobEvent::new("job-a", "answer_generation", JobStatus::Running)
        .for_stage(ANSWERS)
        .with_progress(40.0);
    let report = h.orchestrator.record_job_event(&mut inst, stale).unwrap();

    assert_eq!(inst.stage_status(ANSWERS), Some(StageStatus::Completed));
    assert!(report.change_for(ANSWERS).is_none());
    let entry = inst
        .stage_data
        .job_history
        .iter()
        .find(|e| e.job_id == "job-a")
        .unwrap();
    assert_eq!(entry.status, JobStatus::Completed);
    assert_eq!(entry.result, Some(json!({"answered": 12})));

    let record = h.orchestrator.jobs().load("job-a").unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress, 100);

    // 別タブから読み直しても COMPLETED
    let tab_b = harness_on(h.kv.clone(), DocketConfig::default());
    let mut reloaded = tab_b
        .orchestrator
        .restore(serde_json::to_value(&inst).unwrap())
        .unwrap();
    tab_b.orchestrator.reconcile(&mut reloaded);
    assert_eq!(reloaded.stage_status(ANSWERS), Some(StageStatus::Completed));
}

#[test]
fn unsaved_sibling_documents_do_not_share_jobs() {
    let h = harness();
    let mut doc_a = h
        .orchestrator
        .create_new(TASK, PROJECT, "Project One", "alice")
        .unwrap();
    let mut doc_b = h
        .orchestrator
        .create_new(TASK, PROJECT, "Project One", "alice")
        .unwrap();
    assert_eq!(doc_a.document_id, None);
    assert_eq!(doc_b.document_id, None);
    assert_ne!(doc_a.draft_id, doc_b.draft_id);

    let running =
        JobEvent::new("job-a", "answer_generation", JobStatus::Running).for_stage(ANSWERS);
    h.orchestrator.record_job_event(&mut doc_a, running).unwrap();
    assert_eq!(doc_a.stage_status(ANSWERS), Some(StageStatus::Running));
    assert_eq!(h.orchestrator.aggregate_status(&doc_a), AggregateStatus::Running);

    let report = h.orchestrator.reconcile(&mut doc_b);

    assert!(report.change_for(ANSWERS).is_none());
    assert_eq!(doc_b.stage_status(ANSWERS), Some(StageStatus::NotStarted));
    assert!(doc_b.stage_data.job_history.is_empty());
    assert_eq!(
        h.orchestrator.aggregate_status(&doc_b),
        AggregateStatus::NotStarted
    );
}

#[test]
fn status_without_evidence_falls_back_to_not_started() {
    let h = harness();
    let mut inst = h
        .orchestrator
        .create_new(TASK, PROJECT, "Project One", "alice")
        .unwrap();
    inst.set_stage_status(ANSWERS, StageStatus::Completed);

    let report = h.orchestrator.reconcile(&mut inst);

    assert_eq!(inst.stage_status(ANSWERS), Some(StageStatus::NotStarted));
    assert_eq!(
        inst.stage_data.mirror_status(ANSWERS),
        Some(StageStatus::NotStarted)
    );
    assert_eq!(
        report.change_for(ANSWERS).map(|c| c.reason),
        Some(ChangeReason::NoEvidence)
    );
}

#[test]
fn pending_and_cancelled_jobs_are_not_evidence() {
    let h = harness();
    let mut inst = h
        .orchestrator
        .create_new(TASK, PROJECT, "Project One", "alice")
        .unwrap();

    for (id, status) in [("job-p", JobStatus::Pending), ("job-x", JobStatus::Cancelled)] {
        let event = JobEvent::new(id, "answer_generation", status).for_stage(ANSWERS);
        h.orchestrator.record_job_event(&mut inst, event).unwrap();
    }

    assert_eq!(inst.stage_status(ANSWERS), Some(StageStatus::NotStarted));
}

#[test]
fn another_tab_converges_through_the_job_store() {
    let tab_a = harness();
    let tab_b = harness_on(tab_a.kv.clone(), DocketConfig::default());

    let mut inst_a = tab_a
        .orchestrator
        .create_new(TASK, PROJECT, "Project One", "alice")
        .unwrap();
    let mut inst_b = tab_b
        .orchestrator
        .restore(serde_json::to_value(&inst_a).unwrap())
        .unwrap();

    let event = JobEvent::new("job-import", "question_import", JobStatus::Completed)
        .from_data_source("question_import")
        .with_result(json!({"importSummary": {"totalQuestionsImported": 3}}));
    tab_a
        .orchestrator
        .record_job_event(&mut inst_a, event)
        .unwrap();

    let report = tab_b.orchestrator.reconcile(&mut inst_b);

    assert_eq!(
        inst_b.stage_status("upload_questions"),
        Some(StageStatus::Completed)
    );
    assert_eq!(
        report.change_for("upload_questions").map(|c| c.to),
        Some(StageStatus::Completed)
    );
    assert_eq!(
        inst_b.stage_data.job_history.len(),
        inst_a.stage_data.job_history.len()
    );
}

#[test]
fn unknown_data_source_is_rejected() {
    let h = harness();
    let mut inst = h
        .orchestrator
        .create_new(TASK, PROJECT, "Project One", "alice")
        .unwrap();
    let event = JobEvent::new("job-1", "mystery", JobStatus::Completed).from_data_source("mystery");

    let err = h.orchestrator.record_job_event(&mut inst, event).unwrap_err();

    assert!(matches!(err, docket_core::DocketError::NotFound(_)));
    assert!(h.orchestrator.jobs().list_all().is_empty());
}
