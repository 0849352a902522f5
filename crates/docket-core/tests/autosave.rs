//! Auto-save through the orchestrator with the default key-value document sink.

mod common;

use std::time::Duration;

use common::{PROJECT, TASK, harness};
use docket_core::app::SaveStatus;
use docket_core::impls::DOCUMENT_KEY_PREFIX;
use docket_core::ports::KvStore;
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn first_save_waits_for_user_content() {
    let h = harness();
    let inst = h
        .orchestrator
        .create_new(TASK, PROJECT, "Project One", "alice")
        .unwrap();
    let scheduler = h.orchestrator.open(inst);

    // 初期 payload とミラーだけでは保存しない
    assert!(!scheduler.trigger_auto_save().await);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(h.kv.keys_with_prefix(DOCUMENT_KEY_PREFIX).unwrap().is_empty());

    scheduler.instance().lock().await.set_stage_field(
        "upload_questions",
        "uploadedFile",
        json!({"name": "questions.xlsx"}),
    );
    let mut rx = scheduler.subscribe();
    assert!(scheduler.trigger_auto_save().await);
    rx.wait_for(|s| *s == SaveStatus::Saved).await.unwrap();

    let document_id = {
        let inst = scheduler.instance();
        let inst = inst.lock().await;
        assert!(inst.is_saved);
        assert!(!inst.is_dirty);
        inst.document_id.clone().unwrap()
    };
    assert_eq!(h.kv.keys_with_prefix(DOCUMENT_KEY_PREFIX).unwrap().len(), 1);

    let restored = h.orchestrator.restore_document(&document_id).await.unwrap();
    assert_eq!(restored.document_id.as_deref(), Some(document_id.as_str()));
    assert_eq!(
        restored.stage_data.payload("upload_questions").unwrap()["uploadedFile"]["name"],
        json!("questions.xlsx")
    );
    assert!(!restored.is_dirty);
}

#[tokio::test(start_paused = true)]
async fn renamed_document_saves_without_form_content() {
    let h = harness();
    let inst = h
        .orchestrator
        .create_new(TASK, PROJECT, "Project One", "alice")
        .unwrap();
    let scheduler = h.orchestrator.open(inst);

    scheduler
        .instance()
        .lock()
        .await
        .set_title("ACME security RFP");
    assert!(scheduler.trigger_auto_save().await);
    tokio::time::sleep(Duration::from_millis(2_100)).await;

    assert_eq!(scheduler.status(), SaveStatus::Saved);

    // 保存済みなら dirty だけで対象になる
    scheduler.instance().lock().await.set_stage_field(
        "configure_corpus",
        "corpora",
        json!([]),
    );
    assert!(scheduler.is_eligible().await);
    assert!(scheduler.force_save().await);
    assert_eq!(h.kv.keys_with_prefix(DOCUMENT_KEY_PREFIX).unwrap().len(), 1);
}
