//! JobSessionStore - 非同期ジョブの永続的な記録
//!
//! # 設計
//! - KvStore 上の 1 つの JSON blob（`{version, jobs, lastActiveDocument, created, lastUpdated}`）
//! - キャッシュなし: すべての操作が blob 全体の read-modify-write（複数タブ間は last-write-wins）
//! - 読み込み時にバージョンが違えば migrate して書き戻す
//! - 24h より古いレコードは読み手から見えない（load 時に遅延削除）
//! - mutator は I/O エラーをログに出して `false` を返す（呼び出し元には投げない）

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value};

use super::document::JobStoreDocument;
use super::migrate::{LoadContext, LoadState, decode_store};
use super::normalize::merge_record;
use crate::config::JobStoreConfig;
use crate::domain::{DocketError, JobSessionRecord, JobStatus, ProcessingItem, SessionId};
use crate::observability::JobStoreCounts;
use crate::ports::{Clock, KvStore};

/// What `cleanup` removed, per rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub expired: usize,
    pub completed_idle: usize,
    pub over_capacity: usize,
    pub remaining: usize,
}

impl CleanupReport {
    pub fn removed(&self) -> usize {
        self.expired + self.completed_idle + self.over_capacity
    }
}

pub struct JobSessionStore {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    config: JobStoreConfig,
    session: RwLock<Option<SessionId>>,
}

impl JobSessionStore {
    pub fn new(kv: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: JobStoreConfig) -> Self {
        Self {
            kv,
            clock,
            config,
            session: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &JobStoreConfig {
        &self.config
    }

    /// Session whose id is stamped onto every write (provenance only).
    pub fn set_session(&self, session: Option<SessionId>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    pub fn session(&self) -> Option<SessionId> {
        *self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn max_age_ms(&self) -> i64 {
        self.config.max_age().num_milliseconds()
    }

    // ========================================
    // blob I/O
    // ========================================

    fn read(&self) -> JobStoreDocument {
        let key = &self.config.storage_key;
        let now_ms = self.clock.now_ms();
        let session = self.session().map(|s| s.to_string());
        let ctx = LoadContext {
            now_ms,
            session_id: session.as_deref(),
            items_capacity: self.config.processing_items_cap,
        };

        let raw = match self.kv.get(key) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "job store read failed; treating as empty");
                None
            }
        };

        let (doc, state) = decode_store(raw.as_deref(), &ctx);
        if state.needs_write_back()
            && let Err(err) = self.write(&doc)
        {
            tracing::warn!(key = %key, error = %err, "could not write back upgraded job store");
        }
        if let LoadState::Rebuilt { reason } = &state {
            tracing::warn!(key = %key, reason = %reason, "job store contents lost");
        }
        doc
    }

    fn write(&self, doc: &JobStoreDocument) -> Result<(), DocketError> {
        let text = serde_json::to_string(doc)?;
        self.kv
            .set(&self.config.storage_key, &text)
            .map_err(|e| DocketError::Storage(e.to_string()))
    }

    /// Write and turn the outcome into the mutators' boolean contract.
    fn commit(&self, mut doc: JobStoreDocument, op: &str) -> bool {
        doc.last_updated = self.clock.now_ms();
        match self.write(&doc) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(op, key = %self.config.storage_key, error = %err, "job store write failed");
                false
            }
        }
    }

    // ========================================
    // CRUD
    // ========================================

    /// Merge `patch` (any accepted spelling) into the record for `job_id`.
    pub fn save(&self, job_id: &str, patch: Value) -> bool {
        let job_id = job_id.trim();
        if job_id.is_empty() {
            tracing::warn!("job store save ignored: empty job id");
            return false;
        }
        let now_ms = self.clock.now_ms();
        let mut doc = self.read();

        let Some(mut record) = merge_record(
            doc.jobs.get(job_id),
            job_id,
            patch,
            now_ms,
            self.config.processing_items_cap,
        ) else {
            return false;
        };
        record.last_updated = now_ms;
        if let Some(session) = self.session() {
            record.session_info.session_id = Some(session.to_string());
        }

        if let Some(ctx) = record.document_context.as_ref().filter(|c| c.is_resolvable()) {
            let mut active = serde_json::to_value(ctx).unwrap_or(Value::Null);
            if let Value::Object(map) = &mut active {
                map.insert("jobId".into(), Value::String(record.job_id.clone()));
                map.insert("updatedAt".into(), Value::from(now_ms));
            }
            doc.last_active_document = Some(active);
        }

        doc.jobs.insert(record.job_id.clone(), record);
        let evicted = doc.enforce_capacity(self.config.max_count, Some(job_id));
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "job store over capacity; oldest records evicted");
        }
        tracing::debug!(job_id, "job record saved");
        self.commit(doc, "save")
    }

    /// Save a fully-formed record.
    pub fn save_record(&self, record: &JobSessionRecord) -> bool {
        match serde_json::to_value(record) {
            Ok(value) => self.save(&record.job_id, value),
            Err(err) => {
                tracing::warn!(job_id = %record.job_id, error = %err, "job record not serializable");
                false
            }
        }
    }

    /// Record for `job_id`, refreshing its `lastActiveTime`. Expired records are evicted.
    pub fn load(&self, job_id: &str) -> Option<JobSessionRecord> {
        let now_ms = self.clock.now_ms();
        let mut doc = self.read();
        let record = doc.jobs.get_mut(job_id)?;

        if record.is_expired(now_ms, self.max_age_ms()) {
            doc.jobs.remove(job_id);
            tracing::info!(job_id, "expired job record evicted on load");
            self.commit(doc, "load");
            return None;
        }

        record.last_active_time = Some(now_ms);
        let found = record.clone();
        self.commit(doc, "load");
        Some(found)
    }

    /// Every non-expired record, oldest start first. Filter only; nothing is written.
    pub fn list_all(&self) -> Vec<JobSessionRecord> {
        let now_ms = self.clock.now_ms();
        let max_age = self.max_age_ms();
        let mut records: Vec<JobSessionRecord> = self
            .read()
            .jobs
            .into_values()
            .filter(|r| !r.is_expired(now_ms, max_age))
            .collect();
        records.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        records
    }

    pub fn remove(&self, job_id: &str) -> bool {
        let mut doc = self.read();
        if doc.jobs.remove(job_id).is_none() {
            return false;
        }
        self.commit(doc, "remove")
    }

    /// Apply a read-modify-write to a live record. `false` if absent or expired.
    fn modify(&self, job_id: &str, op: &str, f: impl FnOnce(&mut JobSessionRecord, i64)) -> bool {
        let now_ms = self.clock.now_ms();
        let mut doc = self.read();
        let max_age = self.max_age_ms();
        let Some(record) = doc
            .jobs
            .get_mut(job_id)
            .filter(|r| !r.is_expired(now_ms, max_age))
        else {
            return false;
        };
        f(record, now_ms);
        self.commit(doc, op)
    }

    pub fn update_status(&self, job_id: &str, status: JobStatus, meta: Option<&Value>) -> bool {
        self.modify(job_id, "update_status", |record, now_ms| {
            if record.set_status(status, now_ms) {
                merge_meta(&mut record.meta, meta);
            }
        })
    }

    pub fn update_progress(&self, job_id: &str, progress: f64, meta: Option<&Value>) -> bool {
        self.modify(job_id, "update_progress", |record, now_ms| {
            record.set_progress(progress, now_ms);
            merge_meta(&mut record.meta, meta);
        })
    }

    /// Append one item outcome to the record's bounded ring.
    pub fn record_item(&self, job_id: &str, item: ProcessingItem) -> bool {
        let capacity = self.config.processing_items_cap;
        self.modify(job_id, "record_item", |record, now_ms| {
            record.processing_items.push(item, capacity);
            record.last_updated = now_ms;
        })
    }

    // ========================================
    // housekeeping
    // ========================================

    /// Age expiry, then idle COMPLETED records, then oldest-first down to capacity.
    pub fn cleanup(&self) -> CleanupReport {
        let now_ms = self.clock.now_ms();
        let mut doc = self.read();

        let expired = doc.evict_expired(now_ms, self.max_age_ms()).len();

        let idle_ms = self.config.completed_idle().num_milliseconds();
        let idle: Vec<String> = doc
            .jobs
            .values()
            .filter(|r| {
                r.status == JobStatus::Completed
                    && now_ms.saturating_sub(r.last_touched()) > idle_ms
            })
            .map(|r| r.job_id.clone())
            .collect();
        for id in &idle {
            doc.jobs.remove(id);
        }

        let over_capacity = doc.enforce_capacity(self.config.max_count, None).len();

        let report = CleanupReport {
            expired,
            completed_idle: idle.len(),
            over_capacity,
            remaining: doc.jobs.len(),
        };
        if report.removed() > 0 {
            tracing::info!(
                expired = report.expired,
                completed_idle = report.completed_idle,
                over_capacity = report.over_capacity,
                remaining = report.remaining,
                "job store cleaned up"
            );
            self.commit(doc, "cleanup");
        }
        report
    }

    /// Wipe every record. `lastActiveDocument` goes too.
    pub fn clear(&self) -> bool {
        let doc = JobStoreDocument::empty(self.clock.now_ms());
        tracing::info!(key = %self.config.storage_key, "job store cleared");
        self.commit(doc, "clear")
    }

    // ========================================
    // queries
    // ========================================

    pub fn get_last_active_document(&self) -> Option<Value> {
        self.read().last_active_document
    }

    /// Live records whose document context points at the given document.
    pub fn find_by_document(
        &self,
        project_id: &str,
        document_id: Option<&str>,
        draft_id: Option<&str>,
        task_type: &str,
    ) -> Vec<JobSessionRecord> {
        self.list_all()
            .into_iter()
            .filter(|r| {
                r.document_context
                    .as_ref()
                    .is_some_and(|c| c.refers_to(project_id, document_id, draft_id, task_type))
            })
            .collect()
    }

    pub fn counts(&self) -> JobStoreCounts {
        JobStoreCounts::from_records(&self.list_all())
    }
}

fn merge_meta(meta: &mut Map<String, Value>, patch: Option<&Value>) {
    if let Some(Value::Object(patch)) = patch {
        for (k, v) in patch {
            meta.insert(k.clone(), v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DocumentContext, ItemStatus};
    use crate::impls::InMemoryKvStore;
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    struct Fixture {
        kv: Arc<InMemoryKvStore>,
        clock: Arc<FixedClock>,
        store: JobSessionStore,
    }

    fn fixture() -> Fixture {
        let kv = Arc::new(InMemoryKvStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        ));
        let store = JobSessionStore::new(kv.clone(), clock.clone(), JobStoreConfig::default());
        Fixture { kv, clock, store }
    }

    fn stored(f: &Fixture) -> Value {
        let raw = f.kv.get(crate::config::DEFAULT_JOB_STORE_KEY).unwrap().unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn save_then_load() {
        let f = fixture();
        assert!(f.store.save("j1", json!({"type": "answer", "state": "running", "progress": 12})));

        let rec = f.store.load("j1").unwrap();
        assert_eq!(rec.job_type, "answer");
        assert_eq!(rec.status, JobStatus::Running);
        assert_eq!(rec.progress, 12);
        assert_eq!(rec.last_active_time, Some(f.clock.now_ms()));
        assert!(f.store.load("missing").is_none());
    }

    #[test]
    fn save_stamps_session_provenance() {
        let f = fixture();
        let session = SessionId::from_ulid(ulid::Ulid::new());
        f.store.set_session(Some(session));
        f.store.save("j1", json!({}));

        let rec = f.store.load("j1").unwrap();
        assert_eq!(rec.session_info.session_id, Some(session.to_string()));
    }

    #[test]
    fn expired_record_is_invisible_and_evicted() {
        let f = fixture();
        f.store.save("old", json!({"status": "RUNNING"}));
        f.clock.advance(Duration::hours(25));

        assert!(f.store.list_all().is_empty());
        assert!(!f.store.update_status("old", JobStatus::Completed, None));
        assert!(stored(&f)["jobs"].get("old").is_some());

        assert!(f.store.load("old").is_none());
        assert!(stored(&f)["jobs"].get("old").is_none());
    }

    #[test]
    fn update_status_and_progress() {
        let f = fixture();
        assert!(!f.store.update_status("j1", JobStatus::Running, None));

        f.store.save("j1", json!({"status": "PENDING"}));
        assert!(f.store.update_progress("j1", 140.0, Some(&json!({"phase": "answering"}))));
        assert!(f.store.update_status("j1", JobStatus::Failed, Some(&json!({"error": "timeout"}))));

        let rec = f.store.load("j1").unwrap();
        assert_eq!(rec.progress, 100);
        assert_eq!(rec.status, JobStatus::Failed);
        assert_eq!(rec.meta["phase"], "answering");
        assert_eq!(rec.meta["error"], "timeout");
        assert_eq!(rec.recovery_data.attempts, 1);
    }

    #[test]
    fn resolvable_context_becomes_last_active_document() {
        let f = fixture();
        f.store.save("j1", json!({"context": {"projectId": "a#p"}}));
        assert_eq!(f.store.get_last_active_document(), None);

        f.store.save(
            "j2",
            json!({"documentContext": {"projectId": "a#p", "documentId": "d1"}}),
        );
        let active = f.store.get_last_active_document().unwrap();
        assert_eq!(active["documentId"], "d1");
        assert_eq!(active["jobId"], "j2");
    }

    #[test]
    fn cleanup_drops_idle_completed_records() {
        let f = fixture();
        f.store.save("done", json!({"status": "COMPLETED"}));
        f.store.save("busy", json!({"status": "RUNNING"}));
        f.clock.advance(Duration::minutes(61));

        let report = f.store.cleanup();
        assert_eq!(report.completed_idle, 1);
        assert_eq!(report.remaining, 1);
        assert!(f.store.load("busy").is_some());
    }

    #[test]
    fn recently_loaded_completed_record_survives_cleanup() {
        let f = fixture();
        f.store.save("done", json!({"status": "COMPLETED"}));
        f.clock.advance(Duration::minutes(50));
        f.store.load("done");
        f.clock.advance(Duration::minutes(20));

        assert_eq!(f.store.cleanup().removed(), 0);
    }

    #[test]
    fn record_item_keeps_ring_bounded() {
        let f = fixture();
        f.store.save("j1", json!({}));
        for i in 0..25 {
            let item = ProcessingItem {
                item_id: format!("q{i}"),
                status: ItemStatus::Succeeded,
                at: i,
                message: None,
            };
            assert!(f.store.record_item("j1", item));
        }
        let rec = f.store.load("j1").unwrap();
        assert_eq!(rec.processing_items.len(), 20);
        assert_eq!(rec.processing_items.iter().next().unwrap().item_id, "q5");
    }

    #[test]
    fn find_by_document_and_counts() {
        let f = fixture();
        let ctx = DocumentContext::for_project("a#p")
            .with_document("d1")
            .with_stage("upload_questions");
        let rec = JobSessionRecord::new("j1", "question_import", f.clock.now_ms())
            .with_status(JobStatus::Running)
            .with_context(ctx);
        assert!(f.store.save_record(&rec));
        f.store.save("j2", json!({"status": "done"}));

        let found = f.store.find_by_document("a#p", Some("d1"), None, "rfp");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].job_id, "j1");

        let counts = f.store.counts();
        assert_eq!(counts.running, 1);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.total, 2);
    }

    #[test]
    fn unsaved_documents_are_told_apart_by_draft() {
        let f = fixture();
        for (job_id, draft) in [("j-a", "draft-a"), ("j-b", "draft-b")] {
            let ctx = DocumentContext::for_project("a#p")
                .with_task_type("rfp")
                .with_draft(draft);
            let rec = JobSessionRecord::new(job_id, "answer", f.clock.now_ms()).with_context(ctx);
            assert!(f.store.save_record(&rec));
        }

        let found = f.store.find_by_document("a#p", None, Some("draft-a"), "rfp");
        let ids: Vec<&str> = found.iter().map(|r| r.job_id.as_str()).collect();
        assert_eq!(ids, ["j-a"]);

        // the draft id outlives the first save
        let found = f.store.find_by_document("a#p", Some("d9"), Some("draft-b"), "rfp");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].job_id, "j-b");
    }

    #[test]
    fn clear_wipes_everything() {
        let f = fixture();
        f.store.save("j1", json!({"context": {"projectId": "a#p", "documentId": "d"}}));
        assert!(f.store.clear());
        assert!(f.store.list_all().is_empty());
        assert_eq!(f.store.get_last_active_document(), None);
    }

    #[test]
    fn empty_job_id_is_rejected() {
        let f = fixture();
        assert!(!f.store.save("  ", json!({})));
        assert!(f.kv.get(crate::config::DEFAULT_JOB_STORE_KEY).unwrap().is_none());
    }
}
