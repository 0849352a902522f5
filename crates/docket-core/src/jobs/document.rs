//! Persisted shape of the whole job session store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CURRENT_SCHEMA_VERSION;
use crate::domain::JobSessionRecord;

/// `{version, jobs: {<jobId>: record}, lastActiveDocument, created, lastUpdated}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStoreDocument {
    pub version: String,
    pub jobs: BTreeMap<String, JobSessionRecord>,
    #[serde(default)]
    pub last_active_document: Option<Value>,
    pub created: i64,
    pub last_updated: i64,
}

impl JobStoreDocument {
    pub fn empty(now_ms: i64) -> Self {
        Self {
            version: CURRENT_SCHEMA_VERSION.to_string(),
            jobs: BTreeMap::new(),
            last_active_document: None,
            created: now_ms,
            last_updated: now_ms,
        }
    }

    /// Drop every record older than `max_age_ms`; returns the evicted ids.
    pub fn evict_expired(&mut self, now_ms: i64, max_age_ms: i64) -> Vec<String> {
        let expired: Vec<String> = self
            .jobs
            .values()
            .filter(|r| r.is_expired(now_ms, max_age_ms))
            .map(|r| r.job_id.clone())
            .collect();
        for id in &expired {
            self.jobs.remove(id);
        }
        expired
    }

    /// Evict the oldest records by `lastUpdated` until at most `max_count` remain.
    ///
    /// `keep` is never chosen (the record that was just written).
    pub fn enforce_capacity(&mut self, max_count: usize, keep: Option<&str>) -> Vec<String> {
        let excess = self.jobs.len().saturating_sub(max_count);
        if excess == 0 {
            return Vec::new();
        }
        let mut candidates: Vec<(i64, String)> = self
            .jobs
            .values()
            .filter(|r| Some(r.job_id.as_str()) != keep)
            .map(|r| (r.last_updated, r.job_id.clone()))
            .collect();
        candidates.sort();

        let evicted: Vec<String> = candidates
            .into_iter()
            .take(excess)
            .map(|(_, id)| id)
            .collect();
        for id in &evicted {
            self.jobs.remove(id);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_records(times: &[(&str, i64)]) -> JobStoreDocument {
        let mut doc = JobStoreDocument::empty(0);
        for (id, t) in times {
            let mut rec = JobSessionRecord::new(*id, "answer", *t);
            rec.last_updated = *t;
            doc.jobs.insert(id.to_string(), rec);
        }
        doc
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let mut doc = with_records(&[("a", 3), ("b", 1), ("c", 2)]);
        let evicted = doc.enforce_capacity(2, None);
        assert_eq!(evicted, ["b"]);
        assert!(doc.jobs.contains_key("a") && doc.jobs.contains_key("c"));
    }

    #[test]
    fn capacity_never_evicts_the_kept_record() {
        let mut doc = with_records(&[("a", 3), ("b", 1), ("c", 2)]);
        let evicted = doc.enforce_capacity(2, Some("b"));
        assert_eq!(evicted, ["c"]);
    }

    #[test]
    fn expiry_uses_start_time() {
        let mut doc = with_records(&[("old", 0), ("new", 500)]);
        let evicted = doc.evict_expired(1_200, 1_000);
        assert_eq!(evicted, ["old"]);
        assert_eq!(doc.jobs.len(), 1);
    }
}
