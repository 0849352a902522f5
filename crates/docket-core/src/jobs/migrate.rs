//! Reading the persisted store, migrating it forward when its version tag does not match.
//!
//! Never fails. An unreadable blob becomes an empty store (the loss is logged); a store with
//! a missing or foreign version is rewritten record by record.

use std::collections::BTreeMap;

use serde_json::Value;

use super::CURRENT_SCHEMA_VERSION;
use super::document::JobStoreDocument;
use super::normalize::{normalize_record, parse_time};

/// How the blob under the storage key was turned into a [`JobStoreDocument`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// Nothing stored yet.
    Fresh,
    /// Stored with the current version and decoded as-is.
    Current,
    /// Rewritten from an older (or unknown) shape.
    Migrated {
        from: Option<String>,
        migrated: usize,
        dropped: usize,
    },
    /// Stored blob was unreadable and has been replaced by an empty store.
    Rebuilt { reason: String },
}

impl LoadState {
    /// Should the decoded store be written back right away?
    pub fn needs_write_back(&self) -> bool {
        matches!(self, LoadState::Migrated { .. } | LoadState::Rebuilt { .. })
    }
}

pub struct LoadContext<'a> {
    pub now_ms: i64,
    pub session_id: Option<&'a str>,
    pub items_capacity: usize,
}

pub fn decode_store(raw: Option<&str>, ctx: &LoadContext<'_>) -> (JobStoreDocument, LoadState) {
    let Some(raw) = raw else {
        return (JobStoreDocument::empty(ctx.now_ms), LoadState::Fresh);
    };

    let value: Value = match serde_json::from_str(raw) {
        Ok(v @ Value::Object(_)) => v,
        Ok(_) => return rebuilt(ctx, "stored job store is not a JSON object".into()),
        Err(err) => return rebuilt(ctx, err.to_string()),
    };

    let version = value
        .get("version")
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    if version.as_deref() == Some(CURRENT_SCHEMA_VERSION) {
        match serde_json::from_value::<JobStoreDocument>(value.clone()) {
            Ok(doc) => return (doc, LoadState::Current),
            Err(err) => {
                tracing::warn!(error = %err, "current-version job store failed strict decode; migrating");
            }
        }
    }

    migrate(value, version, ctx)
}

fn rebuilt(ctx: &LoadContext<'_>, reason: String) -> (JobStoreDocument, LoadState) {
    tracing::warn!(reason = %reason, "job store unreadable; rebuilding an empty store");
    (
        JobStoreDocument::empty(ctx.now_ms),
        LoadState::Rebuilt { reason },
    )
}

fn migrate(
    mut value: Value,
    from: Option<String>,
    ctx: &LoadContext<'_>,
) -> (JobStoreDocument, LoadState) {
    let raw_jobs: Vec<(Option<String>, Value)> = match value.get_mut("jobs").map(Value::take) {
        Some(Value::Object(map)) => map.into_iter().map(|(k, v)| (Some(k), v)).collect(),
        Some(Value::Array(list)) => list.into_iter().map(|v| (None, v)).collect(),
        _ => Vec::new(),
    };
    let total = raw_jobs.len();

    let provenance = from.clone().unwrap_or_else(|| "unversioned".to_string());
    let mut jobs = BTreeMap::new();
    for (key, raw) in raw_jobs {
        let Some(mut record) =
            normalize_record(raw, key.as_deref(), ctx.now_ms, ctx.items_capacity)
        else {
            continue;
        };
        let info = &mut record.session_info;
        info.schema_version = CURRENT_SCHEMA_VERSION.to_string();
        info.migrated_from = Some(provenance.clone());
        info.migrated_at = Some(ctx.now_ms);
        if info.session_id.is_none() {
            info.session_id = ctx.session_id.map(str::to_string);
        }
        jobs.insert(record.job_id.clone(), record);
    }
    let migrated = jobs.len();
    let dropped = total - migrated;

    let last_active_document = match value.get_mut("lastActiveDocument").map(Value::take) {
        None | Some(Value::Null) => None,
        Some(doc) => Some(doc),
    };
    let created = value
        .get("created")
        .and_then(parse_time)
        .unwrap_or(ctx.now_ms);

    tracing::info!(
        from = %provenance,
        to = CURRENT_SCHEMA_VERSION,
        migrated,
        dropped,
        "job store migrated"
    );

    let doc = JobStoreDocument {
        version: CURRENT_SCHEMA_VERSION.to_string(),
        jobs,
        last_active_document,
        created,
        last_updated: ctx.now_ms,
    };
    (
        doc,
        LoadState::Migrated {
            from,
            migrated,
            dropped,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobStatus;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    fn ctx() -> LoadContext<'static> {
        LoadContext {
            now_ms: NOW,
            session_id: Some("session-1"),
            items_capacity: 20,
        }
    }

    #[test]
    fn nothing_stored_is_fresh() {
        let (doc, state) = decode_store(None, &ctx());
        assert_eq!(state, LoadState::Fresh);
        assert!(!state.needs_write_back());
        assert_eq!(doc.version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn garbage_is_rebuilt() {
        let (doc, state) = decode_store(Some("{not json"), &ctx());
        assert!(matches!(state, LoadState::Rebuilt { .. }));
        assert!(state.needs_write_back());
        assert!(doc.jobs.is_empty());

        let (_, state) = decode_store(Some("[1,2]"), &ctx());
        assert!(matches!(state, LoadState::Rebuilt { .. }));
    }

    #[test]
    fn current_version_round_trips_untouched() {
        let mut doc = JobStoreDocument::empty(NOW);
        doc.jobs.insert(
            "j1".into(),
            crate::domain::JobSessionRecord::new("j1", "answer", NOW),
        );
        let text = serde_json::to_string(&doc).unwrap();

        let (back, state) = decode_store(Some(&text), &ctx());
        assert_eq!(state, LoadState::Current);
        assert_eq!(back, doc);
    }

    #[test]
    fn unversioned_keyed_store_is_migrated() {
        let raw = json!({
            "jobs": {
                "j1": {"type": "question_import", "state": "SUCCESS", "createdAt": NOW - 10},
                "j2": {"jobId": "j2", "status": "processing"},
                "broken": "not a record"
            },
            "lastActiveDocument": {"projectId": "a#p", "documentId": "d1", "custom": [1, 2]}
        });

        let (doc, state) = decode_store(Some(&raw.to_string()), &ctx());
        assert_eq!(
            state,
            LoadState::Migrated {
                from: None,
                migrated: 2,
                dropped: 1
            }
        );
        assert_eq!(doc.version, CURRENT_SCHEMA_VERSION);
        assert_eq!(doc.jobs["j1"].status, JobStatus::Completed);
        assert_eq!(doc.jobs["j2"].status, JobStatus::Running);
        assert_eq!(
            doc.last_active_document,
            Some(json!({"projectId": "a#p", "documentId": "d1", "custom": [1, 2]}))
        );

        let info = &doc.jobs["j1"].session_info;
        assert_eq!(info.migrated_from.as_deref(), Some("unversioned"));
        assert_eq!(info.migrated_at, Some(NOW));
        assert_eq!(info.session_id.as_deref(), Some("session-1"));
    }

    #[test]
    fn legacy_array_store_drops_records_without_id() {
        let raw = json!({
            "version": "1.0",
            "jobs": [
                {"id": "a", "status": "RUNNING"},
                {"status": "RUNNING"},
                {"job_id": "b", "status": "FAILED"}
            ]
        });
        let (doc, state) = decode_store(Some(&raw.to_string()), &ctx());
        assert_eq!(
            state,
            LoadState::Migrated {
                from: Some("1.0".into()),
                migrated: 2,
                dropped: 1
            }
        );
        assert_eq!(doc.jobs.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(doc.last_active_document, None);
    }
}
