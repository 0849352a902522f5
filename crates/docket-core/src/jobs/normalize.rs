//! Lenient decoding of job records.
//!
//! Records reach the store from the job execution callbacks, from older clients and from
//! migrations, each with its own spelling. Everything is funnelled through
//! [`normalize_record`], which never fails on a shape problem: a field that cannot be read
//! takes its default. Only a record without a usable job id is rejected.

use chrono::DateTime;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::CURRENT_SCHEMA_VERSION;
use crate::domain::job::clamp_progress;
use crate::domain::{
    DocumentContext, JobSessionRecord, JobStatus, ProcessingItem, ProcessingItems, RecoveryData,
    SessionInfo,
};

/// `(alias, canonical)` pairs. When both spellings are present the canonical key wins.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("id", "jobId"),
    ("job_id", "jobId"),
    ("type", "jobType"),
    ("job_type", "jobType"),
    ("state", "status"),
    ("percent", "progress"),
    ("percentage", "progress"),
    ("createdAt", "startTime"),
    ("started_at", "startTime"),
    ("start_time", "startTime"),
    ("updatedAt", "lastUpdated"),
    ("last_updated", "lastUpdated"),
    ("last_active_time", "lastActiveTime"),
    ("metadata", "meta"),
    ("context", "documentContext"),
    ("document", "documentContext"),
    ("document_context", "documentContext"),
    ("items", "processingItems"),
    ("processedItems", "processingItems"),
    ("processing_items", "processingItems"),
    ("recovery", "recoveryData"),
    ("recovery_data", "recoveryData"),
    ("session", "sessionInfo"),
    ("session_info", "sessionInfo"),
];

/// Rewrite alias keys into their canonical spelling.
pub fn canonicalize_keys(mut obj: Map<String, Value>) -> Map<String, Value> {
    for (alias, canonical) in FIELD_ALIASES {
        if let Some(value) = obj.remove(*alias)
            && !obj.contains_key(*canonical)
        {
            obj.insert((*canonical).to_string(), value);
        }
    }
    obj
}

/// Epoch milliseconds from a number, a numeric string or an RFC 3339 timestamp.
pub fn parse_time(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|t| t.timestamp_millis())
            })
        }
        _ => None,
    }
}

fn parse_progress(value: Option<&Value>) -> u8 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    raw.map_or(0, clamp_progress)
}

fn parse_job_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decode a sub-object, falling back to the default on any shape mismatch.
fn lenient<T: DeserializeOwned + Default>(value: Option<Value>, field: &str, job_id: &str) -> T {
    match value {
        None | Some(Value::Null) => T::default(),
        Some(v) => serde_json::from_value(v).unwrap_or_else(|err| {
            tracing::warn!(job_id, field, error = %err, "unreadable job field replaced by default");
            T::default()
        }),
    }
}

fn parse_items(value: Option<Value>, capacity: usize) -> ProcessingItems {
    let Some(Value::Array(raw)) = value else {
        return ProcessingItems::default();
    };
    let mut items = ProcessingItems::from_items(
        raw.into_iter()
            .filter_map(|v| serde_json::from_value::<ProcessingItem>(v).ok()),
    );
    items.truncate_to(capacity);
    items
}

fn parse_context(value: Option<Value>, job_id: &str) -> Option<DocumentContext> {
    match value {
        Some(v @ Value::Object(_)) => match serde_json::from_value(v) {
            Ok(ctx) => Some(ctx),
            Err(err) => {
                tracing::warn!(job_id, error = %err, "unreadable document context dropped");
                None
            }
        },
        _ => None,
    }
}

/// Build a canonical record out of any accepted shape.
///
/// `fallback_id` is used when the record itself carries no id (the map key in a keyed store).
pub fn normalize_record(
    raw: Value,
    fallback_id: Option<&str>,
    now_ms: i64,
    items_capacity: usize,
) -> Option<JobSessionRecord> {
    let Value::Object(obj) = raw else {
        return None;
    };
    let mut obj = canonicalize_keys(obj);

    let job_id = parse_job_id(obj.get("jobId")).or_else(|| {
        fallback_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    })?;

    let start_time = obj.get("startTime").and_then(parse_time).unwrap_or(now_ms);
    let last_updated = obj
        .get("lastUpdated")
        .and_then(parse_time)
        .unwrap_or(start_time);

    let mut session_info: SessionInfo = lenient(obj.remove("sessionInfo"), "sessionInfo", &job_id);
    if session_info.schema_version.is_empty() {
        session_info.schema_version = CURRENT_SCHEMA_VERSION.to_string();
    }

    Some(JobSessionRecord {
        job_type: obj
            .get("jobType")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        status: match obj.get("status") {
            None | Some(Value::Null) => JobStatus::Pending,
            Some(v) => v.as_str().map_or(JobStatus::Unknown, JobStatus::from_alias),
        },
        progress: parse_progress(obj.get("progress")),
        start_time,
        last_updated,
        last_active_time: obj.get("lastActiveTime").and_then(parse_time),
        meta: match obj.remove("meta") {
            Some(Value::Object(meta)) => meta,
            _ => Map::new(),
        },
        document_context: parse_context(obj.remove("documentContext"), &job_id),
        processing_items: parse_items(obj.remove("processingItems"), items_capacity),
        recovery_data: lenient::<RecoveryData>(obj.remove("recoveryData"), "recoveryData", &job_id),
        session_info,
        job_id,
    })
}

/// Overlay `patch` onto an existing record and re-normalize.
///
/// The patch's keys replace the record's keys one level deep (a new `meta` replaces the old
/// one). The stored job id always wins over whatever the patch claims, and a record that
/// already reached `COMPLETED` keeps that status.
pub fn merge_record(
    existing: Option<&JobSessionRecord>,
    job_id: &str,
    patch: Value,
    now_ms: i64,
    items_capacity: usize,
) -> Option<JobSessionRecord> {
    let patch = match patch {
        Value::Object(obj) => canonicalize_keys(obj),
        _ => Map::new(),
    };

    let mut base = existing
        .and_then(|rec| serde_json::to_value(rec).ok())
        .and_then(|v| match v {
            Value::Object(obj) => Some(obj),
            _ => None,
        })
        .unwrap_or_default();
    base.extend(patch);
    base.insert("jobId".into(), Value::String(job_id.to_string()));

    let mut merged = normalize_record(Value::Object(base), Some(job_id), now_ms, items_capacity)?;
    if existing.is_some_and(|r| r.status == JobStatus::Completed)
        && merged.status != JobStatus::Completed
    {
        tracing::debug!(job_id, ignored = %merged.status, "job already completed; patch status dropped");
        merged.status = JobStatus::Completed;
        merged.progress = 100;
    }
    Some(merged)
}
