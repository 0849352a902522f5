//! Content heuristic: does a stage payload hold real user data?
//!
//! Numbers and booleans never count on their own (forms default them to `0`/`false`).

use serde_json::Value;

/// Keys written by the system, not the user.
const BOOKKEEPING_KEYS: &[&str] = &[
    "status",
    "stageId",
    "createdAt",
    "updatedAt",
    "lastUpdated",
    "jobHistory",
];

pub fn carries_user_content(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => items.iter().any(carries_user_content),
        Value::Object(map) => map
            .iter()
            .filter(|(k, _)| !BOOKKEEPING_KEYS.contains(&k.as_str()))
            .any(|(_, v)| carries_user_content(v)),
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    }
}
