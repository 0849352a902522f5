//! Runtime configuration.
//!
//! Every field has a default so a partial JSON file (or none at all) is valid.

use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::DocketError;

/// Default key of the job session store blob.
pub const DEFAULT_JOB_STORE_KEY: &str = "docket.jobSessions";

/// Task type used when a requested one is unknown (unless strict).
pub const DEFAULT_TASK_TYPE: &str = "rfp_question_list_new_framework";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocketConfig {
    pub job_store: JobStoreConfig,
    pub auto_save: AutoSaveConfig,

    pub default_task_type: String,

    /// Fail `create_new` / `restore` on an unknown task type instead of falling back.
    pub strict_task_types: bool,
}

impl Default for DocketConfig {
    fn default() -> Self {
        Self {
            job_store: JobStoreConfig::default(),
            auto_save: AutoSaveConfig::default(),
            default_task_type: DEFAULT_TASK_TYPE.to_string(),
            strict_task_types: false,
        }
    }
}

impl DocketConfig {
    pub fn from_json_str(s: &str) -> Result<Self, DocketError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DocketError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DocketError::Configuration(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Structural checks. Whether `default_task_type` exists is checked by the builder,
    /// which knows the catalogue.
    pub fn validate(&self) -> Result<(), DocketError> {
        let js = &self.job_store;
        if js.max_count == 0 {
            return Err(DocketError::Configuration(
                "job_store.max_count must be at least 1".into(),
            ));
        }
        if js.processing_items_cap == 0 {
            return Err(DocketError::Configuration(
                "job_store.processing_items_cap must be at least 1".into(),
            ));
        }
        for (name, ms) in [
            ("max_age_ms", js.max_age_ms),
            ("completed_idle_ms", js.completed_idle_ms),
        ] {
            if ms > JobStoreConfig::MAX_WINDOW_MS {
                return Err(DocketError::Configuration(format!(
                    "job_store.{name} must be at most {}",
                    JobStoreConfig::MAX_WINDOW_MS
                )));
            }
        }
        if js.storage_key.trim().is_empty() {
            return Err(DocketError::Configuration(
                "job_store.storage_key must not be empty".into(),
            ));
        }
        if self.default_task_type.trim().is_empty() {
            return Err(DocketError::Configuration(
                "default_task_type must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobStoreConfig {
    pub storage_key: String,

    /// Records whose `startTime` is older than this are invisible (24h).
    pub max_age_ms: u64,

    /// COMPLETED records idle longer than this are dropped by `cleanup` (1h).
    pub completed_idle_ms: u64,

    pub max_count: usize,

    pub processing_items_cap: usize,

    /// Wipe the whole store on logout instead of running `cleanup`.
    pub clear_on_logout: bool,
}

impl Default for JobStoreConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_JOB_STORE_KEY.to_string(),
            max_age_ms: 24 * 60 * 60 * 1000,
            completed_idle_ms: 60 * 60 * 1000,
            max_count: 50,
            processing_items_cap: 20,
            clear_on_logout: false,
        }
    }
}

impl JobStoreConfig {
    /// Longest window `validate` accepts for either age limit.
    pub const MAX_WINDOW_MS: u64 = i64::MAX as u64;

    pub fn max_age(&self) -> Duration {
        saturating_millis(self.max_age_ms)
    }

    pub fn completed_idle(&self) -> Duration {
        saturating_millis(self.completed_idle_ms)
    }
}

fn saturating_millis(ms: u64) -> Duration {
    i64::try_from(ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .unwrap_or(Duration::MAX)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    pub debounce_ms: u64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self { debounce_ms: 2_000 }
    }
}

impl AutoSaveConfig {
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_store_limits() {
        let c = DocketConfig::default();
        assert_eq!(c.job_store.max_count, 50);
        assert_eq!(c.job_store.max_age(), Duration::hours(24));
        assert_eq!(c.job_store.completed_idle(), Duration::hours(1));
        assert_eq!(c.default_task_type, DEFAULT_TASK_TYPE);
        assert!(!c.strict_task_types);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let c = DocketConfig::from_json_str(
            r#"{ "job_store": { "max_count": 10 }, "strict_task_types": true }"#,
        )
        .unwrap();
        assert_eq!(c.job_store.max_count, 10);
        assert_eq!(c.job_store.storage_key, DEFAULT_JOB_STORE_KEY);
        assert_eq!(c.auto_save.debounce_ms, 2_000);
        assert!(c.strict_task_types);
    }

    #[test]
    fn oversized_age_window_is_rejected() {
        let err = DocketConfig::from_json_str(
            r#"{ "job_store": { "max_age_ms": 18446744073709551615 } }"#,
        )
        .unwrap_err();
        assert!(err.is_fatal());

        let err = DocketConfig::from_json_str(
            r#"{ "job_store": { "completed_idle_ms": 9223372036854775808 } }"#,
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn age_window_never_goes_negative() {
        let js = JobStoreConfig {
            max_age_ms: u64::MAX,
            completed_idle_ms: JobStoreConfig::MAX_WINDOW_MS,
            ..JobStoreConfig::default()
        };
        assert!(js.max_age() > Duration::zero());
        assert!(js.completed_idle() > Duration::days(365));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = DocketConfig::from_json_str(r#"{ "job_store": { "max_count": 0 } }"#)
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
