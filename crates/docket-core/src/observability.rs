//! Logging setup and status views.

use std::sync::Once;

use serde::{Deserialize, Serialize};
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::domain::{JobSessionRecord, JobStatus};

static INIT: Once = Once::new();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Install the global subscriber once. Later calls are no-ops.
///
/// Levels come from `RUST_LOG`, falling back to `default_directive` (e.g. `"warn"`).
pub fn init_logging(format: LogFormat, default_directive: &str) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));

        // try_init: a host application may already own the global subscriber.
        let _ = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init(),
        };
    });
}

/// Span around one operation on one document.
#[must_use]
pub fn document_span(operation: &str, project_id: &str, task_type: &str) -> Span {
    tracing::info_span!(
        "document",
        op = operation,
        project_id = project_id,
        task_type = task_type,
    )
}

/// Per-status record counts of the job session store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStoreCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub unknown: usize,
    pub total: usize,
}

impl JobStoreCounts {
    pub fn from_records(records: &[JobSessionRecord]) -> Self {
        let mut counts = Self::default();
        for record in records {
            let slot = match record.status {
                JobStatus::Pending => &mut counts.pending,
                JobStatus::Running => &mut counts.running,
                JobStatus::Completed => &mut counts.completed,
                JobStatus::Failed => &mut counts.failed,
                JobStatus::Cancelled => &mut counts.cancelled,
                JobStatus::Unknown => &mut counts.unknown,
            };
            *slot += 1;
            counts.total += 1;
        }
        counts
    }

    pub fn get(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Running => self.running,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Cancelled => self.cancelled,
            JobStatus::Unknown => self.unknown,
        }
    }
}
