//! Domain model (IDs, statuses, definitions, the document aggregate, job records).

pub mod content;
pub mod definition;
pub mod errors;
pub mod ids;
pub mod instance;
pub mod job;
pub mod status;
pub mod task;

pub use definition::{CompletionRule, StageDefinition, TaskDefinition};
pub use errors::{DocketError, Result};
pub use ids::{DocumentId, DraftId, Id, IdMarker, SessionId};
pub use instance::{
    DocumentStatus, DocumentTaskInstance, JobHistoryEntry, JobReference, StageData, StageEntry,
};
pub use job::{
    DocumentContext, JobSessionRecord, ProcessingItem, ProcessingItems, RecoveryData, SessionInfo,
};
pub use status::{AggregateStatus, ItemStatus, JobStatus, StageStatus};
pub use task::{CompositeProjectId, TaskType};
