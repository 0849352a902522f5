//! Job Session Store
//!
//! - **store**: CRUD, cleanup, queries over the persisted blob
//! - **document**: persisted shape (`{version, jobs, lastActiveDocument, created, lastUpdated}`)
//! - **normalize**: alias-tolerant decoding of single records
//! - **migrate**: version check and forward migration on read

pub mod document;
pub mod migrate;
pub mod normalize;
pub mod store;

/// Version tag written into every persisted store.
pub const CURRENT_SCHEMA_VERSION: &str = "2.0";

pub use self::document::JobStoreDocument;
pub use self::migrate::LoadState;
pub use self::store::{CleanupReport, JobSessionStore};
