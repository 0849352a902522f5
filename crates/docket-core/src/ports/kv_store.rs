//! KvStore port - profile-scoped persistent key-value store
//!
//! The job session store and the key-value document sink keep JSON blobs under well-known
//! keys here. Reads and writes are synchronous; every caller does a full read-modify-write.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid key '{0}'")]
    InvalidKey(String),

    #[error("{0}")]
    Backend(String),
}

pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    fn set(&self, key: &str, value: &str) -> Result<(), KvError>;

    /// Returns whether the key existed.
    fn remove(&self, key: &str) -> Result<bool, KvError>;

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError>;
}
