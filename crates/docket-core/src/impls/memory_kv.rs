//! InMemoryKvStore - 開発・テスト用の key-value ストア
//!
//! プロセス終了で消える。`std::sync::Mutex` で十分（await をまたがない）。

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::ports::{KvError, KvStore};

#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>, KvError> {
        self.entries
            .lock()
            .map_err(|_| KvError::Backend("in-memory store lock poisoned".into()))
    }
}

impl KvStore for InMemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.lock()?.remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        Ok(self
            .lock()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let kv = InMemoryKvStore::new();
        assert_eq!(kv.get("a").unwrap(), None);

        kv.set("a", "1").unwrap();
        kv.set("a", "2").unwrap();
        assert_eq!(kv.get("a").unwrap().as_deref(), Some("2"));

        assert!(kv.remove("a").unwrap());
        assert!(!kv.remove("a").unwrap());
    }

    #[test]
    fn prefix_listing_is_sorted() {
        let kv = InMemoryKvStore::new();
        kv.set("docket.document.b", "{}").unwrap();
        kv.set("docket.document.a", "{}").unwrap();
        kv.set("docket.jobSessions", "{}").unwrap();

        let keys = kv.keys_with_prefix("docket.document.").unwrap();
        assert_eq!(keys, ["docket.document.a", "docket.document.b"]);
    }
}
