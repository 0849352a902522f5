//! FileKvStore - ディレクトリに 1 key = 1 ファイルで保存する key-value ストア
//!
//! 書き込みは temp file に書いてから rename（atomic）。
//! 途中でプロセスが落ちても、古い内容か新しい内容のどちらかが残る。

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::ports::{KvError, KvStore};

const FILE_SUFFIX: &str = ".json";

#[derive(Debug, Clone)]
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    /// Open (and create if missing) the data directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, KvError> {
        let dir = dir.into();
        if dir.exists() {
            if !fs::metadata(&dir)?.is_dir() {
                return Err(KvError::Backend(format!(
                    "{} is not a directory",
                    dir.display()
                )));
            }
        } else {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, KvError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}{FILE_SUFFIX}")))
    }
}

/// Keys become file names, so only a conservative character set is accepted.
fn validate_key(key: &str) -> Result<(), KvError> {
    let ok = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if ok {
        Ok(())
    } else {
        Err(KvError::InvalidKey(key.to_string()))
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let target = self.path_for(key)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|e| KvError::Io(e.error))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, KvError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(key) = name.strip_suffix(FILE_SUFFIX)
                && key.starts_with(prefix)
                && validate_key(key).is_ok()
            {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("docket.jobSessions", true)]
    #[case::dashes("docket.document.doc-01", true)]
    #[case::traversal("../etc/passwd", false)]
    #[case::hidden(".hidden", false)]
    #[case::slash("a/b", false)]
    #[case::empty("", false)]
    fn key_validation(#[case] key: &str, #[case] ok: bool) {
        assert_eq!(validate_key(key).is_ok(), ok);
    }

    #[test]
    fn write_is_visible_to_a_second_handle() {
        let dir = tempfile::tempdir().unwrap();
        let a = FileKvStore::open(dir.path()).unwrap();
        a.set("docket.jobSessions", r#"{"version":"2.0"}"#).unwrap();

        let b = FileKvStore::open(dir.path()).unwrap();
        assert_eq!(
            b.get("docket.jobSessions").unwrap().as_deref(),
            Some(r#"{"version":"2.0"}"#)
        );
        assert_eq!(b.keys_with_prefix("docket.").unwrap(), ["docket.jobSessions"]);
        assert!(b.remove("docket.jobSessions").unwrap());
        assert_eq!(a.get("docket.jobSessions").unwrap(), None);
    }

    #[test]
    fn invalid_key_is_rejected_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKvStore::open(dir.path()).unwrap();
        assert!(matches!(kv.set("../x", "{}"), Err(KvError::InvalidKey(_))));
    }

    #[test]
    fn open_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("profile").join("data");
        let kv = FileKvStore::open(&nested).unwrap();
        assert!(kv.dir().is_dir());
    }
}
