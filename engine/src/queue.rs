use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::debug;

use crate::error::{Error, Result};

/// `fileName -> unlockTime` (unix seconds).
pub type QueueMap = BTreeMap<String, i64>;

/// Owner of the queue file. Every mutation is a full load/modify/save cycle
/// under one lock, so concurrent callers never lose each other's writes.
#[derive(Debug)]
pub struct QueueStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl QueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Missing file is an empty queue; an unparsable one is an error.
    pub fn load(&self) -> Result<QueueMap> {
        let _guard = self.guard();
        self.read()
    }

    /// Replace the persisted queue with exactly `entries`.
    pub fn save(&self, entries: &QueueMap) -> Result<()> {
        let _guard = self.guard();
        self.write(entries)
    }

    /// Register `file_name` unless it is already queued. Returns whether the
    /// entry was inserted; an existing entry keeps its unlock time.
    pub fn upsert(&self, file_name: &str, unlock_time: i64) -> Result<bool> {
        let _guard = self.guard();
        let mut entries = self.read()?;
        if entries.contains_key(file_name) {
            debug!("{} already queued", file_name);
            return Ok(false);
        }
        entries.insert(file_name.to_string(), unlock_time);
        self.write(&entries)?;
        Ok(true)
    }

    /// Drop the named entries, keeping anything else, including entries added
    /// since the caller last loaded the queue.
    pub fn remove<S: AsRef<str>>(&self, file_names: &[S]) -> Result<QueueMap> {
        let _guard = self.guard();
        let mut entries = self.read()?;
        let before = entries.len();
        for file_name in file_names {
            entries.remove(file_name.as_ref());
        }
        if entries.len() != before {
            self.write(&entries)?;
        }
        Ok(entries)
    }

    fn read(&self) -> Result<QueueMap> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(QueueMap::new()),
            Err(error) => return Err(Error::io(&self.path, error)),
        };
        if contents.trim().is_empty() {
            return Ok(QueueMap::new());
        }
        serde_yaml::from_str(&contents).map_err(|source| Error::CorruptState {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, entries: &QueueMap) -> Result<()> {
        write_atomically(&self.path, entries)
    }
}

/// Run a state-file operation on the blocking pool so file I/O and the store
/// lock never hold up a runtime worker.
pub(crate) async fn blocking<T, F>(operation: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(operation).await?
}

/// Serialise `value` next to `path` and rename it into place.
pub(crate) fn write_atomically<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| Error::io(parent, error))?;
    }
    let contents = serde_yaml::to_string(value).map_err(|source| Error::CorruptState {
        path: path.to_path_buf(),
        source,
    })?;
    let mut temporary = path.as_os_str().to_owned();
    temporary.push(".tmp");
    let temporary = PathBuf::from(temporary);
    fs::write(&temporary, contents).map_err(|error| Error::io(&temporary, error))?;
    fs::rename(&temporary, path).map_err(|error| Error::io(path, error))?;
    debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use test_case::test_case;

    fn store() -> (tempfile::TempDir, QueueStore) {
        let directory = tempfile::tempdir().unwrap();
        let store = QueueStore::new(directory.path().join("queue.yaml"));
        (directory, store)
    }

    #[tokio::test]
    async fn blocking_runs_off_the_calling_thread() {
        let caller = std::thread::current().id();
        let worker = blocking(|| Ok(std::thread::current().id())).await.unwrap();
        assert_ne!(caller, worker);
    }

    #[tokio::test]
    async fn panicking_store_operation_is_an_error() {
        let result: Result<()> = blocking(|| panic!("store operation panicked")).await;
        assert!(matches!(result, Err(Error::Background(_))));
    }

    #[test]
    fn missing_file_is_empty() {
        let (_directory, store) = store();
        assert!(store.load().unwrap().is_empty());
    }

    #[test_case(&[]; "nothing")]
    #[test_case(&[("2160B.cpp", 10)]; "one")]
    #[test_case(&[("3.py", 30), ("1.cpp", 10), ("2.cpp", 20)]; "unordered")]
    fn distinct_upserts_round_trip(entries: &[(&str, i64)]) {
        let (_directory, store) = store();
        for (file_name, unlock_time) in entries {
            assert!(store.upsert(file_name, *unlock_time).unwrap());
        }
        let expected: QueueMap = entries
            .iter()
            .map(|(name, time)| (name.to_string(), *time))
            .collect();
        assert_eq!(store.load().unwrap(), expected);
    }

    #[test]
    fn first_upsert_wins() {
        let (_directory, store) = store();
        assert!(store.upsert("2160B.cpp", 8200).unwrap());
        assert!(!store.upsert("2160B.cpp", 9999).unwrap());
        assert_eq!(store.load().unwrap()["2160B.cpp"], 8200);
    }

    #[test]
    fn save_replaces_everything() {
        let (_directory, store) = store();
        store.upsert("a.cpp", 1).unwrap();
        let replacement = QueueMap::from([("b.cpp".to_string(), 2)]);
        store.save(&replacement).unwrap();
        assert_eq!(store.load().unwrap(), replacement);
    }

    #[test]
    fn remove_keeps_other_entries() {
        let (_directory, store) = store();
        store.upsert("a.cpp", 1).unwrap();
        store.upsert("b.cpp", 2).unwrap();
        let left = store.remove(&["a.cpp", "missing.cpp"]).unwrap();
        assert_eq!(left, QueueMap::from([("b.cpp".to_string(), 2)]));
        assert_eq!(store.load().unwrap(), left);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let (_directory, store) = store();
        fs::write(store.path(), "a.cpp: [not, a, number").unwrap();
        assert!(matches!(store.load(), Err(Error::CorruptState { .. })));
        assert!(matches!(
            store.upsert("b.cpp", 1),
            Err(Error::CorruptState { .. })
        ));
        // The unreadable file is left for the user to inspect.
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "a.cpp: [not, a, number"
        );
    }

    #[test]
    fn concurrent_upserts_are_all_kept() {
        let (_directory, store) = store();
        let store = Arc::new(store);
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || store.upsert(&format!("{}A.cpp", i), i).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.load().unwrap().len(), 16);
    }
}
