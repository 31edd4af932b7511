//! Shared key/value storage slots with change notification.
//!
//! A [`Storage`] is the medium tabs share: string values under string keys,
//! plus a listener hook fired whenever a slot changes. Two backends:
//!   - **Memory**: in-process, cloneable; every clone sees the same slots.
//!   - **Dir**: one JSON file per key in a directory, written atomically
//!     (temp+rename) and watched with `notify`, so separate processes can
//!     share state.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tabsync_core::{TabsyncError, TabsyncResult};
use tracing::{debug, warn};

/// A change to one storage slot. `new_value` is `None` when the slot was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub new_value: Option<String>,
}

pub type StorageListener = Box<dyn Fn(&StorageEvent) + Send + Sync>;

/// Trait for storage backends (in-memory and directory).
pub trait Storage: Send + Sync {
    /// Read the value stored under `key`.
    fn get_item(&self, key: &str) -> TabsyncResult<Option<String>>;
    /// Store `value` under `key`, notifying listeners.
    fn set_item(&self, key: &str, value: &str) -> TabsyncResult<()>;
    /// Remove `key`, notifying listeners if it was present.
    fn remove_item(&self, key: &str) -> TabsyncResult<()>;
    /// Register a listener called on every slot change, for as long as the
    /// storage lives.
    fn add_listener(&self, listener: StorageListener) -> TabsyncResult<()>;
}

// ── Memory backend ───────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryInner {
    items: HashMap<String, String>,
    listeners: Vec<Arc<dyn Fn(&StorageEvent) + Send + Sync>>,
}

/// In-process storage shared by every clone.
///
/// Like a browser's storage event, a change is delivered to every listener,
/// including the writer's own; transports filter their own echoes.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
    writable: bool,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            inner: Arc::new(Mutex::new(MemoryInner::default())),
            writable: true,
        }
    }

    /// A storage that refuses every write, as a browser does when storage is
    /// disabled or over quota.
    pub fn read_only() -> Self {
        MemoryStorage {
            writable: false,
            ..Self::new()
        }
    }

    fn notify(&self, event: StorageEvent) {
        // Listeners run outside the lock so they may read the storage.
        let listeners = self.inner.lock().expect("storage lock poisoned").listeners.clone();
        for listener in listeners {
            listener(&event);
        }
    }

    fn check_writable(&self) -> TabsyncResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(TabsyncError::Storage("storage is read-only".into()))
        }
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> TabsyncResult<Option<String>> {
        let inner = self.inner.lock().expect("storage lock poisoned");
        Ok(inner.items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> TabsyncResult<()> {
        self.check_writable()?;
        self.inner
            .lock()
            .expect("storage lock poisoned")
            .items
            .insert(key.to_string(), value.to_string());
        self.notify(StorageEvent {
            key: key.to_string(),
            new_value: Some(value.to_string()),
        });
        Ok(())
    }

    fn remove_item(&self, key: &str) -> TabsyncResult<()> {
        self.check_writable()?;
        let removed = self
            .inner
            .lock()
            .expect("storage lock poisoned")
            .items
            .remove(key)
            .is_some();
        if removed {
            self.notify(StorageEvent {
                key: key.to_string(),
                new_value: None,
            });
        }
        Ok(())
    }

    fn add_listener(&self, listener: StorageListener) -> TabsyncResult<()> {
        self.inner
            .lock()
            .expect("storage lock poisoned")
            .listeners
            .push(Arc::from(listener));
        Ok(())
    }
}

// ── Directory backend ────────────────────────────────────────────────────────

/// Storage backed by a directory: key `k` lives in `{dir}/k.json`.
pub struct DirStorage {
    dir: PathBuf,
    /// Watchers stay alive as long as the storage does.
    watchers: Mutex<Vec<RecommendedWatcher>>,
}

impl DirStorage {
    /// Open (and create if needed) a storage directory.
    pub fn open(dir: &Path) -> TabsyncResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(DirStorage {
            dir: dir.to_path_buf(),
            watchers: Mutex::new(Vec::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, key: &str) -> TabsyncResult<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl Storage for DirStorage {
    fn get_item(&self, key: &str) -> TabsyncResult<Option<String>> {
        let path = self.slot_path(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> TabsyncResult<()> {
        let path = self.slot_path(key)?;

        // Atomic write: a hidden temp file unique to this write, then rename.
        // Other processes may be writing the same key.
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{key}."))
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;
        debug!(key, path = %path.display(), "storage slot written");
        Ok(())
    }

    fn remove_item(&self, key: &str) -> TabsyncResult<()> {
        let path = self.slot_path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn add_listener(&self, listener: StorageListener) -> TabsyncResult<()> {
        // Last value seen per key: filesystems report one write as several
        // events, listeners only hear about actual changes.
        let mut seen: HashMap<String, Option<String>> = HashMap::new();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "storage watch error");
                        return;
                    }
                };
                if !matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    return;
                }
                for path in &event.paths {
                    let Some(key) = key_for_path(path) else {
                        continue;
                    };
                    let new_value = std::fs::read_to_string(path).ok();
                    if seen.get(&key) == Some(&new_value) {
                        continue;
                    }
                    seen.insert(key.clone(), new_value.clone());
                    listener(&StorageEvent { key, new_value });
                }
            },
            Config::default(),
        )
        .map_err(|e| TabsyncError::Storage(format!("creating watcher: {e}")))?;

        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .map_err(|e| {
                TabsyncError::Storage(format!("watching {}: {e}", self.dir.display()))
            })?;

        self.watchers
            .lock()
            .expect("watcher lock poisoned")
            .push(watcher);
        Ok(())
    }
}

fn validate_key(key: &str) -> TabsyncResult<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && !key.contains(['/', '\\'])
        && key != "..";
    if valid {
        Ok(())
    } else {
        Err(TabsyncError::Storage(format!(
            "key {key:?} cannot be used as a file name"
        )))
    }
}

/// Map a slot file back to its key; temp files and foreign files map to `None`.
fn key_for_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    name.strip_suffix(".json").map(str::to_string)
}
