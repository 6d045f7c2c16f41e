use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use super::selector::ParsedSelector;
use super::{KeyValue, ResultsIterator, StateStore, StoreError, StoreResult};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct StoreSettings {
    pub name: String,
    /// Optional persistence settings loaded from `<store dir>/store.json`.
    #[serde(default)]
    pub persistence: Option<PersistenceSettings>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { name: String::new(), persistence: Some(PersistenceSettings::default()) }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct PersistenceSettings {
    /// Enable periodic snapshotting of the store to disk
    #[serde(default)]
    pub enabled: bool,
    /// Interval in milliseconds between snapshots
    #[serde(default = "PersistenceSettings::default_interval_ms")]
    pub interval_ms: u64,
}

impl PersistenceSettings {
    pub(crate) fn default_interval_ms() -> u64 { 5_000 }
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self { enabled: false, interval_ms: Self::default_interval_ms() }
    }
}

#[derive(Serialize, Deserialize)]
struct SnapEntry { key: String, value: Vec<u8> }

#[derive(Serialize, Deserialize)]
struct Snapshot { version: u32, created_ms: i64, entries: Vec<SnapEntry> }

const SNAPSHOT_VERSION: u32 = 1;

/// In-memory ledger state engine.
///
/// Keys are kept ordered so that selector queries and range scans return entries
/// in a stable order. Clones share the same underlying map.
#[derive(Clone)]
pub struct MemoryStore {
    settings: StoreSettings,
    dir: Option<PathBuf>,
    map: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    open_iterators: Arc<AtomicUsize>,
    /// Guard to ensure we only spawn one persistence thread
    persist_started: Arc<Mutex<bool>>,
    /// Set by [`MemoryStore::shutdown`]; the persistence thread exits on its next tick.
    persist_stop: Arc<AtomicBool>,
    /// Serializes snapshot writers; they share one temp file.
    snapshot_lock: Arc<Mutex<()>>,
}

impl Default for MemoryStore {
    fn default() -> Self { Self::in_memory() }
}

impl MemoryStore {
    /// A store with no backing directory; nothing is ever written to disk.
    pub fn in_memory() -> Self {
        Self {
            settings: StoreSettings { name: "memory".into(), persistence: None },
            dir: None,
            map: Arc::new(RwLock::new(BTreeMap::new())),
            open_iterators: Arc::new(AtomicUsize::new(0)),
            persist_started: Arc::new(Mutex::new(false)),
            persist_stop: Arc::new(AtomicBool::new(false)),
            snapshot_lock: Arc::new(Mutex::new(())),
        }
    }

    /// An empty store backed by `dir`. Any existing snapshot there is not loaded
    /// and will be overwritten by the persistence thread; use [`MemoryStore::open`]
    /// for a populated directory.
    pub fn new(dir: PathBuf, settings: StoreSettings) -> Self {
        let s = Self::unstarted(dir, settings);
        s.ensure_persistence_loop();
        s
    }

    fn unstarted(dir: PathBuf, settings: StoreSettings) -> Self {
        std::fs::create_dir_all(&dir).ok();
        Self { settings, dir: Some(dir), ..Self::in_memory() }
    }

    /// Settings from `<dir>/store.json`, or defaults named `name` when the file is absent.
    pub fn read_settings(dir: &Path, name: &str) -> anyhow::Result<StoreSettings> {
        match std::fs::read(dir.join("store.json")) {
            Ok(bytes) => {
                let settings = serde_json::from_slice::<StoreSettings>(&bytes)?;
                if settings.persistence.as_ref().is_some_and(|p| p.interval_ms == 0) {
                    anyhow::bail!("{}: persistence.interval_ms must be greater than 0", dir.join("store.json").display());
                }
                Ok(settings)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(StoreSettings { name: name.to_string(), ..StoreSettings::default() })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Open a store directory, reading `store.json` if present and loading the last snapshot.
    pub fn load_or_default(dir: PathBuf, name: &str) -> anyhow::Result<Self> {
        let settings = Self::read_settings(&dir, name)?;
        Self::open(dir, settings)
    }

    /// Open a store directory with explicit settings and load the last snapshot.
    /// Periodic snapshots start only once the load has finished.
    pub fn open(dir: PathBuf, settings: StoreSettings) -> anyhow::Result<Self> {
        let store = Self::unstarted(dir, settings);
        store.load_snapshot()?;
        store.ensure_persistence_loop();
        Ok(store)
    }

    pub fn settings(&self) -> &StoreSettings { &self.settings }

    pub fn dir(&self) -> Option<&Path> { self.dir.as_deref() }

    fn snapshot_path(&self) -> Option<PathBuf> { self.dir.as_ref().map(|d| d.join("snapshot.bin")) }

    fn ensure_persistence_loop(&self) {
        let mut started = self.persist_started.lock();
        if *started { return; }
        *started = true;
        drop(started);
        let Some(p) = self.settings.persistence.as_ref().filter(|p| p.enabled) else { return };
        let interval = p.interval_ms.max(1);
        let this = self.clone();
        std::thread::spawn(move || loop {
            std::thread::sleep(std::time::Duration::from_millis(interval));
            if this.persist_stop.load(Ordering::SeqCst) {
                debug!(target: "skillbill::storage", "persistence loop stopped");
                break;
            }
            if let Err(e) = this.save_snapshot() {
                warn!(target: "skillbill::storage", error = %e, "snapshot failed");
            }
        });
    }

    /// Stop the persistence thread shared by this store and its clones. No final
    /// snapshot is written; call [`MemoryStore::save_snapshot`] first if needed.
    pub fn shutdown(&self) {
        self.persist_stop.store(true, Ordering::SeqCst);
    }

    pub fn save_settings(&self) -> anyhow::Result<()> {
        let Some(dir) = &self.dir else { return Ok(()) };
        let bytes = serde_json::to_vec_pretty(&self.settings)?;
        std::fs::write(dir.join("store.json"), bytes)?;
        Ok(())
    }

    /// Write every entry to `snapshot.bin` (temp file + rename).
    pub fn save_snapshot(&self) -> anyhow::Result<()> {
        let Some(path) = self.snapshot_path() else { return Ok(()) };
        let _writer = self.snapshot_lock.lock();
        let entries: Vec<SnapEntry> = self
            .map
            .read()
            .iter()
            .map(|(k, v)| SnapEntry { key: k.clone(), value: v.clone() })
            .collect();
        let count = entries.len();
        let snap = Snapshot { version: SNAPSHOT_VERSION, created_ms: chrono::Utc::now().timestamp_millis(), entries };
        let bytes = bincode::serialize(&snap)?;
        let tmp = path.with_extension("bin.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(tmp, &path)?;
        debug!(target: "skillbill::storage", entries = count, path = %path.display(), "snapshot saved");
        Ok(())
    }

    /// Replace the in-memory contents with the snapshot on disk, if one exists.
    pub fn load_snapshot(&self) -> anyhow::Result<()> {
        let Some(path) = self.snapshot_path() else { return Ok(()) };
        let _writer = self.snapshot_lock.lock();
        if !path.exists() { return Ok(()); }
        let bytes = std::fs::read(&path)?;
        let snap: Snapshot = bincode::deserialize(&bytes)?;
        if snap.version != SNAPSHOT_VERSION {
            anyhow::bail!("unsupported snapshot version {} in {}", snap.version, path.display());
        }
        let mut w = self.map.write();
        w.clear();
        for e in snap.entries {
            w.insert(e.key, e.value);
        }
        debug!(target: "skillbill::storage", entries = w.len(), created_ms = snap.created_ms, "snapshot loaded");
        Ok(())
    }

    pub fn len(&self) -> usize { self.map.read().len() }

    pub fn is_empty(&self) -> bool { self.map.read().is_empty() }

    /// Return a snapshot of all keys in this store
    pub fn keys(&self) -> Vec<String> { self.map.read().keys().cloned().collect() }

    /// Number of result iterators handed out and not yet closed.
    pub fn open_iterators(&self) -> usize { self.open_iterators.load(Ordering::SeqCst) }

    fn track(&self, items: Vec<KeyValue>) -> ResultsIterator {
        self.open_iterators.fetch_add(1, Ordering::SeqCst);
        let counter = Arc::clone(&self.open_iterators);
        ResultsIterator::new(items).with_close_hook(move || {
            counter.fetch_sub(1, Ordering::SeqCst);
        })
    }
}

impl StateStore for MemoryStore {
    fn get_state(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn put_state(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        if key.is_empty() {
            return Err(StoreError::Backend("empty key".into()));
        }
        self.map.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn del_state(&self, key: &str) -> StoreResult<()> {
        self.map.write().remove(key);
        Ok(())
    }

    fn get_query_result(&self, selector: &str) -> StoreResult<ResultsIterator> {
        let parsed = ParsedSelector::parse(selector)?;
        let mut out = Vec::new();
        for (k, v) in self.map.read().iter() {
            // Non-JSON values are invisible to selector queries.
            let Ok(doc) = serde_json::from_slice::<JsonValue>(v) else { continue };
            if !parsed.matches(&doc) { continue; }
            let value = if parsed.has_projection() {
                serde_json::to_vec(&parsed.project(doc)).map_err(|e| StoreError::Backend(e.to_string()))?
            } else {
                v.clone()
            };
            out.push(KeyValue { key: k.clone(), value });
        }
        debug!(target: "skillbill::storage", selector, matches = out.len(), "query evaluated");
        Ok(self.track(out))
    }

    fn get_state_by_range(&self, start: &str, end: &str) -> StoreResult<ResultsIterator> {
        let upper = if end.is_empty() { Bound::Unbounded } else { Bound::Excluded(end) };
        if !end.is_empty() && end < start {
            return Err(StoreError::Backend(format!("invalid range: end '{end}' sorts before start '{start}'")));
        }
        let items: Vec<KeyValue> = self
            .map
            .read()
            .range::<str, _>((Bound::Included(start), upper))
            .map(|(k, v)| KeyValue { key: k.clone(), value: v.clone() })
            .collect();
        Ok(self.track(items))
    }

    fn compare_and_put(&self, key: &str, expected: Option<&[u8]>, value: &[u8]) -> StoreResult<bool> {
        let mut w = self.map.write();
        if w.get(key).map(Vec::as_slice) != expected {
            return Ok(false);
        }
        w.insert(key.to_string(), value.to_vec());
        Ok(true)
    }
}
