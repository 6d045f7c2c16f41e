use std::path::PathBuf;

use crate::storage::{MemoryStore, StoreSettings};

pub const ENV_DATA_DIR: &str = "SKILLBILL_DATA_DIR";
pub const ENV_SNAPSHOT: &str = "SKILLBILL_SNAPSHOT";
pub const ENV_SNAPSHOT_INTERVAL_MS: &str = "SKILLBILL_SNAPSHOT_INTERVAL_MS";
pub const ENV_MSPID: &str = "SKILLBILL_MSPID";

pub const DEFAULT_DATA_DIR: &str = "ledger";
pub const DEFAULT_MSPID: &str = "Org1MSP";
pub const STORE_NAME: &str = "skillbill";

/// Runtime configuration for the admin binary.
///
/// Environment values override what `<data_dir>/store.json` says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub data_dir: PathBuf,
    pub snapshot: Option<bool>,
    pub snapshot_interval_ms: Option<u64>,
    pub mspid: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { data_dir: PathBuf::from(DEFAULT_DATA_DIR), snapshot: None, snapshot_interval_ms: None, mspid: DEFAULT_MSPID.to_string() }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Self { Self::from_lookup(|k| std::env::var(k).ok()) }

    /// Build from an arbitrary variable source. Unparsable values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|s| !s.trim().is_empty()) {
            cfg.data_dir = PathBuf::from(dir);
        }
        cfg.snapshot = lookup(ENV_SNAPSHOT).and_then(|s| parse_flag(&s));
        cfg.snapshot_interval_ms = lookup(ENV_SNAPSHOT_INTERVAL_MS).and_then(|s| s.trim().parse::<u64>().ok()).filter(|ms| *ms > 0);
        if let Some(mspid) = lookup(ENV_MSPID).filter(|s| !s.trim().is_empty()) {
            cfg.mspid = mspid;
        }
        cfg
    }

    /// Merge the environment overrides into settings read from disk.
    pub fn apply(&self, mut settings: StoreSettings) -> StoreSettings {
        if self.snapshot.is_some() || self.snapshot_interval_ms.is_some() {
            let p = settings.persistence.get_or_insert_with(Default::default);
            if let Some(enabled) = self.snapshot {
                p.enabled = enabled;
            }
            if let Some(ms) = self.snapshot_interval_ms {
                p.interval_ms = ms;
            }
        }
        settings
    }

    pub fn open_store(&self) -> anyhow::Result<MemoryStore> {
        let settings = self.apply(MemoryStore::read_settings(&self.data_dir, STORE_NAME)?);
        MemoryStore::open(self.data_dir.clone(), settings)
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
