use anyhow::{Context, Result, bail};
use declarative::{RecordStore, ReconciliationRecord, ResourceAddress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const STATE_VERSION: u32 = 1;

// ============================================================================
// State File
// ============================================================================

/// On-disk layout of the state file
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    #[serde(default)]
    records: Vec<ReconciliationRecord>,
}

/// Record store backed by a TOML file.
///
/// Every save or remove rewrites the whole file, so a crash mid-apply loses
/// at most the step in flight.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    records: Mutex<BTreeMap<ResourceAddress, ReconciliationRecord>>,
}

impl FileStore {
    /// Open the state file, starting empty if it does not exist
    pub fn open(path: &Path) -> Result<Self> {
        let records = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read state file: {}", path.display()))?;
            let file: StateFile = toml::from_str(&content)
                .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
            if file.version != STATE_VERSION {
                bail!(
                    "Unsupported state file version {} in {}",
                    file.version,
                    path.display()
                );
            }
            log::debug!(
                "Loaded {} records from {}",
                file.records.len(),
                path.display()
            );
            file.records
                .into_iter()
                .map(|r| (r.address.clone(), r))
                .collect()
        } else {
            log::debug!("State file does not exist, starting empty");
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ResourceAddress, ReconciliationRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn persist(&self, records: &BTreeMap<ResourceAddress, ReconciliationRecord>) -> Result<()> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let file = StateFile {
            version: STATE_VERSION,
            records: records.values().cloned().collect(),
        };
        let content =
            toml::to_string_pretty(&file).context("Failed to serialize state to TOML")?;

        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace state file: {}", self.path.display()))?;

        log::debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}

impl RecordStore for FileStore {
    fn load(&self, address: &ResourceAddress) -> Result<Option<ReconciliationRecord>> {
        Ok(self.lock().get(address).cloned())
    }

    // memory only changes once the file is written
    fn save(&self, record: &ReconciliationRecord) -> Result<()> {
        let mut records = self.lock();
        let mut next = records.clone();
        next.insert(record.address.clone(), record.clone());
        self.persist(&next)?;
        *records = next;
        Ok(())
    }

    fn remove(&self, address: &ResourceAddress) -> Result<()> {
        let mut records = self.lock();
        let mut next = records.clone();
        if next.remove(address).is_some() {
            self.persist(&next)?;
            *records = next;
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<ReconciliationRecord>> {
        Ok(self.lock().values().cloned().collect())
    }
}
