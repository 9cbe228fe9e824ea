//! Reconciliation records: the prior state persisted between cycles

use crate::model::{AssociationKind, EntityKind, FieldSet, ResourceAddress};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Lifecycle position of a managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Absent,
    Planned,
    Creating,
    Created,
    Updating,
    Replacing,
    Deleting,
    /// Created and a re-plan after apply found nothing to do
    Converged,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absent => "absent",
            Self::Planned => "planned",
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Updating => "updating",
            Self::Replacing => "replacing",
            Self::Deleting => "deleting",
            Self::Converged => "converged",
        };
        f.write_str(name)
    }
}

/// What a record tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Entity(EntityKind),
    /// Standalone association set; the record id is the parent id
    Association(AssociationKind),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(kind) => fmt::Display::fmt(kind, f),
            Self::Association(kind) => fmt::Display::fmt(kind, f),
        }
    }
}

/// Observed and managed members of one association set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberState {
    pub kind: AssociationKind,
    /// Members last read back from the remote service
    #[serde(default)]
    pub observed: BTreeSet<String>,
    /// Members this system added or was told to manage
    #[serde(default)]
    pub managed: BTreeSet<String>,
}

impl MemberState {
    pub fn new(kind: AssociationKind) -> Self {
        Self {
            kind,
            observed: BTreeSet::new(),
            managed: BTreeSet::new(),
        }
    }
}

/// Prior state of one managed resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub address: ResourceAddress,
    pub subject: Subject,
    /// Remote id; never known before the first successful create
    pub id: Option<String>,
    pub state: Lifecycle,
    #[serde(default)]
    pub observed: FieldSet,
    #[serde(default)]
    pub members: Vec<MemberState>,
    /// Failure of the last apply step, if it failed
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ReconciliationRecord {
    pub fn new(address: ResourceAddress, subject: Subject) -> Self {
        Self {
            address,
            subject,
            id: None,
            state: Lifecycle::Absent,
            observed: FieldSet::new(),
            members: Vec::new(),
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn member_state(&self, kind: AssociationKind) -> Option<&MemberState> {
        self.members.iter().find(|m| m.kind == kind)
    }

    /// Member state of `kind`, inserted in kind order if missing
    pub fn member_state_mut(&mut self, kind: AssociationKind) -> &mut MemberState {
        let index = match self.members.binary_search_by(|m| m.kind.cmp(&kind)) {
            Ok(index) => index,
            Err(index) => {
                self.members.insert(index, MemberState::new(kind));
                index
            }
        };
        &mut self.members[index]
    }

    /// Observed members of `kind`, empty when never read
    pub fn observed_members(&self, kind: AssociationKind) -> BTreeSet<String> {
        self.member_state(kind)
            .map(|m| m.observed.clone())
            .unwrap_or_default()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Storage of reconciliation records keyed by resource address.
///
/// A pass exclusively owns the record it loads until it saves it; the
/// store itself only needs to be safe for concurrent use on distinct keys.
pub trait RecordStore: Send + Sync {
    fn load(&self, address: &ResourceAddress) -> Result<Option<ReconciliationRecord>>;

    fn save(&self, record: &ReconciliationRecord) -> Result<()>;

    fn remove(&self, address: &ResourceAddress) -> Result<()>;

    /// All records ordered by address
    fn list(&self) -> Result<Vec<ReconciliationRecord>>;
}

/// In-memory record store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<ResourceAddress, ReconciliationRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = ReconciliationRecord>) -> Self {
        Self {
            records: Mutex::new(
                records
                    .into_iter()
                    .map(|r| (r.address.clone(), r))
                    .collect(),
            ),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ResourceAddress, ReconciliationRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl RecordStore for MemoryStore {
    fn load(&self, address: &ResourceAddress) -> Result<Option<ReconciliationRecord>> {
        Ok(self.lock().get(address).cloned())
    }

    fn save(&self, record: &ReconciliationRecord) -> Result<()> {
        self.lock().insert(record.address.clone(), record.clone());
        Ok(())
    }

    fn remove(&self, address: &ResourceAddress) -> Result<()> {
        self.lock().remove(address);
        Ok(())
    }

    fn list(&self) -> Result<Vec<ReconciliationRecord>> {
        Ok(self.lock().values().cloned().collect())
    }
}
