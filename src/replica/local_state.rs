use crate::replica::peers::{ReplicaId, ReplicaKey};
use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex};

#[derive(Copy, Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Epoch(pub u32);

impl Epoch {
    pub fn new(epoch: u32) -> Self {
        Epoch(epoch)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// None once the epoch space is used up.
    pub fn next(&self) -> Option<Epoch> {
        self.0.checked_add(1).map(Epoch)
    }
}

impl fmt::Debug for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ElectionRecord is the durable projection of a role: everything a replica must remember across
/// a restart to never vote twice in one epoch and never move its epoch backwards.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ElectionRecord {
    pub epoch: Epoch,
    pub leader_id: Option<ReplicaId>,
    pub voted_key: Option<ReplicaKey>,
    pub voters: BTreeSet<ReplicaKey>,
}

impl ElectionRecord {
    pub fn with_unknown_leader(epoch: Epoch, voters: BTreeSet<ReplicaKey>) -> Self {
        ElectionRecord {
            epoch,
            leader_id: None,
            voted_key: None,
            voters,
        }
    }

    pub fn with_voted_candidate(epoch: Epoch, voted_key: ReplicaKey, voters: BTreeSet<ReplicaKey>) -> Self {
        ElectionRecord {
            epoch,
            leader_id: None,
            voted_key: Some(voted_key),
            voters,
        }
    }

    pub fn with_elected_leader(
        epoch: Epoch,
        leader_id: ReplicaId,
        voted_key: Option<ReplicaKey>,
        voters: BTreeSet<ReplicaKey>,
    ) -> Self {
        ElectionRecord {
            epoch,
            leader_id: Some(leader_id),
            voted_key,
            voters,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO failure accessing election record: {0:?}")]
    Io(#[from] io::Error),
    #[error("Malformed election record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unsupported election record data version {0}")]
    UnsupportedVersion(u16),
}

/// ElectionStore is the durable home of the `ElectionRecord`. A `store()` that returns `Ok` must
/// have made the record durable; the controller will not expose a new role before that.
pub trait ElectionStore {
    fn load(&self) -> Result<Option<ElectionRecord>, StoreError>;
    fn store(&mut self, record: &ElectionRecord) -> Result<(), StoreError>;
}

/// VolatileElectionStore keeps the record in RAM. Clones share the same record, which lets a
/// test hand one clone to a controller, drop the controller, and "restart" from another clone.
#[derive(Clone, Default)]
pub struct VolatileElectionStore {
    record: Arc<Mutex<Option<ElectionRecord>>>,
}

impl VolatileElectionStore {
    pub fn new() -> Self {
        VolatileElectionStore::default()
    }

    pub fn with_record(record: ElectionRecord) -> Self {
        VolatileElectionStore {
            record: Arc::new(Mutex::new(Some(record))),
        }
    }
}

impl ElectionStore for VolatileElectionStore {
    fn load(&self) -> Result<Option<ElectionRecord>, StoreError> {
        Ok(self
            .record
            .lock()
            .expect("VolatileElectionStore.load() mutex guard poison")
            .clone())
    }

    fn store(&mut self, record: &ElectionRecord) -> Result<(), StoreError> {
        self.record
            .lock()
            .expect("VolatileElectionStore.store() mutex guard poison")
            .replace(record.clone());
        Ok(())
    }
}
