use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// ReplicaId is the numeric id a cluster member is configured with. Log matching only ever
/// cares about this part of a member's identity.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ReplicaId(pub u32);

impl ReplicaId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// DirectoryId identifies the storage instance a replica runs against. A replica that restarts
/// on a wiped volume comes back with the same `ReplicaId` but a new `DirectoryId`.
///
/// `DirectoryId::UNKNOWN` is a real value, not an absence: it is what we record for replicas
/// that never reported a directory, and it has its own matching rules during vote
/// reconciliation.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DirectoryId(Uuid);

impl DirectoryId {
    pub const UNKNOWN: DirectoryId = DirectoryId(Uuid::nil());

    pub fn new(uuid: Uuid) -> Self {
        DirectoryId(uuid)
    }

    pub fn random() -> Self {
        // v4 can technically produce the nil uuid. It won't, but don't hand out the sentinel.
        loop {
            let uuid = Uuid::new_v4();
            if !uuid.is_nil() {
                return DirectoryId(uuid);
            }
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.0.is_nil()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for DirectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            write!(f, "?")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// ReplicaKey is the full identity of one physical replica instance. Equality is structural:
/// `(1, UNKNOWN)` and `(1, <some dir>)` are different keys.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ReplicaKey {
    pub id: ReplicaId,
    pub directory_id: DirectoryId,
}

impl ReplicaKey {
    pub fn new(id: u32, directory_id: DirectoryId) -> Self {
        ReplicaKey {
            id: ReplicaId(id),
            directory_id,
        }
    }

    pub fn without_directory(id: u32) -> Self {
        Self::new(id, DirectoryId::UNKNOWN)
    }
}

impl fmt::Debug for ReplicaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.directory_id.is_unknown() {
            write!(f, "{:?}", self.id)
        } else {
            write!(f, "{:?}/{:?}", self.id, self.directory_id)
        }
    }
}

/// A voter configured without a directory accepts any directory reported under its id. A voter
/// configured with a directory only matches that exact directory.
pub(crate) fn is_voter(voters: &BTreeSet<ReplicaKey>, key: &ReplicaKey) -> bool {
    voter_key(voters, key).is_some()
}

/// Returns the configured voter entry that `key` resolves to.
pub(crate) fn voter_key(voters: &BTreeSet<ReplicaKey>, key: &ReplicaKey) -> Option<ReplicaKey> {
    voters
        .iter()
        .find(|voter| voter.id == key.id && (voter.directory_id.is_unknown() || voter.directory_id == key.directory_id))
        .copied()
}

pub(crate) fn majority(num_voters: usize) -> usize {
    (num_voters / 2) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replica_key_equality_is_structural() {
        let dir = DirectoryId::random();

        assert_eq!(ReplicaKey::new(1, dir), ReplicaKey::new(1, dir));
        assert_ne!(ReplicaKey::new(1, dir), ReplicaKey::without_directory(1));
        assert_ne!(ReplicaKey::new(1, dir), ReplicaKey::new(2, dir));
        assert_ne!(ReplicaKey::new(1, dir), ReplicaKey::new(1, DirectoryId::random()));
    }

    #[test]
    fn random_directory_is_never_unknown() {
        for _ in 0..100 {
            assert!(!DirectoryId::random().is_unknown());
        }
        assert!(DirectoryId::UNKNOWN.is_unknown());
    }

    #[test]
    fn voter_matching() {
        let dir = DirectoryId::random();
        let mut voters = BTreeSet::new();
        voters.insert(ReplicaKey::without_directory(1));
        voters.insert(ReplicaKey::new(2, dir));

        // Voter 1 was configured without a directory.
        assert!(is_voter(&voters, &ReplicaKey::without_directory(1)));
        assert!(is_voter(&voters, &ReplicaKey::new(1, DirectoryId::random())));

        // Voter 2 pins its directory.
        assert!(is_voter(&voters, &ReplicaKey::new(2, dir)));
        assert!(!is_voter(&voters, &ReplicaKey::new(2, DirectoryId::random())));
        assert!(!is_voter(&voters, &ReplicaKey::without_directory(2)));

        assert!(!is_voter(&voters, &ReplicaKey::without_directory(3)));
    }

    #[test]
    fn majority_count() {
        assert_eq!(majority(1), 1);
        assert_eq!(majority(2), 2);
        assert_eq!(majority(3), 2);
        assert_eq!(majority(4), 3);
        assert_eq!(majority(5), 3);
    }
}
