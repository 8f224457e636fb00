use crate::replica::local_state::{ElectionRecord, ElectionStore, Epoch, StoreError};
use crate::replica::peers::{DirectoryId, ReplicaId, ReplicaKey};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const DATA_VERSION: u16 = 1;

/// FileElectionStore persists the election record as a small JSON document. Writes go to a
/// sibling `.tmp` file which is fsynced and then renamed over the real one, so a crash leaves
/// either the old record or the new one on disk, never a torn write.
pub struct FileElectionStore {
    path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuorumStateData {
    leader_epoch: u32,
    leader_id: Option<u32>,
    voted_id: Option<u32>,
    voted_directory_id: Option<Uuid>,
    current_voters: Vec<VoterData>,
    data_version: u16,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoterData {
    voter_id: u32,
    directory_id: Option<Uuid>,
}

impl FileElectionStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileElectionStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut file_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        file_name.push(".tmp");
        self.path.with_file_name(file_name)
    }
}

impl ElectionStore for FileElectionStore {
    fn load(&self) -> Result<Option<ElectionRecord>, StoreError> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };
        if contents.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }

        let data: QuorumStateData = serde_json::from_slice(&contents)?;
        if data.data_version != DATA_VERSION {
            return Err(StoreError::UnsupportedVersion(data.data_version));
        }

        Ok(Some(data.into()))
    }

    fn store(&mut self, record: &ElectionRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&QuorumStateData::from(record))?;
        let tmp_path = self.tmp_path();

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &self.path)?;
        sync_parent_dir(&self.path)?;

        Ok(())
    }
}

// The rename isn't durable until the directory entry is.
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()
}

fn directory_to_data(directory_id: DirectoryId) -> Option<Uuid> {
    if directory_id.is_unknown() {
        None
    } else {
        Some(*directory_id.as_uuid())
    }
}

fn directory_from_data(directory_id: Option<Uuid>) -> DirectoryId {
    directory_id.map(DirectoryId::new).unwrap_or(DirectoryId::UNKNOWN)
}

impl From<&ElectionRecord> for QuorumStateData {
    fn from(record: &ElectionRecord) -> Self {
        QuorumStateData {
            leader_epoch: record.epoch.as_u32(),
            leader_id: record.leader_id.map(|id| id.as_u32()),
            voted_id: record.voted_key.map(|key| key.id.as_u32()),
            voted_directory_id: record.voted_key.and_then(|key| directory_to_data(key.directory_id)),
            current_voters: record
                .voters
                .iter()
                .map(|voter| VoterData {
                    voter_id: voter.id.as_u32(),
                    directory_id: directory_to_data(voter.directory_id),
                })
                .collect(),
            data_version: DATA_VERSION,
        }
    }
}

impl From<QuorumStateData> for ElectionRecord {
    fn from(data: QuorumStateData) -> Self {
        let voted_directory_id = data.voted_directory_id;
        ElectionRecord {
            epoch: Epoch::new(data.leader_epoch),
            leader_id: data.leader_id.map(ReplicaId),
            voted_key: data
                .voted_id
                .map(|id| ReplicaKey::new(id, directory_from_data(voted_directory_id))),
            voters: data
                .current_voters
                .into_iter()
                .map(|voter| ReplicaKey::new(voter.voter_id, directory_from_data(voter.directory_id)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn voters() -> BTreeSet<ReplicaKey> {
        vec![
            ReplicaKey::without_directory(1),
            ReplicaKey::new(2, DirectoryId::random()),
            ReplicaKey::new(3, DirectoryId::random()),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = FileElectionStore::new(dir.path().join("quorum-state"));

        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn empty_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quorum-state");
        fs::write(&path, b"").unwrap();

        assert!(FileElectionStore::new(&path).load().unwrap().is_none());
    }

    #[test]
    fn store_then_load() {
        let dir = TempDir::new().unwrap();
        let mut store = FileElectionStore::new(dir.path().join("quorum-state"));

        let voted = ReplicaKey::new(2, DirectoryId::random());
        let record = ElectionRecord::with_elected_leader(Epoch::new(7), ReplicaId(2), Some(voted), voters());
        store.store(&record).unwrap();

        let reopened = FileElectionStore::new(store.path());
        assert_eq!(reopened.load().unwrap(), Some(record));
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn unknown_directory_survives_reload() {
        let dir = TempDir::new().unwrap();
        let mut store = FileElectionStore::new(dir.path().join("quorum-state"));

        let record = ElectionRecord::with_voted_candidate(Epoch::new(5), ReplicaKey::without_directory(1), voters());
        store.store(&record).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert!(loaded.voted_key.unwrap().directory_id.is_unknown());
        assert_eq!(loaded, record);
    }

    #[test]
    fn overwrite_replaces_record() {
        let dir = TempDir::new().unwrap();
        let mut store = FileElectionStore::new(dir.path().join("quorum-state"));

        store
            .store(&ElectionRecord::with_unknown_leader(Epoch::new(1), voters()))
            .unwrap();
        let second = ElectionRecord::with_voted_candidate(Epoch::new(2), ReplicaKey::without_directory(3), voters());
        store.store(&second).unwrap();

        assert_eq!(store.load().unwrap(), Some(second));
    }

    #[test]
    fn directory_sync_failure_is_reported() {
        let dir = TempDir::new().unwrap();

        sync_parent_dir(&dir.path().join("quorum-state")).unwrap();

        let gone = dir.path().join("gone").join("quorum-state");
        assert!(sync_parent_dir(&gone).is_err());
    }

    #[test]
    fn rejects_garbage_and_unknown_versions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quorum-state");

        fs::write(&path, b"{not json").unwrap();
        match FileElectionStore::new(&path).load() {
            Err(StoreError::Malformed(_)) => {}
            other => panic!("Expected Malformed, got {:?}", other),
        }

        fs::write(
            &path,
            br#"{"leaderEpoch":1,"leaderId":null,"votedId":null,"votedDirectoryId":null,"currentVoters":[],"dataVersion":9}"#,
        )
        .unwrap();
        match FileElectionStore::new(&path).load() {
            Err(StoreError::UnsupportedVersion(9)) => {}
            other => panic!("Expected UnsupportedVersion, got {:?}", other),
        }
    }
}
