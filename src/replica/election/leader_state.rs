use crate::replica::election::timers::ElectionTimer;
use crate::replica::endpoints::Endpoints;
use crate::replica::local_state::{ElectionRecord, Epoch};
use crate::replica::peers::{self, ReplicaKey};
use std::collections::{BTreeMap, BTreeSet};
use tokio::time::Instant;

/// LeaderState tracks how far each voter has replicated the log, and whether a majority is still
/// talking to us. Like every role it is immutable: progress updates return a new instance.
#[derive(Clone, Debug)]
pub struct LeaderState {
    epoch: Epoch,
    local: ReplicaKey,
    voters: BTreeSet<ReplicaKey>,
    endpoints: Endpoints,
    // Keyed by the configured voter key, local replica included.
    replicated_offsets: BTreeMap<ReplicaKey, Option<u64>>,
    high_watermark: Option<u64>,
    check_quorum_timer: ElectionTimer,
    // Voters we've heard from since `check_quorum_timer` was last restarted.
    contacted_since_check: BTreeSet<ReplicaKey>,
}

impl LeaderState {
    pub(crate) fn new(
        epoch: Epoch,
        local: ReplicaKey,
        voters: BTreeSet<ReplicaKey>,
        endpoints: Endpoints,
        check_quorum_timer: ElectionTimer,
        high_watermark: Option<u64>,
    ) -> Self {
        let replicated_offsets = voters.iter().map(|voter| (*voter, None)).collect();
        LeaderState {
            epoch,
            local,
            voters,
            endpoints,
            replicated_offsets,
            high_watermark,
            check_quorum_timer,
            contacted_since_check: BTreeSet::new(),
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn local(&self) -> &ReplicaKey {
        &self.local
    }

    pub fn voters(&self) -> &BTreeSet<ReplicaKey> {
        &self.voters
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn high_watermark(&self) -> Option<u64> {
        self.high_watermark
    }

    pub fn check_quorum_timer(&self) -> &ElectionTimer {
        &self.check_quorum_timer
    }

    /// Replicated offset of every voter other than ourselves.
    pub fn followers(&self) -> impl Iterator<Item = (&ReplicaKey, Option<u64>)> {
        let local_id = self.local.id;
        self.replicated_offsets
            .iter()
            .filter(move |(key, _)| key.id != local_id)
            .map(|(key, offset)| (key, *offset))
    }

    pub fn replicated_offset(&self, replica: &ReplicaKey) -> Option<u64> {
        self.voter_key(replica)
            .and_then(|key| self.replicated_offsets.get(&key).copied().flatten())
    }

    pub fn election(&self) -> ElectionRecord {
        ElectionRecord::with_elected_leader(self.epoch, self.local.id, Some(self.local), self.voters.clone())
    }

    /// The leader counts itself, so a single-voter quorum always holds.
    pub fn has_check_quorum_expired(&self, now: Instant) -> bool {
        self.check_quorum_timer.is_expired(now) && !self.has_majority_contact()
    }

    /// Returns None if `replica` is not a voter; observers don't count towards the quorum.
    pub(crate) fn with_follower_fetch(&self, replica: &ReplicaKey, end_offset: u64, now: Instant) -> Option<Self> {
        let key = self.voter_key(replica)?;
        let mut next = self.clone();
        next.replicated_offsets.insert(key, Some(end_offset));
        next.contacted_since_check.insert(key);
        if next.has_majority_contact() {
            next.check_quorum_timer = ElectionTimer::new(now, self.check_quorum_timer.timeout());
            next.contacted_since_check.clear();
        }
        next.ratchet_high_watermark();

        Some(next)
    }

    pub(crate) fn with_local_end_offset(&self, end_offset: u64) -> Self {
        let mut next = self.clone();
        if let Some(key) = self.voter_key(&self.local) {
            next.replicated_offsets.insert(key, Some(end_offset));
        }
        next.ratchet_high_watermark();
        next
    }

    /// Restart the check-quorum window, used when the previous window closed with a majority.
    pub(crate) fn with_restarted_check_quorum(&self, now: Instant) -> Self {
        let mut next = self.clone();
        next.check_quorum_timer = ElectionTimer::new(now, self.check_quorum_timer.timeout());
        next.contacted_since_check.clear();
        next
    }

    fn has_majority_contact(&self) -> bool {
        let local_is_voter = self.voter_key(&self.local).is_some();
        let contacted = self.contacted_since_check.len() + if local_is_voter { 1 } else { 0 };
        contacted >= peers::majority(self.voters.len())
    }

    fn ratchet_high_watermark(&mut self) {
        let offsets = self.replicated_offsets.values().copied().collect();
        if let Some(candidate) = Self::quorum_offset(offsets) {
            if self.high_watermark.map_or(true, |hw| candidate > hw) {
                self.high_watermark = Some(candidate);
            }
        }
    }

    /// Largest offset that a majority of voters have replicated.
    fn quorum_offset(mut offsets: Vec<Option<u64>>) -> Option<u64> {
        if offsets.is_empty() {
            return None;
        }
        // None sorts first, so unknown progress never props up the quorum.
        offsets.sort();

        // After sorting ascending, the `majority`th value from the right is replicated by
        // exactly a majority of voters.
        let quorum_idx = offsets.len() - peers::majority(offsets.len());
        offsets.remove(quorum_idx)
    }

    fn voter_key(&self, replica: &ReplicaKey) -> Option<ReplicaKey> {
        peers::voter_key(&self.voters, replica)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    fn keys(ids: &[u32]) -> BTreeSet<ReplicaKey> {
        ids.iter().map(|id| ReplicaKey::without_directory(*id)).collect()
    }

    fn leader(ids: &[u32], now: Instant) -> LeaderState {
        LeaderState::new(
            Epoch::new(3),
            ReplicaKey::without_directory(ids[0]),
            keys(ids),
            Endpoints::empty(),
            ElectionTimer::new(now, Duration::from_millis(300)),
            None,
        )
    }

    fn opt_offset(v: u64) -> Option<u64> {
        if v == 0 {
            None
        } else {
            Some(v)
        }
    }

    #[test]
    fn test_quorum_offset_logic() {
        fn run(expected: u64, offsets: Vec<u64>) {
            let offsets = offsets.into_iter().map(opt_offset).collect();
            assert_eq!(opt_offset(expected), LeaderState::quorum_offset(offsets));
        }

        // 1-cluster
        run(9, vec![9]);

        // 3-cluster
        run(0, vec![0, 0, 9]);
        run(8, vec![0, 8, 9]);
        run(8, vec![7, 8, 9]);

        // 4-cluster
        run(0, vec![0, 0, 8, 9]);
        run(7, vec![0, 7, 8, 9]);
        run(7, vec![6, 7, 8, 9]);

        // 5-cluster
        run(0, vec![0, 0, 0, 8, 9]);
        run(7, vec![0, 0, 7, 8, 9]);
        run(7, vec![5, 6, 7, 8, 9]);

        // Ordering doesn't matter
        run(8, vec![9, 8, 0]);
        run(7, vec![9, 0, 8, 0, 7]);
    }

    #[test]
    fn high_watermark_follows_majority_and_never_regresses() {
        let now = Instant::now();
        let state = leader(&[1, 2, 3], now);
        assert_eq!(state.high_watermark(), None);

        let state = state.with_local_end_offset(10);
        assert_eq!(state.high_watermark(), None);

        let state = state
            .with_follower_fetch(&ReplicaKey::without_directory(2), 6, now)
            .unwrap();
        assert_eq!(state.high_watermark(), Some(6));

        let state = state
            .with_follower_fetch(&ReplicaKey::without_directory(3), 10, now)
            .unwrap();
        assert_eq!(state.high_watermark(), Some(10));

        // Follower 3 truncated; the high watermark already committed stays put.
        let state = state
            .with_follower_fetch(&ReplicaKey::without_directory(3), 2, now)
            .unwrap();
        assert_eq!(state.high_watermark(), Some(10));
        assert_eq!(state.replicated_offset(&ReplicaKey::without_directory(3)), Some(2));
    }

    #[test]
    fn followers_excludes_local() {
        let state = leader(&[1, 2, 3], Instant::now());
        let followers: Vec<_> = state.followers().map(|(key, _)| key.id.as_u32()).collect();

        assert_eq!(followers, vec![2, 3]);
    }

    #[test]
    fn observers_are_not_tracked() {
        let now = Instant::now();
        let state = leader(&[1, 2, 3], now);

        assert!(state
            .with_follower_fetch(&ReplicaKey::without_directory(9), 5, now)
            .is_none());
    }

    #[test]
    fn check_quorum() {
        let start = Instant::now();
        let state = leader(&[1, 2, 3, 4, 5], start);
        let expired = start + Duration::from_millis(300);

        assert!(!state.has_check_quorum_expired(start));
        assert!(state.has_check_quorum_expired(expired));

        // One follower plus ourselves is not a majority of five.
        let state = state
            .with_follower_fetch(&ReplicaKey::without_directory(2), 1, start + Duration::from_millis(100))
            .unwrap();
        assert!(state.has_check_quorum_expired(expired));

        // Second follower completes the majority and restarts the window.
        let contact = start + Duration::from_millis(200);
        let state = state
            .with_follower_fetch(&ReplicaKey::without_directory(3), 1, contact)
            .unwrap();
        assert!(!state.has_check_quorum_expired(expired));
        assert!(state.has_check_quorum_expired(contact + Duration::from_millis(300)));
    }

    #[test]
    fn single_voter_never_loses_quorum() {
        let start = Instant::now();
        let state = leader(&[1], start);

        assert!(!state.has_check_quorum_expired(start + Duration::from_secs(60)));
    }
}
