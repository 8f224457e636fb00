use crate::replica::election::timers::ElectionTimer;
use crate::replica::election::vote_policy;
use crate::replica::election::LeaderState;
use crate::replica::endpoints::Endpoints;
use crate::replica::local_state::{ElectionRecord, Epoch};
use crate::replica::peers::{self, ReplicaId, ReplicaKey};
use std::collections::BTreeSet;
use std::fmt;
use tokio::time::Instant;

/// QuorumRole is the role the local replica occupies in the current epoch. A role value is never
/// mutated after construction; every transition (and every bit of progress bookkeeping) builds a
/// new one.
#[derive(Clone, Debug)]
pub enum QuorumRole {
    Unattached(UnattachedState),
    Candidate(CandidateState),
    Leader(LeaderState),
    Follower(FollowerState),
    Resigned(ResignedState),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RoleKind {
    Unattached,
    Candidate,
    Leader,
    Follower,
    Resigned,
}

impl QuorumRole {
    pub fn kind(&self) -> RoleKind {
        match self {
            QuorumRole::Unattached(_) => RoleKind::Unattached,
            QuorumRole::Candidate(_) => RoleKind::Candidate,
            QuorumRole::Leader(_) => RoleKind::Leader,
            QuorumRole::Follower(_) => RoleKind::Follower,
            QuorumRole::Resigned(_) => RoleKind::Resigned,
        }
    }

    pub fn epoch(&self) -> Epoch {
        match self {
            QuorumRole::Unattached(s) => s.epoch,
            QuorumRole::Candidate(s) => s.epoch,
            QuorumRole::Leader(s) => s.epoch(),
            QuorumRole::Follower(s) => s.epoch,
            QuorumRole::Resigned(s) => s.epoch,
        }
    }

    pub fn voted_key(&self) -> Option<&ReplicaKey> {
        match self {
            QuorumRole::Unattached(s) => s.voted_key.as_ref(),
            QuorumRole::Candidate(s) => s.voted_key.as_ref(),
            QuorumRole::Leader(s) => Some(s.local()),
            QuorumRole::Follower(s) => s.voted_key.as_ref(),
            QuorumRole::Resigned(s) => Some(&s.local),
        }
    }

    pub fn leader_id(&self) -> Option<ReplicaId> {
        match self {
            QuorumRole::Unattached(s) => s.leader_id,
            QuorumRole::Candidate(s) => s.leader_id,
            QuorumRole::Leader(s) => Some(s.local().id),
            QuorumRole::Follower(s) => Some(s.leader_id),
            QuorumRole::Resigned(s) => Some(s.local.id),
        }
    }

    /// Empty unless we know how to reach the current leader.
    pub fn leader_endpoints(&self) -> Endpoints {
        match self {
            QuorumRole::Leader(s) => s.endpoints().clone(),
            QuorumRole::Follower(s) => s.leader_endpoints.clone(),
            QuorumRole::Unattached(_) | QuorumRole::Candidate(_) | QuorumRole::Resigned(_) => Endpoints::empty(),
        }
    }

    pub fn voters(&self) -> &BTreeSet<ReplicaKey> {
        match self {
            QuorumRole::Unattached(s) => &s.voters,
            QuorumRole::Candidate(s) => &s.voters,
            QuorumRole::Leader(s) => s.voters(),
            QuorumRole::Follower(s) => &s.voters,
            QuorumRole::Resigned(s) => &s.voters,
        }
    }

    pub fn high_watermark(&self) -> Option<u64> {
        match self {
            QuorumRole::Unattached(s) => s.high_watermark,
            QuorumRole::Candidate(s) => s.high_watermark,
            QuorumRole::Leader(s) => s.high_watermark(),
            QuorumRole::Follower(s) => s.high_watermark,
            QuorumRole::Resigned(s) => s.high_watermark,
        }
    }

    pub fn election(&self) -> ElectionRecord {
        match self {
            QuorumRole::Unattached(s) => s.election(),
            QuorumRole::Candidate(s) => s.election(),
            QuorumRole::Leader(s) => s.election(),
            QuorumRole::Follower(s) => s.election(),
            QuorumRole::Resigned(s) => s.election(),
        }
    }

    /// The timer that drives this role's next time-based transition: the election timeout for
    /// Unattached, Candidate and Resigned, the fetch timeout for Follower, and the check-quorum
    /// timeout for Leader.
    pub fn timer(&self) -> &ElectionTimer {
        match self {
            QuorumRole::Unattached(s) => &s.election_timer,
            QuorumRole::Candidate(s) => &s.election_timer,
            QuorumRole::Leader(s) => s.check_quorum_timer(),
            QuorumRole::Follower(s) => &s.fetch_timer,
            QuorumRole::Resigned(s) => &s.election_timer,
        }
    }

    pub fn remaining_election_time_ms(&self, now: Instant) -> u64 {
        self.timer().remaining_ms(now)
    }

    pub fn has_election_timeout_expired(&self, now: Instant) -> bool {
        self.timer().is_expired(now)
    }

    /// Only Unattached and Candidate have a vote to give. Leader, Follower and Resigned already
    /// know who leads this epoch.
    pub fn can_grant_vote(&self, candidate: &ReplicaKey, candidate_log_up_to_date: bool, is_pre_vote: bool) -> bool {
        match self {
            QuorumRole::Unattached(s) => s.can_grant_vote(candidate, candidate_log_up_to_date, is_pre_vote),
            QuorumRole::Candidate(s) => s.can_grant_vote(candidate, candidate_log_up_to_date, is_pre_vote),
            QuorumRole::Leader(_) | QuorumRole::Follower(_) | QuorumRole::Resigned(_) => false,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.kind() == RoleKind::Leader
    }
}

impl fmt::Display for QuorumRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuorumRole::Unattached(s) => write!(
                f,
                "Unattached(Epoch={:?}, Voted={:?}, Leader={:?})",
                s.epoch, s.voted_key, s.leader_id
            ),
            QuorumRole::Candidate(s) => write!(
                f,
                "Candidate(Epoch={:?}, Round={:?}, Granted={}/{})",
                s.epoch,
                s.round,
                s.granted_by.len(),
                s.voters.len()
            ),
            QuorumRole::Leader(s) => write!(f, "Leader(Epoch={:?}, Local={:?})", s.epoch(), s.local()),
            QuorumRole::Follower(s) => write!(f, "Follower(Epoch={:?}, Leader={:?})", s.epoch, s.leader_id),
            QuorumRole::Resigned(s) => write!(f, "Resigned(Epoch={:?})", s.epoch),
        }
    }
}

/// We don't know of a leader for this epoch. We may have voted.
#[derive(Clone, Debug)]
pub struct UnattachedState {
    epoch: Epoch,
    // Only ever set when restored from disk; endpoints for it are unknown.
    leader_id: Option<ReplicaId>,
    voted_key: Option<ReplicaKey>,
    voters: BTreeSet<ReplicaKey>,
    high_watermark: Option<u64>,
    election_timer: ElectionTimer,
}

impl UnattachedState {
    pub fn new(
        epoch: Epoch,
        leader_id: Option<ReplicaId>,
        voted_key: Option<ReplicaKey>,
        voters: BTreeSet<ReplicaKey>,
        high_watermark: Option<u64>,
        election_timer: ElectionTimer,
    ) -> Self {
        UnattachedState {
            epoch,
            leader_id,
            voted_key,
            voters,
            high_watermark,
            election_timer,
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn voted_key(&self) -> Option<&ReplicaKey> {
        self.voted_key.as_ref()
    }

    pub fn election(&self) -> ElectionRecord {
        ElectionRecord {
            epoch: self.epoch,
            leader_id: self.leader_id,
            voted_key: self.voted_key,
            voters: self.voters.clone(),
        }
    }

    pub fn can_grant_vote(&self, candidate: &ReplicaKey, candidate_log_up_to_date: bool, is_pre_vote: bool) -> bool {
        vote_policy::can_grant_vote(self.voted_key.as_ref(), candidate, candidate_log_up_to_date, is_pre_vote)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VoteRound {
    /// Non-binding straw poll. Nothing about it is persisted and the epoch doesn't move.
    PreVote,
    /// Real election at a freshly bumped epoch, with our vote cast for ourselves.
    Binding,
}

/// We're asking for votes.
///
/// During the pre-vote round the role stays at the current epoch and keeps whatever vote and
/// leader it inherited, and solicits at `epoch + 1`. Only when a majority grants the pre-vote does
/// the binding round bump the epoch and vote for ourselves.
#[derive(Clone, Debug)]
pub struct CandidateState {
    epoch: Epoch,
    local: ReplicaKey,
    round: VoteRound,
    campaign_epoch: Epoch,
    leader_id: Option<ReplicaId>,
    voted_key: Option<ReplicaKey>,
    voters: BTreeSet<ReplicaKey>,
    granted_by: BTreeSet<ReplicaKey>,
    rejected_by: BTreeSet<ReplicaKey>,
    high_watermark: Option<u64>,
    election_timer: ElectionTimer,
}

impl CandidateState {
    /// None if `epoch` is the last one there is, since there'd be nothing to campaign for.
    pub(crate) fn new_pre_vote(
        epoch: Epoch,
        local: ReplicaKey,
        leader_id: Option<ReplicaId>,
        voted_key: Option<ReplicaKey>,
        voters: BTreeSet<ReplicaKey>,
        high_watermark: Option<u64>,
        election_timer: ElectionTimer,
    ) -> Option<Self> {
        let campaign_epoch = epoch.next()?;
        Some(Self::new(
            epoch,
            local,
            VoteRound::PreVote,
            campaign_epoch,
            leader_id,
            voted_key,
            voters,
            high_watermark,
            election_timer,
        ))
    }

    pub(crate) fn new_binding(
        epoch: Epoch,
        local: ReplicaKey,
        voters: BTreeSet<ReplicaKey>,
        high_watermark: Option<u64>,
        election_timer: ElectionTimer,
    ) -> Self {
        Self::new(
            epoch,
            local,
            VoteRound::Binding,
            epoch,
            None,
            Some(local),
            voters,
            high_watermark,
            election_timer,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn new(
        epoch: Epoch,
        local: ReplicaKey,
        round: VoteRound,
        campaign_epoch: Epoch,
        leader_id: Option<ReplicaId>,
        voted_key: Option<ReplicaKey>,
        voters: BTreeSet<ReplicaKey>,
        high_watermark: Option<u64>,
        election_timer: ElectionTimer,
    ) -> Self {
        let mut granted_by = BTreeSet::new();
        // We implicitly vote for ourselves in either round.
        if let Some(local_voter) = peers::voter_key(&voters, &local) {
            granted_by.insert(local_voter);
        }

        CandidateState {
            epoch,
            local,
            round,
            campaign_epoch,
            leader_id,
            voted_key,
            voters,
            granted_by,
            rejected_by: BTreeSet::new(),
            high_watermark,
            election_timer,
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn local(&self) -> &ReplicaKey {
        &self.local
    }

    pub fn voted_key(&self) -> Option<&ReplicaKey> {
        self.voted_key.as_ref()
    }

    pub fn round(&self) -> VoteRound {
        self.round
    }

    pub fn is_pre_vote_round(&self) -> bool {
        self.round == VoteRound::PreVote
    }

    /// The epoch our vote requests carry.
    pub fn campaign_epoch(&self) -> Epoch {
        self.campaign_epoch
    }

    pub fn granted_by(&self) -> &BTreeSet<ReplicaKey> {
        &self.granted_by
    }

    pub fn rejected_by(&self) -> &BTreeSet<ReplicaKey> {
        &self.rejected_by
    }

    pub fn is_vote_granted(&self) -> bool {
        self.granted_by.len() >= peers::majority(self.voters.len())
    }

    pub fn is_vote_rejected(&self) -> bool {
        self.rejected_by.len() >= peers::majority(self.voters.len())
    }

    /// Voters we still need an answer from.
    pub fn unrecorded_voters(&self) -> Vec<ReplicaKey> {
        self.voters
            .iter()
            .filter(|voter| !self.granted_by.contains(*voter) && !self.rejected_by.contains(*voter))
            .copied()
            .collect()
    }

    /// Returns None when `from` is not a voter. A voter's first answer in a round sticks.
    pub(crate) fn with_vote_recorded(&self, from: &ReplicaKey, granted: bool) -> Option<Self> {
        let voter = peers::voter_key(&self.voters, from)?;
        let mut next = self.clone();
        if self.granted_by.contains(&voter) || self.rejected_by.contains(&voter) {
            return Some(next);
        }
        if granted {
            next.granted_by.insert(voter);
        } else {
            next.rejected_by.insert(voter);
        }
        Some(next)
    }

    pub fn election(&self) -> ElectionRecord {
        match self.round {
            // A pre-vote must leave the durable record exactly as it was.
            VoteRound::PreVote => ElectionRecord {
                epoch: self.epoch,
                leader_id: self.leader_id,
                voted_key: self.voted_key,
                voters: self.voters.clone(),
            },
            VoteRound::Binding => ElectionRecord::with_voted_candidate(self.epoch, self.local, self.voters.clone()),
        }
    }

    pub fn can_grant_vote(&self, candidate: &ReplicaKey, candidate_log_up_to_date: bool, is_pre_vote: bool) -> bool {
        vote_policy::can_grant_vote(self.voted_key.as_ref(), candidate, candidate_log_up_to_date, is_pre_vote)
    }
}

/// We know the leader of this epoch and where to reach it.
#[derive(Clone, Debug)]
pub struct FollowerState {
    epoch: Epoch,
    leader_id: ReplicaId,
    leader_endpoints: Endpoints,
    // Kept so a restart can't hand out a second vote in an epoch we already voted in.
    voted_key: Option<ReplicaKey>,
    voters: BTreeSet<ReplicaKey>,
    high_watermark: Option<u64>,
    fetch_timer: ElectionTimer,
}

impl FollowerState {
    pub(crate) fn new(
        epoch: Epoch,
        leader_id: ReplicaId,
        leader_endpoints: Endpoints,
        voted_key: Option<ReplicaKey>,
        voters: BTreeSet<ReplicaKey>,
        high_watermark: Option<u64>,
        fetch_timer: ElectionTimer,
    ) -> Self {
        FollowerState {
            epoch,
            leader_id,
            leader_endpoints,
            voted_key,
            voters,
            high_watermark,
            fetch_timer,
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn leader_id(&self) -> ReplicaId {
        self.leader_id
    }

    pub fn leader_endpoints(&self) -> &Endpoints {
        &self.leader_endpoints
    }

    pub fn has_fetch_timeout_expired(&self, now: Instant) -> bool {
        self.fetch_timer.is_expired(now)
    }

    /// Fresh fetch timer; the high watermark only moves forward.
    pub(crate) fn with_leader_contact(&self, now: Instant, high_watermark: Option<u64>) -> Self {
        let mut next = self.clone();
        next.fetch_timer = ElectionTimer::new(now, self.fetch_timer.timeout());
        if let Some(hw) = high_watermark {
            if self.high_watermark.map_or(true, |current| hw > current) {
                next.high_watermark = Some(hw);
            }
        }
        next
    }

    pub fn election(&self) -> ElectionRecord {
        ElectionRecord::with_elected_leader(self.epoch, self.leader_id, self.voted_key, self.voters.clone())
    }
}

/// We led this epoch and stepped down. We sit out until our election timer runs out so another
/// replica gets a clean shot at leadership.
#[derive(Clone, Debug)]
pub struct ResignedState {
    epoch: Epoch,
    local: ReplicaKey,
    voters: BTreeSet<ReplicaKey>,
    high_watermark: Option<u64>,
    election_timer: ElectionTimer,
}

impl ResignedState {
    pub(crate) fn new(
        epoch: Epoch,
        local: ReplicaKey,
        voters: BTreeSet<ReplicaKey>,
        high_watermark: Option<u64>,
        election_timer: ElectionTimer,
    ) -> Self {
        ResignedState {
            epoch,
            local,
            voters,
            high_watermark,
            election_timer,
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn election(&self) -> ElectionRecord {
        ElectionRecord::with_elected_leader(self.epoch, self.local.id, Some(self.local), self.voters.clone())
    }
}
