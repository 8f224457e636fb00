use crate::replica::election::RoleKind;
use crate::replica::endpoints::Endpoints;
use crate::replica::local_state::{Epoch, StoreError};
use crate::replica::peers::{ReplicaId, ReplicaKey};
use std::cmp::Ordering;

/// Position of the last entry in a replica's log. Comparison is by epoch first, then offset.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct LogPosition {
    pub epoch: Epoch,
    pub offset: u64,
}

impl LogPosition {
    pub fn new(epoch: Epoch, offset: u64) -> Self {
        LogPosition { epoch, offset }
    }

    /// From raft paper:
    /// > Raft determines which of two logs is more up-to-date by comparing the index and term of
    /// > the last entries in the logs. If the logs have last entries with different terms, then the
    /// > log with the later term is more up-to-date. If the logs end with the same term, then
    /// > whichever log is longer is more up-to-date.
    pub fn is_at_least(&self, local: &LogPosition) -> bool {
        self.cmp(local) != Ordering::Less
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VoteRequest {
    pub epoch: Epoch,
    pub candidate: ReplicaKey,
    pub last_log: LogPosition,
    pub is_pre_vote: bool,
}

/// `is_pre_vote` echoes the request, so a candidate can tell which of its rounds is being answered.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VoteResponse {
    pub epoch: Epoch,
    pub vote_granted: bool,
    pub is_pre_vote: bool,
}

/// Outbound vote requests the driver should deliver.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VoteSolicitation {
    pub request: VoteRequest,
    pub recipients: Vec<ReplicaKey>,
}

/// What an append/fetch exchange with a leader tells us.
#[derive(Clone, Debug)]
pub struct LeaderContact {
    pub epoch: Epoch,
    pub leader_id: ReplicaId,
    pub endpoints: Endpoints,
    pub high_watermark: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("Epoch {requested:?} is older than our current epoch {current:?}")]
    StaleEpoch { current: Epoch, requested: Epoch },

    #[error("Can't transition from {from:?} to {to:?} in epoch {epoch:?}")]
    IllegalTransition { from: RoleKind, to: RoleKind, epoch: Epoch },

    #[error("No epoch after {0:?} to campaign for")]
    EpochExhausted(Epoch),

    // Retryable. The previous role is still current.
    #[error("Failed to persist election record")]
    Persistence(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Quorum actor is dead RIP")]
    ActorExited,

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Peer unreachable: {0}")]
    Unreachable(String),

    #[error("Peer didn't respond in time")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_position_is_at_least() {
        let local = LogPosition::new(Epoch::new(3), 10);

        assert!(LogPosition::new(Epoch::new(3), 10).is_at_least(&local));
        assert!(LogPosition::new(Epoch::new(3), 11).is_at_least(&local));
        assert!(LogPosition::new(Epoch::new(4), 0).is_at_least(&local));

        assert!(!LogPosition::new(Epoch::new(3), 9).is_at_least(&local));
        assert!(!LogPosition::new(Epoch::new(2), 100).is_at_least(&local));
    }

    #[test]
    fn empty_log_is_behind_everything() {
        let empty = LogPosition::default();

        assert!(empty.is_at_least(&LogPosition::default()));
        assert!(!empty.is_at_least(&LogPosition::new(Epoch::new(0), 1)));
    }
}
