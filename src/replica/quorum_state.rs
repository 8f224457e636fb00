use crate::replica::election::{
    self, CandidateState, Clock, ElectionTimer, FollowerState, LeaderState, QuorumRole, QuorumRoleListener,
    QuorumRoleNotifier, ResignedState, RoleKind, TimeoutRange, UnattachedState,
};
use crate::replica::endpoints::Endpoints;
use crate::replica::local_state::{ElectionRecord, ElectionStore, Epoch};
use crate::replica::options::{QuorumConfig, QuorumOptionsValidated};
use crate::replica::peers::{self, ReplicaId, ReplicaKey};
use crate::replica::replica_api::{
    LeaderContact, LogPosition, TransitionError, VoteRequest, VoteResponse, VoteSolicitation,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::time::Instant;

/// QuorumStateController is the single writer of the local replica's role. Every transition
/// persists the new role's `ElectionRecord` before the role becomes visible, and a failed write
/// leaves the previous role in place.
pub struct QuorumStateController<S, C>
where
    S: ElectionStore,
    C: Clock,
{
    logger: slog::Logger,
    local: ReplicaKey,
    local_endpoints: Endpoints,
    options: QuorumOptionsValidated,
    election_timeouts: TimeoutRange,
    store: S,
    clock: C,
    // Last log end we were told about. Used for the vote requests of a binding round.
    log_end: LogPosition,
    role: Arc<QuorumRole>,
    notifier: QuorumRoleNotifier,
}

impl<S, C> QuorumStateController<S, C>
where
    S: ElectionStore,
    C: Clock,
{
    /// Cold start: Unattached at the persisted epoch (or epoch 0), with the persisted vote and
    /// leader id. Configured voters take precedence over persisted ones.
    pub fn initialize(config: QuorumConfig<S, C>) -> Result<(Self, QuorumRoleListener), TransitionError> {
        let record = config.store.load()?;
        let election_timeouts = config.options.election_timeouts();

        let voters = match (&record, config.voters.is_empty()) {
            (_, false) => config.voters,
            (Some(record), true) => record.voters.clone(),
            (None, true) => BTreeSet::new(),
        };
        let (epoch, leader_id, voted_key) = match &record {
            Some(record) => (record.epoch, record.leader_id, record.voted_key),
            None => (Epoch::default(), None, None),
        };

        let role = QuorumRole::Unattached(UnattachedState::new(
            epoch,
            leader_id,
            voted_key,
            voters,
            None,
            election_timeouts.start_timer(config.clock.now()),
        ));
        slog::info!(config.logger, "Initialized as {}", role);

        let role = Arc::new(role);
        let (notifier, listener) = election::new_role_channel(role.clone());

        let controller = QuorumStateController {
            logger: config.logger,
            local: config.local,
            local_endpoints: config.local_endpoints,
            options: config.options,
            election_timeouts,
            store: config.store,
            clock: config.clock,
            log_end: LogPosition::default(),
            role,
            notifier,
        };

        Ok((controller, listener))
    }

    pub fn role(&self) -> Arc<QuorumRole> {
        self.role.clone()
    }

    pub fn local(&self) -> &ReplicaKey {
        &self.local
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub(crate) fn logger(&self) -> &slog::Logger {
        &self.logger
    }

    pub fn log_end(&self) -> LogPosition {
        self.log_end
    }

    pub fn epoch(&self) -> Epoch {
        self.role.epoch()
    }

    pub fn voted_key(&self) -> Option<ReplicaKey> {
        self.role.voted_key().copied()
    }

    pub fn leader_id(&self) -> Option<ReplicaId> {
        self.role.leader_id()
    }

    pub fn leader_endpoints(&self) -> Endpoints {
        self.role.leader_endpoints()
    }

    pub fn high_watermark(&self) -> Option<u64> {
        self.role.high_watermark()
    }

    pub fn remaining_election_time_ms(&self, now: Instant) -> u64 {
        self.role.remaining_election_time_ms(now)
    }

    pub fn has_election_timeout_expired(&self, now: Instant) -> bool {
        self.role.has_election_timeout_expired(now)
    }

    pub fn can_grant_vote(&self, candidate: &ReplicaKey, candidate_log_up_to_date: bool, is_pre_vote: bool) -> bool {
        self.role.can_grant_vote(candidate, candidate_log_up_to_date, is_pre_vote)
    }

    pub fn election(&self) -> ElectionRecord {
        self.role.election()
    }

    pub fn is_voter(&self) -> bool {
        peers::is_voter(self.role.voters(), &self.local)
    }

    /// When the current role's timer runs out.
    pub fn deadline(&self) -> Instant {
        self.role.timer().deadline()
    }

    /// Drives every time-based transition. Returns the vote requests to send if this started (or
    /// restarted) a vote round.
    pub fn handle_election_timeout(
        &mut self,
        local_log_end: LogPosition,
    ) -> Result<Option<VoteSolicitation>, TransitionError> {
        self.log_end = local_log_end;
        let now = self.clock.now();
        let role = self.role.clone();

        if let QuorumRole::Leader(leader) = &*role {
            if !leader.check_quorum_timer().is_expired(now) {
                return Ok(None);
            }
            if leader.has_check_quorum_expired(now) {
                slog::warn!(self.logger, "Lost contact with a majority of voters. Resigning.");
                self.transition_to_resigned()?;
            } else {
                self.swap(QuorumRole::Leader(leader.with_restarted_check_quorum(now)));
            }
            return Ok(None);
        }

        if !role.has_election_timeout_expired(now) {
            return Ok(None);
        }

        if !self.is_voter() {
            // Observers never campaign. Keep waiting for a leader in this or a later epoch.
            let voted_key = role.voted_key().copied();
            self.commit(self.unattached(role.epoch(), role.leader_id(), voted_key))?;
            return Ok(None);
        }

        match &*role {
            QuorumRole::Candidate(candidate) if !candidate.is_pre_vote_round() => {
                slog::info!(self.logger, "Binding vote round timed out in epoch {:?}", candidate.epoch());
                self.commit(self.unattached(candidate.epoch(), None, Some(self.local)))?;
                Ok(None)
            }
            _ => self.transition_to_pre_vote_candidate(),
        }
    }

    pub fn handle_vote_response(
        &mut self,
        from: &ReplicaKey,
        response: VoteResponse,
    ) -> Result<Option<VoteSolicitation>, TransitionError> {
        let current_epoch = self.epoch();
        if response.epoch > current_epoch {
            slog::info!(
                self.logger,
                "Vote response from {:?} carries newer epoch {:?}",
                from,
                response.epoch
            );
            self.transition_to_unattached(response.epoch)?;
            return Ok(None);
        }

        let candidate = match &*self.role {
            QuorumRole::Candidate(candidate) => candidate.clone(),
            other => {
                slog::info!(self.logger, "Ignoring vote response from {:?}. We're {}", from, other);
                return Ok(None);
            }
        };

        // A pre-vote grant says nothing about the binding vote, even when both carry the same epoch.
        if response.is_pre_vote != candidate.is_pre_vote_round() {
            slog::info!(
                self.logger,
                "Ignoring {} response from {:?} while in {:?} round",
                if response.is_pre_vote { "pre-vote" } else { "vote" },
                from,
                candidate.round()
            );
            return Ok(None);
        }

        if !candidate.is_pre_vote_round() && response.epoch != current_epoch {
            slog::info!(
                self.logger,
                "Received vote for outdated epoch {:?}, current epoch: {:?}.",
                response.epoch,
                current_epoch
            );
            return Ok(None);
        }

        let candidate = match candidate.with_vote_recorded(from, response.vote_granted) {
            Some(candidate) => candidate,
            None => {
                slog::warn!(self.logger, "Vote response from non-voter {:?}", from);
                return Ok(None);
            }
        };
        slog::info!(
            self.logger,
            "Received {}/{} votes in {:?} round for epoch {:?}",
            candidate.granted_by().len(),
            self.role.voters().len(),
            candidate.round(),
            candidate.campaign_epoch()
        );

        if candidate.is_vote_granted() {
            return self.advance_candidacy(&candidate);
        }

        if candidate.is_vote_rejected() && candidate.is_pre_vote_round() {
            slog::info!(self.logger, "Pre-vote rejected by a majority of voters");
            let voted_key = candidate.voted_key().copied();
            self.commit(self.unattached(candidate.epoch(), self.role.leader_id(), voted_key))?;
            return Ok(None);
        }

        self.swap(QuorumRole::Candidate(candidate));
        Ok(None)
    }

    pub fn handle_vote_request(
        &mut self,
        request: &VoteRequest,
        local_log_end: LogPosition,
    ) -> Result<VoteResponse, TransitionError> {
        self.log_end = local_log_end;
        let current_epoch = self.epoch();

        if request.epoch < current_epoch {
            slog::info!(
                self.logger,
                "Not granting vote to {:?}. Request epoch {:?} is out of date.",
                request.candidate,
                request.epoch
            );
            return Ok(self.vote_response(false, request.is_pre_vote));
        }

        if !peers::is_voter(self.role.voters(), &request.candidate) {
            slog::info!(self.logger, "Not granting vote. {:?} is not a voter.", request.candidate);
            return Ok(self.vote_response(false, request.is_pre_vote));
        }

        // > If RPC request or response contains term T > currentTerm:
        // > set currentTerm = T, convert to follower (§5.1)
        // A pre-vote is only a question, so it never moves our epoch.
        if request.epoch > current_epoch && !request.is_pre_vote {
            self.transition_to_unattached(request.epoch)?;
        }

        let log_up_to_date = request.last_log.is_at_least(&local_log_end);
        let granted = self
            .role
            .can_grant_vote(&request.candidate, log_up_to_date, request.is_pre_vote);

        if !granted {
            slog::info!(
                self.logger,
                "Not granting {} to {:?}. Log up to date: {}. We're {}",
                if request.is_pre_vote { "pre-vote" } else { "vote" },
                request.candidate,
                log_up_to_date,
                self.role
            );
            return Ok(self.vote_response(false, request.is_pre_vote));
        }

        if !request.is_pre_vote && self.role.voted_key().is_none() {
            let epoch = self.epoch();
            let leader_id = self.leader_id();
            self.commit(self.unattached(epoch, leader_id, Some(request.candidate)))?;
        }
        slog::info!(
            self.logger,
            "Granted {} to {:?} for epoch {:?}",
            if request.is_pre_vote { "pre-vote" } else { "vote" },
            request.candidate,
            request.epoch
        );

        Ok(self.vote_response(true, request.is_pre_vote))
    }

    /// Append/fetch traffic from a leader.
    pub fn handle_leader_contact(&mut self, contact: LeaderContact) -> Result<(), TransitionError> {
        let current_epoch = self.epoch();
        if contact.epoch < current_epoch {
            return Err(TransitionError::StaleEpoch {
                current: current_epoch,
                requested: contact.epoch,
            });
        }

        let role = self.role.clone();
        let illegal = TransitionError::IllegalTransition {
            from: role.kind(),
            to: RoleKind::Follower,
            epoch: contact.epoch,
        };
        if contact.epoch > current_epoch {
            if contact.leader_id == self.local.id {
                return Err(illegal);
            }
            return self.transition_to_follower(contact);
        }

        match &*role {
            QuorumRole::Follower(follower) if follower.leader_id() == contact.leader_id => {
                let now = self.clock.now();
                self.swap(QuorumRole::Follower(
                    follower.with_leader_contact(now, contact.high_watermark),
                ));
                Ok(())
            }
            // Only one leader per epoch, and we already know who it is.
            QuorumRole::Follower(_) | QuorumRole::Leader(_) | QuorumRole::Resigned(_) => Err(illegal),
            QuorumRole::Unattached(_) | QuorumRole::Candidate(_) => {
                if contact.leader_id == self.local.id {
                    return Err(illegal);
                }
                // A leader remembered from before a restart still owns this epoch.
                if let Some(known) = role.leader_id() {
                    if known != contact.leader_id {
                        slog::warn!(
                            self.logger,
                            "Rejecting leader {:?} for epoch {:?}. Leader is already {:?}.",
                            contact.leader_id,
                            contact.epoch,
                            known
                        );
                        return Err(illegal);
                    }
                }
                self.transition_to_follower(contact)
            }
        }
    }

    /// Any message carrying a newer epoch discards whatever we were doing in the old one.
    pub fn observe_epoch(&mut self, epoch: Epoch) -> Result<(), TransitionError> {
        let current_epoch = self.epoch();
        if epoch < current_epoch {
            return Err(TransitionError::StaleEpoch {
                current: current_epoch,
                requested: epoch,
            });
        }
        if epoch > current_epoch {
            self.transition_to_unattached(epoch)?;
        }
        Ok(())
    }

    pub fn resign(&mut self) -> Result<(), TransitionError> {
        if !self.role.is_leader() {
            return Err(TransitionError::IllegalTransition {
                from: self.role.kind(),
                to: RoleKind::Resigned,
                epoch: self.epoch(),
            });
        }
        self.transition_to_resigned()
    }

    /// Leader only. Returns false if we're not leader or `replica` isn't a voter.
    pub fn record_follower_fetch(&mut self, replica: &ReplicaKey, end_offset: u64) -> bool {
        let now = self.clock.now();
        let next = match &*self.role {
            QuorumRole::Leader(leader) => leader.with_follower_fetch(replica, end_offset, now),
            _ => None,
        };

        match next {
            Some(leader) => {
                self.swap(QuorumRole::Leader(leader));
                true
            }
            None => false,
        }
    }

    /// Leader only. Returns false if we're not leader.
    pub fn update_local_end_offset(&mut self, end_offset: u64) -> bool {
        let next = match &*self.role {
            QuorumRole::Leader(leader) => leader.with_local_end_offset(end_offset),
            _ => return false,
        };
        self.swap(QuorumRole::Leader(next));
        true
    }

    pub fn update_log_end(&mut self, log_end: LogPosition) {
        self.log_end = log_end;
        self.update_local_end_offset(log_end.offset);
    }

    fn transition_to_unattached(&mut self, epoch: Epoch) -> Result<(), TransitionError> {
        self.commit(self.unattached(epoch, None, None))
    }

    fn transition_to_pre_vote_candidate(&mut self) -> Result<Option<VoteSolicitation>, TransitionError> {
        let now = self.clock.now();
        let candidate = CandidateState::new_pre_vote(
            self.epoch(),
            self.local,
            self.leader_id(),
            self.voted_key(),
            self.role.voters().clone(),
            self.high_watermark(),
            self.election_timeouts.start_timer(now),
        )
        .ok_or_else(|| TransitionError::EpochExhausted(self.epoch()))?;
        self.commit(QuorumRole::Candidate(candidate.clone()))?;

        if candidate.is_vote_granted() {
            return self.advance_candidacy(&candidate);
        }
        Ok(Some(self.solicitation(&candidate)))
    }

    /// A majority granted the current round.
    fn advance_candidacy(&mut self, candidate: &CandidateState) -> Result<Option<VoteSolicitation>, TransitionError> {
        if !candidate.is_pre_vote_round() {
            self.transition_to_leader()?;
            return Ok(None);
        }

        let now = self.clock.now();
        let binding = CandidateState::new_binding(
            candidate.campaign_epoch(),
            self.local,
            self.role.voters().clone(),
            self.high_watermark(),
            self.election_timeouts.start_timer(now),
        );
        self.commit(QuorumRole::Candidate(binding.clone()))?;

        if binding.is_vote_granted() {
            self.transition_to_leader()?;
            return Ok(None);
        }
        Ok(Some(self.solicitation(&binding)))
    }

    fn transition_to_leader(&mut self) -> Result<(), TransitionError> {
        let now = self.clock.now();
        let leader = LeaderState::new(
            self.epoch(),
            self.local,
            self.role.voters().clone(),
            self.local_endpoints.clone(),
            ElectionTimer::new(now, self.options.check_quorum_timeout()),
            self.high_watermark(),
        )
        .with_local_end_offset(self.log_end.offset);
        self.commit(QuorumRole::Leader(leader))
    }

    fn transition_to_follower(&mut self, contact: LeaderContact) -> Result<(), TransitionError> {
        let now = self.clock.now();
        // Staying in the same epoch means any vote we cast in it still counts.
        let voted_key = if contact.epoch == self.epoch() {
            self.voted_key()
        } else {
            None
        };
        let high_watermark = match (self.high_watermark(), contact.high_watermark) {
            (Some(current), Some(learned)) => Some(current.max(learned)),
            (current, learned) => current.or(learned),
        };
        let follower = FollowerState::new(
            contact.epoch,
            contact.leader_id,
            contact.endpoints,
            voted_key,
            self.role.voters().clone(),
            high_watermark,
            ElectionTimer::new(now, self.options.fetch_timeout),
        );
        self.commit(QuorumRole::Follower(follower))
    }

    fn transition_to_resigned(&mut self) -> Result<(), TransitionError> {
        let now = self.clock.now();
        let resigned = ResignedState::new(
            self.epoch(),
            self.local,
            self.role.voters().clone(),
            self.high_watermark(),
            self.election_timeouts.start_timer(now),
        );
        self.commit(QuorumRole::Resigned(resigned))
    }

    fn unattached(&self, epoch: Epoch, leader_id: Option<ReplicaId>, voted_key: Option<ReplicaKey>) -> QuorumRole {
        QuorumRole::Unattached(UnattachedState::new(
            epoch,
            leader_id,
            voted_key,
            self.role.voters().clone(),
            self.high_watermark(),
            self.election_timeouts.start_timer(self.clock.now()),
        ))
    }

    fn solicitation(&self, candidate: &CandidateState) -> VoteSolicitation {
        VoteSolicitation {
            request: VoteRequest {
                epoch: candidate.campaign_epoch(),
                candidate: self.local,
                last_log: self.log_end,
                is_pre_vote: candidate.is_pre_vote_round(),
            },
            recipients: candidate.unrecorded_voters(),
        }
    }

    fn vote_response(&self, vote_granted: bool, is_pre_vote: bool) -> VoteResponse {
        VoteResponse {
            epoch: self.epoch(),
            vote_granted,
            is_pre_vote,
        }
    }

    /// Persist, then publish. On a failed write nothing changes.
    fn commit(&mut self, next: QuorumRole) -> Result<(), TransitionError> {
        let current_epoch = self.epoch();
        if next.epoch() < current_epoch {
            return Err(TransitionError::StaleEpoch {
                current: current_epoch,
                requested: next.epoch(),
            });
        }

        if let Err(e) = self.store.store(&next.election()) {
            slog::error!(self.logger, "Failed to persist {}: {:?}", next, e);
            return Err(e.into());
        }

        slog::info!(self.logger, "Transitioned from {} to {}", self.role, next);
        self.swap(next);
        Ok(())
    }

    /// Progress bookkeeping that leaves the election record untouched.
    fn swap(&mut self, next: QuorumRole) {
        let next = Arc::new(next);
        self.role = next.clone();
        self.notifier.notify_new_role(next);
    }
}
