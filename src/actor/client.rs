use crate::replica::{DriverError, LeaderContact, LogPosition, ReplicaKey, VoteRequest, VoteResponse};
use std::error::Error;
use std::fmt::Debug;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub(super) enum Event {
    // Unattached/Candidate: grant if applicable (includes write to disk).
    // Any role: transition to Unattached first if the request carries a newer epoch.
    RequestVote(VoteRequest, Callback<VoteResponse, DriverError>),

    // Candidate: tally. Advance to binding round or to leader on a majority.
    // Otherwise: discard, unless the epoch is newer.
    VoteResponseFromPeer(ReplicaKey, VoteResponse),

    // Append/fetch traffic from the leader. Become or stay follower.
    LeaderContact(LeaderContact, Callback<(), DriverError>),

    // Leader: step down.
    Resign(Callback<(), DriverError>),

    // Leader: update high watermark and check-quorum bookkeeping.
    FollowerFetch(ReplicaKey, u64),

    UpdateLogEnd(LogPosition),
}

#[derive(Debug)]
pub(super) struct Callback<O: Debug, E: Error>(oneshot::Sender<Result<O, E>>);

impl<O: Debug, E: Error> Callback<O, E> {
    pub(super) fn send(self, message: Result<O, E>) {
        // Caller stopped waiting; nothing to do.
        let _ = self.0.send(message);
    }
}

#[derive(Clone)]
pub struct ActorClient {
    sender: mpsc::Sender<Event>,
}

impl ActorClient {
    pub(super) fn new(sender: mpsc::Sender<Event>) -> Self {
        ActorClient { sender }
    }

    pub fn weak(&self) -> WeakActorClient {
        WeakActorClient {
            sender: self.sender.downgrade(),
        }
    }

    pub async fn request_vote(&self, request: VoteRequest) -> Result<VoteResponse, DriverError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::RequestVote(request, Callback(tx))).await?;

        rx.await.map_err(|_| DriverError::ActorExited)?
    }

    pub async fn leader_contact(&self, contact: LeaderContact) -> Result<(), DriverError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::LeaderContact(contact, Callback(tx))).await?;

        rx.await.map_err(|_| DriverError::ActorExited)?
    }

    pub async fn resign(&self) -> Result<(), DriverError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Resign(Callback(tx))).await?;

        rx.await.map_err(|_| DriverError::ActorExited)?
    }

    pub async fn follower_fetch(&self, replica: ReplicaKey, end_offset: u64) -> Result<(), DriverError> {
        self.send(Event::FollowerFetch(replica, end_offset)).await
    }

    pub async fn update_log_end(&self, log_end: LogPosition) -> Result<(), DriverError> {
        self.send(Event::UpdateLogEnd(log_end)).await
    }

    pub(super) async fn notify_vote_response_from_peer(
        &self,
        from: ReplicaKey,
        response: VoteResponse,
    ) -> Result<(), DriverError> {
        self.send(Event::VoteResponseFromPeer(from, response)).await
    }

    async fn send(&self, event: Event) -> Result<(), DriverError> {
        self.sender.send(event).await.map_err(|_| DriverError::ActorExited)
    }
}

/// WeakActorClient doesn't keep the actor alive. Handed to background tasks that report back to
/// the actor, so that dropping every `ActorClient` still shuts it down.
#[derive(Clone)]
pub struct WeakActorClient {
    sender: mpsc::WeakSender<Event>,
}

impl WeakActorClient {
    pub fn upgrade(&self) -> Option<ActorClient> {
        self.sender.upgrade().map(ActorClient::new)
    }
}
