use crate::actor::client::{ActorClient, Event, WeakActorClient};
use crate::actor::transport::VoteTransport;
use crate::replica::{
    Clock, DriverError, ElectionStore, QuorumStateController, ReplicaKey, VoteRequest, VoteSolicitation,
};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

// How long to hold off before retrying a timeout whose transition failed to persist.
const TIMEOUT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

pub fn create<S, C, T>(
    buffer_size: usize,
    controller: QuorumStateController<S, C>,
    transport: T,
) -> (ActorClient, QuorumActor<S, C, T>)
where
    S: ElectionStore,
    C: Clock,
    T: VoteTransport,
{
    let (tx, rx) = mpsc::channel(buffer_size);
    let client = ActorClient::new(tx);
    let actor = QuorumActor {
        logger: controller.logger().clone(),
        receiver: rx,
        weak_client: client.weak(),
        clock: controller.clock().clone(),
        controller,
        transport,
        retry_at: None,
    };

    (client, actor)
}

/// QuorumActor is the single writer in front of a `QuorumStateController`. All stimuli, inbound
/// RPCs, peer replies and timer expiry, are applied one at a time from this loop.
pub struct QuorumActor<S, C, T>
where
    S: ElectionStore,
    C: Clock,
    T: VoteTransport,
{
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    weak_client: WeakActorClient,
    clock: C,
    controller: QuorumStateController<S, C>,
    transport: T,
    retry_at: Option<Instant>,
}

impl<S, C, T> QuorumActor<S, C, T>
where
    S: ElectionStore,
    C: Clock,
    T: VoteTransport,
{
    /// Runs until every `ActorClient` has been dropped.
    pub async fn run_event_loop(mut self) {
        loop {
            let wake_time = self.wake_time();
            tokio::select! {
                event = self.receiver.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = self.clock.sleep_until(wake_time) => self.handle_timeout(),
            }
        }
        slog::info!(self.logger, "All clients dropped. Quorum actor exiting.");
    }

    fn wake_time(&self) -> Instant {
        let deadline = self.controller.deadline();
        match self.retry_at {
            Some(retry_at) if retry_at > deadline => retry_at,
            _ => deadline,
        }
    }

    // This must NOT be async. Peer calls are spawned and come back as events.
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::RequestVote(request, callback) => {
                let log_end = self.controller.log_end();
                let result = self
                    .controller
                    .handle_vote_request(&request, log_end)
                    .map_err(DriverError::from);
                callback.send(result);
            }
            Event::VoteResponseFromPeer(from, response) => {
                match self.controller.handle_vote_response(&from, response) {
                    Ok(Some(solicitation)) => self.send_vote_requests(solicitation),
                    Ok(None) => {}
                    Err(e) => slog::error!(self.logger, "Failed to handle vote from {:?}: {:?}", from, e),
                }
            }
            Event::LeaderContact(contact, callback) => {
                let result = self.controller.handle_leader_contact(contact).map_err(DriverError::from);
                callback.send(result);
            }
            Event::Resign(callback) => {
                let result = self.controller.resign().map_err(DriverError::from);
                callback.send(result);
            }
            Event::FollowerFetch(replica, end_offset) => {
                if !self.controller.record_follower_fetch(&replica, end_offset) {
                    slog::debug!(self.logger, "Ignored fetch progress from {:?}", replica);
                }
            }
            Event::UpdateLogEnd(log_end) => {
                self.controller.update_log_end(log_end);
            }
        }
    }

    fn handle_timeout(&mut self) {
        let log_end = self.controller.log_end();
        match self.controller.handle_election_timeout(log_end) {
            Ok(solicitation) => {
                self.retry_at = None;
                if let Some(solicitation) = solicitation {
                    self.send_vote_requests(solicitation);
                }
            }
            Err(e) => {
                slog::error!(self.logger, "Failed to handle election timeout: {:?}", e);
                self.retry_at = Some(self.clock.now() + TIMEOUT_RETRY_BACKOFF);
            }
        }
    }

    fn send_vote_requests(&self, solicitation: VoteSolicitation) {
        for peer in solicitation.recipients {
            tokio::task::spawn(call_peer_request_vote(
                self.logger.new(slog::o!("Peer" => format!("{:?}", peer))),
                self.transport.clone(),
                peer,
                solicitation.request.clone(),
                self.weak_client.clone(),
            ));
        }
    }
}

async fn call_peer_request_vote<T: VoteTransport>(
    logger: slog::Logger,
    transport: T,
    peer: ReplicaKey,
    request: VoteRequest,
    callback: WeakActorClient,
) {
    slog::debug!(logger, "ClientWire - {:?}", request);
    let response = match transport.request_vote(peer, request).await {
        Ok(response) => response,
        Err(e) => {
            // No retry. The round's timeout will start a new one.
            slog::warn!(logger, "RequestVote failed: {:?}", e);
            return;
        }
    };
    slog::debug!(logger, "ClientWire - {:?}", response);

    if let Some(client) = callback.upgrade() {
        let _ = client.notify_vote_response_from_peer(peer, response).await;
    }
}
