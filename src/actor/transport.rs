use crate::replica::{ReplicaKey, TransportError, VoteRequest, VoteResponse};

/// VoteTransport delivers a vote request to one peer and brings back its answer. Wire framing,
/// retries and connection management all live behind this seam.
#[async_trait::async_trait]
pub trait VoteTransport: Clone + Send + Sync + 'static {
    async fn request_vote(&self, to: ReplicaKey, request: VoteRequest) -> Result<VoteResponse, TransportError>;
}
