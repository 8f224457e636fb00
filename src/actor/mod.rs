mod client;
mod quorum_actor;
mod transport;

pub use client::ActorClient;
pub use client::WeakActorClient;
pub use quorum_actor::create;
pub use quorum_actor::QuorumActor;
pub use transport::VoteTransport;
