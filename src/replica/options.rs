use crate::replica::election::{Clock, TimeoutRange};
use crate::replica::endpoints::Endpoints;
use crate::replica::local_state::ElectionStore;
use crate::replica::peers::ReplicaKey;
use std::collections::BTreeSet;
use std::convert::TryFrom;
use tokio::time::Duration;

#[derive(Clone, Default)]
pub struct QuorumOptions {
    pub election_min_timeout: Option<Duration>,
    pub election_max_timeout: Option<Duration>,
    pub fetch_timeout: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct QuorumOptionsValidated {
    pub election_min_timeout: Duration,
    pub election_max_timeout: Duration,
    pub fetch_timeout: Duration,
}

impl QuorumOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.election_min_timeout == Duration::from_millis(0) {
            return Err("Election minimum timeout must be greater than zero");
        }
        if self.election_min_timeout > self.election_max_timeout {
            return Err("Election minimum timeout must not exceed maximum timeout");
        }
        if self.fetch_timeout == Duration::from_millis(0) {
            return Err("Fetch timeout must be greater than zero");
        }

        Ok(())
    }

    pub fn election_timeouts(&self) -> TimeoutRange {
        TimeoutRange::new(self.election_min_timeout, self.election_max_timeout)
    }

    /// A leader gives its followers one and a half fetch timeouts to check in.
    pub fn check_quorum_timeout(&self) -> Duration {
        self.fetch_timeout * 3 / 2
    }
}

impl TryFrom<QuorumOptions> for QuorumOptionsValidated {
    type Error = &'static str;

    fn try_from(options: QuorumOptions) -> Result<Self, Self::Error> {
        let values = QuorumOptionsValidated {
            election_min_timeout: options.election_min_timeout.unwrap_or(Duration::from_millis(1000)),
            election_max_timeout: options.election_max_timeout.unwrap_or(Duration::from_millis(2000)),
            fetch_timeout: options.fetch_timeout.unwrap_or(Duration::from_millis(2000)),
        };

        values.validate()?;
        Ok(values)
    }
}

pub struct QuorumConfig<S, C>
where
    S: ElectionStore,
    C: Clock,
{
    pub logger: slog::Logger,
    pub local: ReplicaKey,
    // Advertised to the cluster while we're leader.
    pub local_endpoints: Endpoints,
    // Empty means "use whatever voter set was last persisted".
    pub voters: BTreeSet<ReplicaKey>,
    pub options: QuorumOptionsValidated,
    pub store: S,
    pub clock: C,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let validated = QuorumOptionsValidated::try_from(QuorumOptions::default()).unwrap();

        assert_eq!(validated.election_min_timeout, Duration::from_millis(1000));
        assert_eq!(validated.election_max_timeout, Duration::from_millis(2000));
        assert_eq!(validated.fetch_timeout, Duration::from_millis(2000));
        assert_eq!(validated.check_quorum_timeout(), Duration::from_millis(3000));
    }

    #[test]
    fn fixed_election_timeout_is_allowed() {
        let options = QuorumOptions {
            election_min_timeout: Some(Duration::from_millis(300)),
            election_max_timeout: Some(Duration::from_millis(300)),
            ..QuorumOptions::default()
        };
        let validated = QuorumOptionsValidated::try_from(options).unwrap();

        assert_eq!(validated.election_timeouts().random_timeout(), Duration::from_millis(300));
    }

    #[test]
    fn invalid_options() {
        let inverted = QuorumOptions {
            election_min_timeout: Some(Duration::from_millis(500)),
            election_max_timeout: Some(Duration::from_millis(400)),
            ..QuorumOptions::default()
        };
        assert!(QuorumOptionsValidated::try_from(inverted).is_err());

        let zero_min = QuorumOptions {
            election_min_timeout: Some(Duration::from_millis(0)),
            ..QuorumOptions::default()
        };
        assert!(QuorumOptionsValidated::try_from(zero_min).is_err());

        let zero_fetch = QuorumOptions {
            fetch_timeout: Some(Duration::from_millis(0)),
            ..QuorumOptions::default()
        };
        assert!(QuorumOptionsValidated::try_from(zero_fetch).is_err());
    }
}
