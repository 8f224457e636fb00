use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ListenerName(pub String);

impl ListenerName {
    pub fn new<S: Into<String>>(name: S) -> Self {
        ListenerName(name.into())
    }
}

impl fmt::Debug for ListenerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Endpoints describes how to reach a leader, one address per listener. An empty set means we
/// don't know of a leader.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Endpoints {
    listeners: BTreeMap<ListenerName, SocketAddr>,
}

impl Endpoints {
    pub fn empty() -> Self {
        Endpoints::default()
    }

    pub fn from_listeners<I>(listeners: I) -> Self
    where
        I: IntoIterator<Item = (ListenerName, SocketAddr)>,
    {
        Endpoints {
            listeners: listeners.into_iter().collect(),
        }
    }

    pub fn address(&self, listener: &ListenerName) -> Option<SocketAddr> {
        self.listeners.get(listener).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ListenerName, &SocketAddr)> {
        self.listeners.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn lookup_by_listener() {
        let controller = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9093);
        let replication = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9094);
        let endpoints = Endpoints::from_listeners(vec![
            (ListenerName::new("CONTROLLER"), controller),
            (ListenerName::new("REPLICATION"), replication),
        ]);

        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints.address(&ListenerName::new("CONTROLLER")), Some(controller));
        assert_eq!(endpoints.address(&ListenerName::new("REPLICATION")), Some(replication));
        assert_eq!(endpoints.address(&ListenerName::new("PLAINTEXT")), None);
    }

    #[test]
    fn empty() {
        assert!(Endpoints::empty().is_empty());
        assert_eq!(Endpoints::empty(), Endpoints::from_listeners(vec![]));
    }
}
