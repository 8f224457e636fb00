use crate::replica::election::QuorumRole;
use std::sync::Arc;
use tokio::sync::watch;

pub(crate) fn new_role_channel(initial_role: Arc<QuorumRole>) -> (QuorumRoleNotifier, QuorumRoleListener) {
    let (snd, rcv) = watch::channel(initial_role);

    (QuorumRoleNotifier { snd }, QuorumRoleListener { rcv })
}

pub(crate) struct QuorumRoleNotifier {
    snd: watch::Sender<Arc<QuorumRole>>,
}

impl QuorumRoleNotifier {
    pub(crate) fn notify_new_role(&self, new_role: Arc<QuorumRole>) {
        // Nobody listening is fine.
        let _ = self.snd.send(new_role);
    }
}

/// QuorumRoleListener is the read-only view of the current role handed to other components.
/// Every value it yields is a complete role; it never observes one mid-transition.
#[derive(Clone)]
pub struct QuorumRoleListener {
    rcv: watch::Receiver<Arc<QuorumRole>>,
}

impl QuorumRoleListener {
    pub fn current(&self) -> Arc<QuorumRole> {
        self.rcv.borrow().clone()
    }

    /// Waits for the next role. Returns None once the controller is gone.
    pub async fn next(&mut self) -> Option<Arc<QuorumRole>> {
        match self.rcv.changed().await {
            Ok(_) => Some(self.rcv.borrow().clone()),
            Err(_) => None,
        }
    }
}
