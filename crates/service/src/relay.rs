//! The paired caller/callee session pair on the application-service role.
//! Modeled as a standalone entity holding weak references to both sides, to
//! avoid a reference cycle with `Session`: teardown is initiated by
//! whichever side disconnects first, and the relay coordinates closing the
//! other.

use std::sync::{Arc, Weak};

use crate::session::{Session, SessionId};

pub struct Relay {
    caller: Weak<Session>,
    callee: Weak<Session>,
}

impl Relay {
    pub fn new(caller: &Arc<Session>, callee: &Arc<Session>) -> Arc<Self> {
        Arc::new(Self {
            caller: Arc::downgrade(caller),
            callee: Arc::downgrade(callee),
        })
    }

    /// Called by the session whose side disconnected first. Schedules the
    /// other side's teardown on a fresh task: `Session::close` holds a lock
    /// while invoking this, so closing the peer inline here could deadlock
    /// if the peer also routes back through this relay.
    pub fn disconnect_peer_of(&self, id: SessionId) {
        let peer = if self.caller.upgrade().map(|s| s.id) == Some(id) {
            self.callee.upgrade()
        } else if self.callee.upgrade().map(|s| s.id) == Some(id) {
            self.caller.upgrade()
        } else {
            None
        };

        if let Some(peer) = peer {
            tokio::spawn(async move {
                peer.close().await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionId;
    use codec::message::Role;
    use std::time::Duration;

    fn test_session(seq: u64) -> Arc<Session> {
        Arc::new(Session::new(
            SessionId::new(Role::CLIENT_APP_SERVICE, seq),
            "127.0.0.1:1".parse().unwrap(),
            false,
            Role::CLIENT_APP_SERVICE,
            Duration::from_secs(60),
            tokio::io::sink(),
        ))
    }

    #[tokio::test]
    async fn disconnect_propagates_to_peer() {
        let caller = test_session(1);
        let callee = test_session(2);
        let relay = Relay::new(&caller, &callee);

        caller.set_relay(relay.clone());
        callee.set_relay(relay.clone());

        relay.disconnect_peer_of(caller.id);

        // The spawned task needs a moment to run.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(callee.is_disposed());
    }
}
