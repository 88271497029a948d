//! Process-wide session indexes. Three indexes live under one lock: every
//! live peer by connection id, peers that have revealed a public key by
//! identity id, and the single online slot per identity for customer
//! roles.

use std::time::Duration;

use ahash::HashMap;
use codec::message::Role;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::session::{Session, SessionId};

const DEFAULT_CAPACITY: usize = 1024;

struct Indexes {
    by_conn_id: HashMap<SessionId, Arc<Session>>,
    by_identity_id: HashMap<[u8; 32], Vec<Arc<Session>>>,
    checked_in: HashMap<[u8; 32], Arc<Session>>,
    role_sequences: HashMap<u16, u64>,
}

impl Default for Indexes {
    fn default() -> Self {
        Self {
            by_conn_id: HashMap::with_capacity_and_hasher(DEFAULT_CAPACITY, Default::default()),
            by_identity_id: HashMap::with_capacity_and_hasher(DEFAULT_CAPACITY, Default::default()),
            checked_in: HashMap::with_capacity_and_hasher(DEFAULT_CAPACITY, Default::default()),
            role_sequences: HashMap::default(),
        }
    }
}

/// The process-wide registry, shared behind an `Arc` across every role
/// server. All three indexes are linearizable under the same lock.
#[derive(Default)]
pub struct SessionRegistry {
    indexes: Mutex<Indexes>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Assigns a role-tagged, role-monotonic `conn_id`, constructs the
    /// session, and inserts it into `by_conn_id`.
    pub fn add_peer(
        &self,
        role: Role,
        remote_endpoint: std::net::SocketAddr,
        use_tls: bool,
        keep_alive_interval: Duration,
        writer: impl tokio::io::AsyncWrite + Send + Unpin + 'static,
    ) -> Arc<Session> {
        let mut indexes = self.indexes.lock();
        let sequence = indexes.role_sequences.entry(role.bits()).or_insert(0);
        *sequence += 1;

        let session = Arc::new(Session::new(
            SessionId::new(role, *sequence),
            remote_endpoint,
            use_tls,
            role,
            keep_alive_interval,
            writer,
        ));

        indexes.by_conn_id.insert(session.id, session.clone());
        session
    }

    /// Precondition: `session` is already in `by_conn_id`. Violating it is
    /// a programmer error; this is logged rather than panicking, since
    /// registry bookkeeping errors are not fatal to the connection.
    pub fn add_peer_with_identity(
        &self,
        session: &Arc<Session>,
        public_key: Vec<u8>,
        identity_id: [u8; 32],
    ) {
        session.set_identity(public_key, identity_id);

        let mut indexes = self.indexes.lock();
        if !indexes.by_conn_id.contains_key(&session.id) {
            log::warn!(
                "add_peer_with_identity called for a session not present in by_conn_id: conn_id={:?}",
                session.id
            );
        }

        indexes
            .by_identity_id
            .entry(identity_id)
            .or_default()
            .push(session.clone());
    }

    /// Registers `session` as the unique online slot for its identity.
    /// Returns the session it displaced, if any — the newer connection
    /// always wins and the older is closed by the caller, kept out of the
    /// registry lock's critical section.
    pub fn add_checked_in(&self, session: &Arc<Session>) -> Option<Arc<Session>> {
        let identity_id = session
            .identity_id()
            .expect("add_checked_in requires a session with an established identity");

        let previous = {
            let mut indexes = self.indexes.lock();
            if !indexes.by_conn_id.contains_key(&session.id) {
                log::warn!(
                    "add_checked_in called for a session not present in by_conn_id: conn_id={:?}",
                    session.id
                );
            }

            let previous = indexes.checked_in.insert(identity_id, session.clone());
            previous
        };

        session.set_checked_in_client(true);
        if let Some(previous) = &previous {
            previous.set_checked_in_client(false);
        }

        previous
    }

    /// Removes `session` from every index. Absence from `by_identity_id` is
    /// expected for sessions that never started a conversation; absence
    /// from `checked_in` is only logged as suspicious when the session
    /// believed itself to be checked in.
    pub fn remove_peer(&self, session: &Arc<Session>) {
        let mut indexes = self.indexes.lock();

        if indexes.by_conn_id.remove(&session.id).is_none() {
            log::warn!("remove_peer: conn_id={:?} was already absent from by_conn_id", session.id);
        }

        if let Some(identity_id) = session.identity_id() {
            if let Some(list) = indexes.by_identity_id.get_mut(&identity_id) {
                list.retain(|s| s.id != session.id);
                if list.is_empty() {
                    indexes.by_identity_id.remove(&identity_id);
                }
            }

            let was_current = indexes
                .checked_in
                .get(&identity_id)
                .map(|s| s.id == session.id)
                .unwrap_or(false);

            if was_current {
                indexes.checked_in.remove(&identity_id);
            } else if session.is_checked_in_client() {
                log::warn!(
                    "remove_peer: session conn_id={:?} believed itself checked-in but was absent or already displaced",
                    session.id
                );
            }
        }
    }

    /// A point-in-time copy of every live session, for the idle scanner.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.indexes.lock().by_conn_id.values().cloned().collect()
    }

    pub fn get_checked_in(&self, identity_id: &[u8; 32]) -> Option<Arc<Session>> {
        self.indexes.lock().checked_in.get(identity_id).cloned()
    }

    pub fn checked_in_count_for(&self, identity_id: &[u8; 32]) -> usize {
        usize::from(self.indexes.lock().checked_in.contains_key(identity_id))
    }

    pub fn len(&self) -> usize {
        self.indexes.lock().by_conn_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
