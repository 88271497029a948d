//! Per-connection state: the conversation status machine, the pending
//! outbound-request map (the outbound correlator), and the single-writer
//! stream lock.

use std::{
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
    time::{Duration, Instant},
};

use codec::{
    frame,
    message::{Message, RequestBody, ResponseMessage, Role, Status},
};
use parking_lot::Mutex;
use tokio::{io::AsyncWrite, sync::oneshot};

use crate::relay::Relay;
use std::sync::Arc;

/// Upper bound on `Session::pending_out_requests`. An insert beyond this cap
/// is rejected before any byte is written.
pub const MAX_UNFINISHED_REQUESTS: usize = 20;

/// Upper bound on `Session::application_services`.
pub const MAX_APPLICATION_SERVICES: usize = 50;

/// A connection identifier whose top 16 bits carry the role of the listener
/// it was accepted on, partitioning the id space per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(role: Role, sequence: u64) -> Self {
        Self(((role.bits() as u64) << 48) | (sequence & 0x0000_FFFF_FFFF_FFFF))
    }

    pub fn role_bits(self) -> u16 {
        (self.0 >> 48) as u16
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// The per-connection conversation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStatus {
    NoConversation,
    ConversationStarted,
    Verified,
    Authenticated,
}

impl ConversationStatus {
    /// Whether `self` satisfies a handler's `required_status`:
    /// `Verified`/`Authenticated` gates are satisfied by an exact match OR
    /// by `Authenticated` (the strictly-more-trusted state);
    /// `NoConversation`/`ConversationStarted` gates require an exact match.
    ///
    /// # Test
    ///
    /// ```
    /// use profile_node_service::ConversationStatus::*;
    ///
    /// assert!(Authenticated.satisfies(Verified));
    /// assert!(Verified.satisfies(Verified));
    /// assert!(!Verified.satisfies(Authenticated));
    /// assert!(!ConversationStarted.satisfies(NoConversation));
    /// ```
    pub fn satisfies(self, required: ConversationStatus) -> bool {
        use ConversationStatus::*;
        match required {
            NoConversation | ConversationStarted => self == required,
            Verified | Authenticated => self == required || self == Authenticated,
        }
    }
}

/// An outbound request awaiting a correlated response. `responder` is
/// fulfilled exactly once, by whichever inbound response the conversation
/// engine matches to this entry's id.
pub struct PendingRequest {
    pub request: RequestBody,
    pub responder: oneshot::Sender<ResponseMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    QuotaExceeded,
    Io,
}

/// What a caller should do with the connection after an I/O operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOutcome {
    KeepOpen,
    Close,
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One TCP/TLS connection's state. Generic over neither TLS nor plain TCP:
/// the writer half is stored as a boxed `AsyncWrite` so one `Session` type
/// serves every role server regardless of whether its listener is
/// encrypted, mirroring how the registry and engine need not know which
/// transport a given connection uses.
pub struct Session {
    pub id: SessionId,
    pub remote_endpoint: std::net::SocketAddr,
    pub use_tls: bool,
    pub role: Role,

    keep_alive_interval: Duration,
    keep_alive_deadline: Mutex<Instant>,

    conversation_status: Mutex<ConversationStatus>,
    public_key: Mutex<Option<Vec<u8>>>,
    identity_id: Mutex<Option<[u8; 32]>>,
    authentication_challenge: Mutex<Option<[u8; 32]>>,
    is_checked_in_client: AtomicBool,
    application_services: Mutex<Vec<String>>,
    relay: Mutex<Option<Arc<Relay>>>,

    pending: Mutex<ahash::HashMap<u32, PendingRequest>>,
    next_request_seq: AtomicU32,

    writer: tokio::sync::Mutex<BoxedWriter>,
    disposed: AtomicBool,
    dispose_lock: tokio::sync::Mutex<()>,

    pub force_disconnect: AtomicBool,
}

impl Session {
    pub fn new(
        id: SessionId,
        remote_endpoint: std::net::SocketAddr,
        use_tls: bool,
        role: Role,
        keep_alive_interval: Duration,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            id,
            remote_endpoint,
            use_tls,
            role,
            keep_alive_interval,
            keep_alive_deadline: Mutex::new(Instant::now() + keep_alive_interval),
            conversation_status: Mutex::new(ConversationStatus::NoConversation),
            public_key: Mutex::new(None),
            identity_id: Mutex::new(None),
            authentication_challenge: Mutex::new(None),
            is_checked_in_client: AtomicBool::new(false),
            application_services: Mutex::new(Vec::new()),
            relay: Mutex::new(None),
            pending: Mutex::new(ahash::HashMap::with_capacity(MAX_UNFINISHED_REQUESTS)),
            next_request_seq: AtomicU32::new(0),
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            disposed: AtomicBool::new(false),
            dispose_lock: tokio::sync::Mutex::new(()),
            force_disconnect: AtomicBool::new(false),
        }
    }

    /// Push the idle deadline out on every inbound message.
    pub fn refresh_keep_alive(&self) {
        *self.keep_alive_deadline.lock() = Instant::now() + self.keep_alive_interval;
    }

    pub fn is_idle(&self) -> bool {
        Instant::now() >= *self.keep_alive_deadline.lock()
    }

    pub fn conversation_status(&self) -> ConversationStatus {
        *self.conversation_status.lock()
    }

    pub fn set_conversation_status(&self, status: ConversationStatus) {
        *self.conversation_status.lock() = status;
    }

    pub fn public_key(&self) -> Option<Vec<u8>> {
        self.public_key.lock().clone()
    }

    pub fn identity_id(&self) -> Option<[u8; 32]> {
        *self.identity_id.lock()
    }

    pub fn set_identity(&self, public_key: Vec<u8>, identity_id: [u8; 32]) {
        *self.public_key.lock() = Some(public_key);
        *self.identity_id.lock() = Some(identity_id);
    }

    pub fn authentication_challenge(&self) -> Option<[u8; 32]> {
        *self.authentication_challenge.lock()
    }

    pub fn set_authentication_challenge(&self, challenge: [u8; 32]) {
        *self.authentication_challenge.lock() = Some(challenge);
    }

    pub fn is_checked_in_client(&self) -> bool {
        self.is_checked_in_client.load(Ordering::Acquire)
    }

    pub fn set_checked_in_client(&self, value: bool) {
        self.is_checked_in_client.store(value, Ordering::Release);
    }

    pub fn relay(&self) -> Option<Arc<Relay>> {
        self.relay.lock().clone()
    }

    pub fn set_relay(&self, relay: Arc<Relay>) {
        *self.relay.lock() = Some(relay);
    }

    /// Copy-modify-check-swap insert: quota violations leave the original
    /// set untouched, and the add is all-or-nothing against a strict `<`
    /// bound, not `<=`.
    ///
    /// # Test
    ///
    /// ```
    /// use profile_node_service::session::{Session, SessionId};
    /// use codec::message::Role;
    /// use std::time::Duration;
    ///
    /// let session = Session::new(
    ///     SessionId::new(Role::CLIENT_CUSTOMER, 1),
    ///     "127.0.0.1:1".parse().unwrap(),
    ///     false,
    ///     Role::CLIENT_CUSTOMER,
    ///     Duration::from_secs(60),
    ///     tokio::io::sink(),
    /// );
    ///
    /// assert!(session.add_application_services(&["a".into(), "b".into()]));
    /// assert_eq!(session.application_services(), vec!["a".to_string(), "b".to_string()]);
    /// assert!(!session.add_application_services(&["a".into()])); // already present is fine...
    /// ```
    pub fn add_application_services(&self, names: &[String]) -> bool {
        let mut guard = self.application_services.lock();
        let mut candidate = guard.clone();
        for name in names {
            if !candidate.contains(name) {
                candidate.push(name.clone());
            }
        }

        if candidate.len() >= MAX_APPLICATION_SERVICES {
            return false;
        }

        *guard = candidate;
        true
    }

    pub fn remove_application_service(&self, name: &str) -> bool {
        let mut guard = self.application_services.lock();
        let before = guard.len();
        guard.retain(|n| n != name);
        guard.len() != before
    }

    pub fn application_services(&self) -> Vec<String> {
        self.application_services.lock().clone()
    }

    /// `id = base + atomic_fetch_add(1)`, `base` encoding this session's
    /// role in its high bits, keeping outbound message-id spaces disjoint
    /// across role servers in one process.
    fn next_request_id(&self) -> u32 {
        let seq = self.next_request_seq.fetch_add(1, Ordering::Relaxed);
        ((self.role.bits() as u32) << 16) | (seq & 0xFFFF)
    }

    /// Insert a pending entry and write the request. Fails closed:
    /// `QuotaExceeded` leaves the pending map untouched and nothing is
    /// written; a write failure after a successful insert rolls the insert
    /// back.
    pub async fn send_and_expect_response(
        &self,
        request: RequestBody,
    ) -> Result<(u32, oneshot::Receiver<ResponseMessage>), SendError> {
        let id = self.next_request_id();

        {
            let pending = self.pending.lock();
            if pending.len() >= MAX_UNFINISHED_REQUESTS {
                return Err(SendError::QuotaExceeded);
            }
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            id,
            PendingRequest {
                request: request.clone(),
                responder: tx,
            },
        );

        let message = Message::Request(codec::message::RequestMessage { id, body: request });
        if self.write_frame(&message).await.is_err() {
            self.pending.lock().remove(&id);
            return Err(SendError::Io);
        }

        Ok((id, rx))
    }

    /// Write a response. The caller keeps the connection open unless the
    /// response carries `ErrorProtocolViolation`.
    pub async fn send_message(&self, response: ResponseMessage) -> Result<IoOutcome, std::io::Error> {
        let close_after = response.status == Status::ErrorProtocolViolation;
        let message = Message::Response(response);
        self.write_frame(&message).await?;

        Ok(if close_after {
            IoOutcome::Close
        } else {
            IoOutcome::KeepOpen
        })
    }

    async fn write_frame(&self, message: &Message) -> std::io::Result<()> {
        let body = message.encode();
        let mut writer = self.writer.lock().await;
        frame::write_frame(&mut *writer, &body).await
    }

    pub fn take_pending(&self, id: u32) -> Option<PendingRequest> {
        self.pending.lock().remove(&id)
    }

    pub fn take_all_pending(&self) -> Vec<PendingRequest> {
        self.pending.lock().drain().map(|(_, v)| v).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Idempotent under `disposed`: the second and later calls are no-ops.
    /// If a relay is attached, its peer side is notified to disconnect too.
    pub async fn close(self: &Arc<Self>) {
        let _guard = self.dispose_lock.lock().await;
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.handle_disconnect();

        use tokio::io::AsyncWriteExt;
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Notify the attached relay, if any, that this side is gone so the
    /// peer side is torn down too.
    pub fn handle_disconnect(&self) {
        if let Some(relay) = self.relay() {
            relay.disconnect_peer_of(self.id);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_endpoint", &self.remote_endpoint)
            .field("use_tls", &self.use_tls)
            .field("conversation_status", &self.conversation_status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session(role: Role) -> Arc<Session> {
        Arc::new(Session::new(
            SessionId::new(role, 1),
            "127.0.0.1:1".parse().unwrap(),
            false,
            role,
            Duration::from_secs(60),
            tokio::io::sink(),
        ))
    }

    #[tokio::test]
    async fn send_and_expect_response_respects_quota() {
        let session = test_session(Role::CLIENT_CUSTOMER);

        let single_list_roles = || RequestBody::Single {
            version: codec::message::Version::CURRENT,
            request: codec::message::SingleRequest::ListRoles,
        };

        for _ in 0..MAX_UNFINISHED_REQUESTS {
            session
                .send_and_expect_response(single_list_roles())
                .await
                .unwrap();
        }

        let result = session.send_and_expect_response(single_list_roles()).await;

        assert_eq!(result.err(), Some(SendError::QuotaExceeded));
        assert_eq!(session.pending_len(), MAX_UNFINISHED_REQUESTS);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let session = test_session(Role::PRIMARY);
        session.close().await;
        session.close().await;
        assert!(session.is_disposed());
    }

    #[test]
    fn application_service_quota_is_all_or_nothing() {
        let session = test_session(Role::CLIENT_CUSTOMER);
        let many: Vec<String> = (0..MAX_APPLICATION_SERVICES).map(|i| i.to_string()).collect();

        assert!(!session.add_application_services(&many));
        assert!(session.application_services().is_empty());
    }
}
