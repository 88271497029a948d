//! The per-connection read loop shared by every transport: one task per
//! accepted socket, split into independent reader/writer halves, with the
//! registry/session/frame-codec plumbing factored out so `tcp.rs`/`tls.rs`
//! only differ in how they produce the stream.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use codec::frame::{FrameError, FrameReader};
use codec::message::{Message, Role};
use service::dispatch;
use tokio::io::{AsyncRead, AsyncWrite};

use super::Collaborators;

/// Accepts one connection's lifetime: registers a [`service::Session`],
/// reads frames until the peer disconnects or a fatal error occurs, and
/// unregisters it again on the way out.
pub(crate) async fn serve<S>(stream: S, remote: SocketAddr, role: Role, use_tls: bool, keep_alive: Duration, collaborators: Arc<Collaborators>)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);
    let session = collaborators.registry.add_peer(role, remote, use_tls, keep_alive, writer);
    collaborators.statistics.record_session_accepted();

    log::info!("session accepted: conn_id={:?} role={:?} remote={remote} tls={use_tls}", session.id, role);

    let ctx = collaborators.handler_context(session.clone());
    let mut frame_reader = FrameReader::new();

    loop {
        if session.force_disconnect.load(Ordering::Acquire) || session.is_disposed() {
            break;
        }

        let body = match frame_reader.read_frame(&mut reader).await {
            Ok(body) => body,
            Err(FrameError::Closed) => break,
            Err(err) => {
                log::warn!("frame read failed: conn_id={:?} err={err}", session.id);
                collaborators.statistics.record_protocol_violation();
                break;
            }
        };

        let message = match Message::decode(&body) {
            Ok(message) => message,
            Err(err) => {
                log::warn!("message decode failed: conn_id={:?} err={err}", session.id);
                collaborators.statistics.record_protocol_violation();
                let _ = session.send_message(codec::message::ResponseMessage::protocol_violation()).await;
                break;
            }
        };

        if let Message::Request(request) = &message {
            collaborators.statistics.record_dispatch(service::handler::classify(&request.body));
        }

        match dispatch(&ctx, &collaborators.table, message).await {
            service::engine::IoOutcome::KeepOpen => {}
            service::engine::IoOutcome::ProtocolViolation => {
                collaborators.statistics.record_protocol_violation();
                break;
            }
            service::engine::IoOutcome::Close => break,
        }
    }

    log::info!("session closing: conn_id={:?} remote={remote}", session.id);
    session.close().await;
    collaborators.registry.remove_peer(&session);
}
