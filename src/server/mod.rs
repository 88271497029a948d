//! Role servers and process lifecycle. One accept-loop task per configured
//! role endpoint, one connection task per accepted socket, plus a single
//! idle-session scanner shared by the whole process.

mod connection;
mod tcp;
mod tls;

use std::sync::Arc;
use std::time::Duration;

use codec::crypto::Keypair;
use codec::message::RoleInfo;
use service::handler::HandlerTable;
use service::{HandlerContext, ImageStore, Repository, SessionRegistry};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::statistics::Statistics;

/// Everything every connection on every role server shares, bundled once at
/// startup instead of threaded through as separate arguments.
pub struct Collaborators {
    pub registry: Arc<SessionRegistry>,
    pub repository: Arc<dyn Repository>,
    pub image_store: Arc<dyn ImageStore>,
    pub node_keypair: Arc<Keypair>,
    pub role_endpoints: Arc<Vec<RoleInfo>>,
    pub config: Arc<Config>,
    pub table: Arc<HandlerTable>,
    pub statistics: Arc<Statistics>,
}

impl Collaborators {
    pub(crate) fn handler_context(&self, session: Arc<service::Session>) -> HandlerContext {
        HandlerContext {
            session,
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            image_store: self.image_store.clone(),
            node_keypair: self.node_keypair.clone(),
            role_endpoints: self.role_endpoints.clone(),
            max_hosted_identities: self.config.limits.max_hosted_identities,
            max_profile_name_length_bytes: self.config.limits.max_profile_name_length_bytes,
            max_profile_image_length_bytes: self.config.limits.max_profile_image_length_bytes,
            max_extra_data_length_bytes: self.config.limits.max_extra_data_length_bytes,
        }
    }
}

/// Bind retry policy: 10 attempts, `attempt * 3s` backoff between them.
const MAX_BIND_ATTEMPTS: u32 = 10;
const BIND_RETRY_UNIT: Duration = Duration::from_secs(3);

/// The idle scanner's wake interval.
const IDLE_SCAN_INTERVAL: Duration = Duration::from_secs(120);

/// How long a role server's accept loop is given to notice cancellation and
/// exit before `run` gives up waiting on it.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Starts one task per configured role endpoint plus the idle scanner, and
/// waits for `shutdown` to fire. Returns once every task has stopped or the
/// join timeout has elapsed.
pub async fn run(config: Arc<Config>, collaborators: Arc<Collaborators>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let mut tasks = Vec::with_capacity(config.role_endpoints.len() + 1);

    let tls_acceptor = match &config.ssl {
        Some(ssl) => Some(tls::build_acceptor(ssl)?),
        None => None,
    };

    for endpoint in config.role_endpoints.clone() {
        let collaborators = collaborators.clone();
        let child = shutdown.child_token();

        if endpoint.tls {
            let acceptor = tls_acceptor
                .clone()
                .expect("Config::validate guarantees ssl is present when any endpoint requires tls");
            tasks.push(tokio::spawn(async move { tls::run(endpoint, acceptor, collaborators, child).await }));
        } else {
            tasks.push(tokio::spawn(async move { tcp::run(endpoint, collaborators, child).await }));
        }
    }

    {
        let registry = collaborators.registry.clone();
        let child = shutdown.child_token();
        tasks.push(tokio::spawn(async move { idle_scanner(registry, child).await }));
    }

    shutdown.cancelled().await;
    log::info!("shutdown signaled, waiting up to {SHUTDOWN_JOIN_TIMEOUT:?} for role servers to stop");

    let joined = tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, futures_join_all(tasks)).await;
    if joined.is_err() {
        log::warn!("not every role server task stopped within the graceful shutdown window");
    }

    Ok(())
}

/// `futures::future::join_all` without adding a dependency on `futures` for
/// one call site.
async fn futures_join_all(tasks: Vec<tokio::task::JoinHandle<anyhow::Result<()>>>) {
    for task in tasks {
        if let Err(err) = task.await {
            log::warn!("role server task panicked: {err}");
        }
    }
}

/// Walks a registry snapshot every [`IDLE_SCAN_INTERVAL`] and closes every
/// session whose keep-alive deadline has passed.
async fn idle_scanner(registry: Arc<SessionRegistry>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                log::info!("idle scanner stopping");
                return;
            }
            _ = tokio::time::sleep(IDLE_SCAN_INTERVAL) => {}
        }

        let mut evicted = 0usize;
        for session in registry.snapshot() {
            if session.is_idle() {
                evicted += 1;
                session.close().await;
                registry.remove_peer(&session);
            }
        }

        if evicted > 0 {
            log::info!("idle scanner evicted {evicted} session(s)");
        }
    }
}

pub(crate) async fn bind_with_retry(addr: std::net::SocketAddr) -> anyhow::Result<tokio::net::TcpListener> {
    let mut attempt = 0u32;
    loop {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(err) if attempt < MAX_BIND_ATTEMPTS => {
                attempt += 1;
                log::warn!("bind failed (attempt {attempt}/{MAX_BIND_ATTEMPTS}): addr={addr} err={err}");
                tokio::time::sleep(BIND_RETRY_UNIT * attempt).await;
            }
            Err(err) => {
                return Err(anyhow::anyhow!(
                    "failed to bind {addr} after {MAX_BIND_ATTEMPTS} attempts: {err}"
                ))
            }
        }
    }
}
