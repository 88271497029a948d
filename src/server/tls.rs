//! TLS role server accept loop: same accept loop as [`super::tcp`] with the
//! socket wrapped through a [`TlsAcceptor`] before the frame codec ever
//! sees it.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::pem::PemObject;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use crate::config::{RoleEndpoint, Ssl};

use super::Collaborators;

pub(crate) fn build_acceptor(ssl: &Ssl) -> anyhow::Result<TlsAcceptor> {
    let certificate_chain = CertificateDer::pem_file_iter(&ssl.certificate_chain)?.collect::<Result<Vec<_>, _>>()?;
    let private_key = PrivateKeyDer::from_pem_file(&ssl.private_key)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certificate_chain, private_key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

pub(crate) async fn run(endpoint: RoleEndpoint, acceptor: TlsAcceptor, collaborators: Arc<Collaborators>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let bind_addr = SocketAddr::new(endpoint.interface, endpoint.port);
    let listener = super::bind_with_retry(bind_addr).await?;
    let role = endpoint.role.to_role();
    let keep_alive = crate::config::keep_alive_interval_for(endpoint.role);

    log::info!("tls role server listening: role={role:?} addr={bind_addr}");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                log::info!("tls role server stopping: addr={bind_addr}");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (socket, remote) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        log::warn!("tls accept failed: addr={bind_addr} err={err}");
                        continue;
                    }
                };

                if let Err(err) = socket.set_nodelay(true) {
                    log::warn!("tls set_nodelay failed: remote={remote} err={err}");
                }

                let acceptor = acceptor.clone();
                let collaborators = collaborators.clone();
                let connection_shutdown = shutdown.child_token();

                tokio::spawn(async move {
                    let stream = match acceptor.accept(socket).await {
                        Ok(stream) => stream,
                        Err(err) => {
                            log::warn!("tls handshake failed: remote={remote} err={err}");
                            return;
                        }
                    };

                    tokio::select! {
                        _ = connection_shutdown.cancelled() => {}
                        _ = super::connection::serve(stream, remote, role, true, keep_alive, collaborators) => {}
                    }
                });
            }
        }
    }
}
