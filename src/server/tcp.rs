//! Plain-TCP role server accept loop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::RoleEndpoint;

use super::Collaborators;

pub(crate) async fn run(endpoint: RoleEndpoint, collaborators: Arc<Collaborators>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let bind_addr = SocketAddr::new(endpoint.interface, endpoint.port);
    let listener = super::bind_with_retry(bind_addr).await?;
    let role = endpoint.role.to_role();
    let keep_alive = crate::config::keep_alive_interval_for(endpoint.role);

    log::info!("tcp role server listening: role={role:?} addr={bind_addr}");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                log::info!("tcp role server stopping: addr={bind_addr}");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (socket, remote) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        log::warn!("tcp accept failed: addr={bind_addr} err={err}");
                        continue;
                    }
                };

                if let Err(err) = socket.set_nodelay(true) {
                    log::warn!("tcp set_nodelay failed: remote={remote} err={err}");
                }

                let collaborators = collaborators.clone();
                let connection_shutdown = shutdown.child_token();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = connection_shutdown.cancelled() => {}
                        _ = super::connection::serve(socket, remote, role, false, keep_alive, collaborators) => {}
                    }
                });
            }
        }
    }
}
