pub mod config;
pub mod server;
pub mod statistics;

use std::sync::Arc;

use codec::crypto::Keypair;
use service::build_handler_table;
use service::image_store::memory::InMemoryImageStore;
use service::repository::memory::InMemoryRepository;
use service::SessionRegistry;
use tokio_util::sync::CancellationToken;

use config::Config;
use server::Collaborators;
use statistics::Statistics;

/// Assembles the process's collaborators and runs every role server until
/// `shutdown` fires or a `SIGINT`/`SIGTERM` arrives.
///
/// Exposed as a library entry point, not just a binary's `main`, so an
/// embedder can construct its own `Repository`/`ImageStore` and call
/// [`server::run`] directly instead of going through this default wiring.
/// Storage backends are treated as an external collaborator the binary
/// merely defaults.
pub async fn server_main(config: Arc<Config>) -> anyhow::Result<()> {
    let node_keypair = Arc::new(Keypair::generate());
    let node_identity = codec::crypto::identity_id(&node_keypair.public_key_bytes());
    log::info!(
        "node identity: {}",
        node_identity.iter().map(|byte| format!("{byte:02x}")).collect::<String>()
    );

    let collaborators = Arc::new(Collaborators {
        registry: SessionRegistry::new(),
        repository: Arc::new(InMemoryRepository::new()) as _,
        image_store: InMemoryImageStore::new() as _,
        node_keypair,
        role_endpoints: Arc::new(config.role_infos()),
        config: config.clone(),
        table: Arc::new(build_handler_table()),
        statistics: Arc::new(Statistics::default()),
    });

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::warn!("failed to install ctrl-c handler: {err}");
            return;
        }
        log::info!("received shutdown signal");
        signal_shutdown.cancel();
    });

    server::run(config, collaborators, shutdown).await
}
