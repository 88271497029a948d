//! Shared `HandlerContext` fixture for handler unit tests. Mirrors the
//! fixture in `engine.rs`'s own test module; kept here so every handler
//! file can build a context without duplicating the wiring.

use std::sync::Arc;
use std::time::Duration;

use codec::message::Role;

use crate::handler::HandlerContext;
use crate::image_store::memory::InMemoryImageStore;
use crate::registry::SessionRegistry;
use crate::repository::memory::InMemoryRepository;

pub fn test_ctx(role: Role) -> HandlerContext {
    let registry = SessionRegistry::new();
    let session = registry.add_peer(
        role,
        "127.0.0.1:1".parse().unwrap(),
        false,
        Duration::from_secs(60),
        tokio::io::sink(),
    );

    HandlerContext {
        session,
        registry,
        repository: Arc::new(InMemoryRepository::new()),
        image_store: InMemoryImageStore::new(),
        node_keypair: Arc::new(codec::crypto::Keypair::generate()),
        role_endpoints: Arc::new(Vec::new()),
        max_hosted_identities: 10,
        max_profile_name_length_bytes: 64,
        max_profile_image_length_bytes: 65536,
        max_extra_data_length_bytes: 1024,
    }
}
