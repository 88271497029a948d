//! TOML configuration. Every nested struct follows the same
//! `#[serde(default = "...")]` / `impl Default` pairing, and the whole
//! document is validated once after parsing rather than scattering checks
//! across the fields that use it.

use std::fs::read_to_string;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Deserialize;

use codec::message::{Role, RoleInfo};

#[derive(Parser, Debug)]
#[command(author, version, about = "A multi-role TLS/TCP home node for a peer-to-peer profile server network.")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short)]
    config: Option<String>,
}

/// The role a listener is tagged with in the config file. Kept distinct
/// from [`codec::message::Role`] so the wire bit flags aren't tied to a
/// particular serde representation.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoleName {
    Primary,
    ServerNeighbor,
    ClientCustomer,
    ClientNonCustomer,
    ClientAppService,
}

impl RoleName {
    pub fn to_role(self) -> Role {
        match self {
            RoleName::Primary => Role::PRIMARY,
            RoleName::ServerNeighbor => Role::SERVER_NEIGHBOR,
            RoleName::ClientCustomer => Role::CLIENT_CUSTOMER,
            RoleName::ClientNonCustomer => Role::CLIENT_NON_CUSTOMER,
            RoleName::ClientAppService => Role::CLIENT_APP_SERVICE,
        }
    }

    fn is_server_facing(self) -> bool {
        matches!(self, RoleName::Primary | RoleName::ServerNeighbor)
    }
}

/// Default keep-alive deadlines: 300s for server-facing roles, 60s for
/// client-facing roles.
pub fn keep_alive_interval_for(role: RoleName) -> Duration {
    if role.is_server_facing() {
        Duration::from_secs(300)
    } else {
        Duration::from_secs(60)
    }
}

fn default_interface() -> IpAddr {
    "0.0.0.0".parse().expect("valid literal")
}

fn default_tls() -> bool {
    false
}

/// One listening role server: `(interface, port, tls, role)`.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct RoleEndpoint {
    #[serde(default = "default_interface")]
    pub interface: IpAddr,
    pub port: u16,
    pub role: RoleName,
    #[serde(default = "default_tls")]
    pub tls: bool,
}

impl RoleEndpoint {
    pub fn to_role_info(&self) -> RoleInfo {
        RoleInfo {
            role: self.role.to_role(),
            port: self.port,
            tcp: !self.tls,
            tls: self.tls,
        }
    }
}

/// PEM private key + certificate chain for `tokio-rustls`, which has no
/// PKCS#12 loader of its own.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Ssl {
    pub private_key: PathBuf,
    pub certificate_chain: PathBuf,
}

/// Where images and scratch files live on disk. Consumed by whatever
/// concrete `ImageStore` the embedder wires in; the shipped in-memory store
/// ignores these paths.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Storage {
    #[serde(default = "Storage::default_image_data_folder")]
    pub image_data_folder: PathBuf,
    #[serde(default = "Storage::default_tmp_data_folder")]
    pub tmp_data_folder: PathBuf,
}

impl Storage {
    fn default_image_data_folder() -> PathBuf {
        PathBuf::from("./data/images")
    }

    fn default_tmp_data_folder() -> PathBuf {
        PathBuf::from("./data/tmp")
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            image_data_folder: Self::default_image_data_folder(),
            tmp_data_folder: Self::default_tmp_data_folder(),
        }
    }
}

/// Per-table and per-field quotas.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    #[serde(default = "Limits::default_max_hosted_identities")]
    pub max_hosted_identities: usize,
    /// Carried for config-schema completeness; the relationship table
    /// itself, and any peer-discovery logic over it, is out of scope for
    /// this engine.
    #[serde(default = "Limits::default_max_identity_relations")]
    pub max_identity_relations: usize,
    #[serde(default = "Limits::default_max_profile_name_length_bytes")]
    pub max_profile_name_length_bytes: usize,
    #[serde(default = "Limits::default_max_profile_image_length_bytes")]
    pub max_profile_image_length_bytes: usize,
    #[serde(default = "Limits::default_max_extra_data_length_bytes")]
    pub max_extra_data_length_bytes: usize,
}

impl Limits {
    fn default_max_hosted_identities() -> usize {
        10_000
    }

    fn default_max_identity_relations() -> usize {
        1_000
    }

    fn default_max_profile_name_length_bytes() -> usize {
        64
    }

    fn default_max_profile_image_length_bytes() -> usize {
        65_536
    }

    fn default_max_extra_data_length_bytes() -> usize {
        1_024
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_hosted_identities: Self::default_max_hosted_identities(),
            max_identity_relations: Self::default_max_identity_relations(),
            max_profile_name_length_bytes: Self::default_max_profile_name_length_bytes(),
            max_profile_image_length_bytes: Self::default_max_profile_image_length_bytes(),
            max_extra_data_length_bytes: Self::default_max_extra_data_length_bytes(),
        }
    }
}

/// The peer-discovery/CAN subsystem's own config keys. Parsed for schema
/// fidelity and port-collision checking only: peer discovery and the
/// business logic built on top of it are out of scope for this engine, so
/// nothing here drives runtime behavior.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct PeerDiscovery {
    #[serde(default = "PeerDiscovery::default_lbn_port")]
    pub lbn_port: u16,
    #[serde(default = "PeerDiscovery::default_can_api_port")]
    pub can_api_port: u16,
    #[serde(default = "PeerDiscovery::default_neighbor_profiles_expiration_time")]
    pub neighbor_profiles_expiration_time: u64,
    #[serde(default = "PeerDiscovery::default_follower_refresh_time")]
    pub follower_refresh_time: u64,
    #[serde(default = "PeerDiscovery::default_max_neighborhood_size")]
    pub max_neighborhood_size: usize,
    #[serde(default = "PeerDiscovery::default_max_follower_servers_count")]
    pub max_follower_servers_count: usize,
    #[serde(default = "PeerDiscovery::default_neighborhood_initialization_parallelism")]
    pub neighborhood_initialization_parallelism: usize,
}

impl PeerDiscovery {
    fn default_lbn_port() -> u16 {
        7700
    }

    fn default_can_api_port() -> u16 {
        7701
    }

    fn default_neighbor_profiles_expiration_time() -> u64 {
        3600
    }

    fn default_follower_refresh_time() -> u64 {
        3600
    }

    fn default_max_neighborhood_size() -> usize {
        64
    }

    fn default_max_follower_servers_count() -> usize {
        16
    }

    fn default_neighborhood_initialization_parallelism() -> usize {
        4
    }
}

impl Default for PeerDiscovery {
    fn default() -> Self {
        Self {
            lbn_port: Self::default_lbn_port(),
            can_api_port: Self::default_can_api_port(),
            neighbor_profiles_expiration_time: Self::default_neighbor_profiles_expiration_time(),
            follower_refresh_time: Self::default_follower_refresh_time(),
            max_neighborhood_size: Self::default_max_neighborhood_size(),
            max_follower_servers_count: Self::default_max_follower_servers_count(),
            neighborhood_initialization_parallelism: Self::default_neighborhood_initialization_parallelism(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match self {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Log {
    #[serde(default = "Log::default_level")]
    pub level: LogLevel,
}

impl Log {
    fn default_level() -> LogLevel {
        LogLevel::Info
    }
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

fn default_test_mode() -> bool {
    false
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_interface")]
    pub server_interface: IpAddr,
    pub role_endpoints: Vec<RoleEndpoint>,
    #[serde(default)]
    pub ssl: Option<Ssl>,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub peer_discovery: PeerDiscovery,
    #[serde(default)]
    pub log: Log,
    #[serde(default = "default_test_mode")]
    pub test_mode: bool,
}

impl Config {
    /// Reads `--config <path>` (clap), parses the TOML there, and validates
    /// it. An absent `--config` parses an empty document, which only
    /// succeeds if every field has a default — `role_endpoints` does not, so
    /// running with no flag at all is a deliberate hard failure rather than
    /// silently binding nothing.
    pub fn load() -> Result<Self> {
        let cli = Cli::parse();
        let path = cli.config.ok_or_else(|| anyhow!("missing required --config <path>"))?;
        let raw = read_to_string(&path).map_err(|err| anyhow!("failed to read config file {path}: {err}"))?;
        let config: Config = toml::from_str(&raw).map_err(|err| anyhow!("failed to parse config file {path}: {err}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Port collisions between role endpoints and the peer-discovery ports
    /// are rejected at load.
    fn validate(&self) -> Result<()> {
        if self.role_endpoints.is_empty() {
            return Err(anyhow!("role_endpoints must declare at least one listener"));
        }

        let mut seen: Vec<(IpAddr, u16)> = Vec::with_capacity(self.role_endpoints.len());
        for endpoint in &self.role_endpoints {
            let key = (endpoint.interface, endpoint.port);
            if seen.contains(&key) {
                return Err(anyhow!("duplicate role endpoint binding: {}:{}", key.0, key.1));
            }
            if endpoint.port == self.peer_discovery.lbn_port || endpoint.port == self.peer_discovery.can_api_port {
                return Err(anyhow!(
                    "role endpoint port {} collides with a peer-discovery port",
                    endpoint.port
                ));
            }
            seen.push(key);
        }

        if self.role_endpoints.iter().any(|e| e.tls) && self.ssl.is_none() {
            return Err(anyhow!("at least one role endpoint requires tls but no [ssl] section was provided"));
        }

        Ok(())
    }

    pub fn role_infos(&self) -> Vec<RoleInfo> {
        self.role_endpoints.iter().map(RoleEndpoint::to_role_info).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<Config> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn parses_a_minimal_document_with_defaults() {
        let config = parse(
            r#"
            [[role_endpoints]]
            port = 9001
            role = "primary"
            "#,
        )
        .unwrap();

        assert_eq!(config.role_endpoints.len(), 1);
        assert_eq!(config.limits.max_hosted_identities, 10_000);
        assert!(!config.test_mode);
    }

    #[test]
    fn rejects_duplicate_endpoint_bindings() {
        let err = parse(
            r#"
            [[role_endpoints]]
            port = 9001
            role = "primary"

            [[role_endpoints]]
            port = 9001
            role = "client_customer"
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rejects_tls_endpoint_without_ssl_section() {
        let err = parse(
            r#"
            [[role_endpoints]]
            port = 9001
            role = "primary"
            tls = true
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("ssl"));
    }

    #[test]
    fn keep_alive_differs_by_role_class() {
        assert_eq!(keep_alive_interval_for(RoleName::Primary), Duration::from_secs(300));
        assert_eq!(keep_alive_interval_for(RoleName::ClientCustomer), Duration::from_secs(60));
    }
}
