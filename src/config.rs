// Configuration, per spec §6 and §10.3.
//
// Two layers compose into one `Config`: a `ClapConfig` (CLI flags / env
// vars) is parsed first, then an optional `--config <path>` JSON file
// supplies defaults for whatever the CLI left unset. CLI wins on conflict.

use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Deserialize;

use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Master,
    Agent,
    AgentPublic,
}

#[derive(Parser, Debug)]
#[clap(author, version, about = "Node-local HTTP gateway for journal and sandbox logs")]
struct ClapConfig {
    /// HTTP listen port, 1024-65535.
    #[clap(long, env = "NODELOGD_PORT")]
    port: Option<u16>,

    /// Enable debug logging by default when RUST_LOG is unset.
    #[clap(long, env = "NODELOGD_VERBOSE")]
    verbose: bool,

    /// Path to a JSON config file merged under the CLI flags.
    #[clap(long, env = "NODELOGD_CONFIG")]
    config: Option<PathBuf>,

    /// Require a bearer token and enable HTTPS probes to the files API.
    #[clap(long, env = "NODELOGD_AUTH")]
    auth: bool,

    /// PEM file for verifying upstream HTTPS. Skip verification if absent.
    #[clap(long = "ca-cert", env = "NODELOGD_CA_CERT")]
    ca_cert: Option<PathBuf>,

    /// Duration string for GET probes, e.g. "5s".
    #[clap(long, env = "NODELOGD_TIMEOUT")]
    #[clap(value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Cluster role this node plays.
    #[clap(long, env = "NODELOGD_ROLE")]
    role: Option<Role>,

    /// Address the files API / cluster state probes run on.
    #[clap(long = "node-ip", env = "NODELOGD_NODE_IP")]
    node_ip: Option<IpAddr>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
struct ConfigFile {
    port: Option<u16>,
    verbose: Option<bool>,
    auth: Option<bool>,
    ca_cert: Option<PathBuf>,
    #[serde(default, with = "humantime_serde::option")]
    timeout: Option<Duration>,
    role: Option<Role>,
    node_ip: Option<IpAddr>,
}

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub verbose: bool,
    pub auth: bool,
    pub ca_cert: Option<PathBuf>,
    pub timeout: Duration,
    pub role: Role,
    pub node_ip: IpAddr,
}

impl Config {
    /// Parse CLI args/env vars, merge an optional `--config` JSON file under
    /// them, and validate the result. `role` is required; a bad port range
    /// is rejected here rather than left to the listener bind to discover.
    pub fn load() -> Result<Self> {
        let clap_config = ClapConfig::parse();
        Self::from_clap(clap_config)
    }

    fn from_clap(clap_config: ClapConfig) -> Result<Self> {
        let file = match &clap_config.config {
            Some(path) => Some(Self::read_file(path)?),
            None => None,
        };

        let port = clap_config
            .port
            .or_else(|| file.as_ref().and_then(|f| f.port))
            .unwrap_or(DEFAULT_PORT);

        if !(1024..=65535).contains(&port) {
            return Err(GatewayError::ClientInput(format!(
                "port {port} is outside the allowed range 1024-65535"
            )));
        }

        let verbose = clap_config.verbose
            || file.as_ref().and_then(|f| f.verbose).unwrap_or(false);

        let auth = clap_config.auth || file.as_ref().and_then(|f| f.auth).unwrap_or(false);

        let ca_cert = clap_config
            .ca_cert
            .or_else(|| file.as_ref().and_then(|f| f.ca_cert.clone()));

        let timeout = clap_config
            .timeout
            .or_else(|| file.as_ref().and_then(|f| f.timeout))
            .unwrap_or(DEFAULT_TIMEOUT);

        let role = clap_config
            .role
            .or_else(|| file.as_ref().and_then(|f| f.role))
            .ok_or_else(|| GatewayError::ClientInput("role is required".into()))?;

        let node_ip = clap_config
            .node_ip
            .or_else(|| file.as_ref().and_then(|f| f.node_ip))
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        Ok(Self {
            port,
            verbose,
            auth,
            ca_cert,
            timeout,
            role,
            node_ip,
        })
    }

    fn read_file(path: &PathBuf) -> Result<ConfigFile> {
        let raw = fs::read_to_string(path).map_err(|e| {
            GatewayError::ClientInput(format!("failed to read config file {path:?}: {e}"))
        })?;

        serde_json::from_str(&raw).map_err(|e| {
            GatewayError::ClientInput(format!("failed to parse config file {path:?}: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_clap() -> ClapConfig {
        ClapConfig {
            port: None,
            verbose: false,
            config: None,
            auth: false,
            ca_cert: None,
            timeout: None,
            role: None,
            node_ip: None,
        }
    }

    #[test]
    fn role_is_required() {
        let clap_config = base_clap();
        assert!(Config::from_clap(clap_config).is_err());
    }

    #[test]
    fn defaults_apply_when_role_is_set() {
        let mut clap_config = base_clap();
        clap_config.role = Some(Role::Agent);

        let config = Config::from_clap(clap_config).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(!config.auth);
    }

    #[test]
    fn rejects_port_outside_allowed_range() {
        let mut clap_config = base_clap();
        clap_config.role = Some(Role::Master);
        clap_config.port = Some(80);

        assert!(Config::from_clap(clap_config).is_err());
    }

    #[test]
    fn cli_wins_over_config_file_defaults() {
        let mut clap_config = base_clap();
        clap_config.role = Some(Role::Agent);
        clap_config.port = Some(9000);

        let config = Config::from_clap(clap_config).unwrap();
        assert_eq!(config.port, 9000);
    }
}
