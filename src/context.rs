// Per-request context, per spec §9 ("Configuration objects" design note).
//
// `Config` is built once in `main` and wrapped in this `AppState`, which
// tide hands to every handler as `Request<AppState>::state()`. Nothing here
// mutates after construction - the upstream HTTP client and cluster-state
// client are shared read-only across all request tasks, per §5.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::cluster_state::ClusterStateClient;
use crate::config::{Config, Role};
use crate::files::FilesApiClient;

/// Mesos' well-known agent/master ports. The gateway talks to whichever one
/// its own `role` plays, per §4.7's "agent-or-master-port" wording.
const AGENT_PORT: u16 = 5051;
const MASTER_PORT: u16 = 5050;

/// Render an address for use in a URL authority, bracketing IPv6 per
/// RFC 3986 (`http://[::1]:80`, not `http://::1:80`).
fn host_for_url(ip: &IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{v6}]"),
    }
}

/// The base URL this node's own role-appropriate local Mesos endpoint is
/// reachable at - used both to build the shared `ClusterStateClient` and,
/// at startup, to probe this node's own Mesos agent ID (`node_info.rs`).
pub fn local_base_url(config: &Config) -> String {
    let scheme = if config.auth { "https" } else { "http" };
    let port = match config.role {
        Role::Master => MASTER_PORT,
        Role::Agent | Role::AgentPublic => AGENT_PORT,
    };
    format!("{scheme}://{}:{port}", host_for_url(&config.node_ip))
}

#[derive(Clone)]
pub struct AppState(Arc<Inner>);

struct Inner {
    config: Config,
    cluster_state: ClusterStateClient,
    /// This node's own Mesos agent ID, per §4.7 - resolved once at startup
    /// by `node_info::probe_mesos_id` and `None` when running as `master`
    /// (the master never owns a sandbox to probe).
    node_id: Option<String>,
}

impl AppState {
    pub fn new(config: Config, node_id: Option<String>) -> Self {
        let base_url = local_base_url(&config);
        let cluster_state = ClusterStateClient::new(base_url, config.timeout);

        Self(Arc::new(Inner {
            config,
            cluster_state,
            node_id,
        }))
    }

    /// This node's own Mesos agent ID (§4.7). Only meaningful for
    /// `agent`/`agent_public` roles.
    pub fn node_id(&self) -> Option<&str> {
        self.0.node_id.as_deref()
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    pub fn cluster_state(&self) -> &ClusterStateClient {
        &self.0.cluster_state
    }

    /// Build a files-API client scoped to one agent, carrying the caller's
    /// bearer token (if any) for the upstream request, per §4.5 ("Token
    /// plumbing: extract once at the edge and carry on the request
    /// context").
    pub fn files_client_for(&self, agent_ip: &str, auth_header: Option<String>) -> FilesApiClient {
        let scheme = if self.0.config.auth { "https" } else { "http" };
        let base_url = format!("{scheme}://{agent_ip}:{AGENT_PORT}");
        FilesApiClient::new(base_url, auth_header)
    }

    /// The files client for probes/reads against this node's own agent,
    /// used by the Authorization Gate and by the local `/v1/...` sandbox
    /// routes.
    pub fn local_files_client(&self, auth_header: Option<String>) -> FilesApiClient {
        self.files_client_for(&host_for_url(&self.0.config.node_ip), auth_header)
    }

    pub fn probe_timeout(&self) -> Duration {
        self.0.config.timeout
    }
}
