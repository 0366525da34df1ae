// Node-info probe, per §4.7/§5.
//
// The Authorization Gate needs this node's own Mesos agent ID to build the
// sandbox path it probes (`/var/lib/mesos/slave/slaves/<mesosID>/...`).
// That ID isn't known until the local agent is asked for it, so the
// gateway probes its own agent's `/state` endpoint once at startup and
// caches the result - the same "probe once, share read-only" treatment
// §5 gives the upstream HTTP client and cluster-state client.

use std::time::Duration;

use async_std::future::timeout;
use serde::Deserialize;

use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, Deserialize)]
struct AgentState {
    id: String,
}

/// Probe `<base_url>/state` for this agent's own Mesos slave ID. Called
/// once at startup; a failure here is a fatal startup error (§6, exit
/// codes), not a per-request one.
pub async fn probe_mesos_id(base_url: &str, probe_timeout: Duration) -> Result<String> {
    let url = format!("{base_url}/state");
    let client = surf::Client::new();

    let mut resp = timeout(probe_timeout, client.get(&url).send())
        .await
        .map_err(|_| GatewayError::Upstream("node-info probe timed out".into()))?
        .map_err(|e| GatewayError::Upstream(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(GatewayError::Upstream(format!(
            "node-info probe returned status {}",
            resp.status()
        )));
    }

    let state: AgentState = resp
        .body_json()
        .await
        .map_err(|e| GatewayError::Upstream(format!("failed to decode agent state: {e}")))?;

    Ok(state.id)
}
