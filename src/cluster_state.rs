// Cluster state lookups backing the Task-ID Resolver, per spec §4.4.
//
// Out of scope per §1 ("cluster-role detection... out of scope: external
// collaborators"), the cluster state service itself is someone else's
// problem; this module is the thin client the resolver drives, probing it
// for a task assumed running, then assumed completed.

use std::time::Duration;

use crate::error::{GatewayError, Result};
use crate::model::CanonicalTaskId;

#[derive(Clone)]
pub struct ClusterStateClient {
    base_url: String,
    client: surf::Client,
    timeout: Duration,
}

impl ClusterStateClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            client: surf::Client::new(),
            timeout,
        }
    }

    pub async fn find_running_task(&self, task_id: &str) -> Result<Option<CanonicalTaskId>> {
        self.query("tasks", task_id).await
    }

    pub async fn find_completed_task(&self, task_id: &str) -> Result<Option<CanonicalTaskId>> {
        self.query("completed_tasks", task_id).await
    }

    async fn query(&self, collection: &str, task_id: &str) -> Result<Option<CanonicalTaskId>> {
        let url = format!("{}/state/{collection}/{task_id}", self.base_url);

        let mut resp =
            match async_std::future::timeout(self.timeout, self.client.get(&url).send()).await {
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) => return Err(GatewayError::Upstream(e.to_string())),
                Err(_) => {
                    return Err(GatewayError::Upstream(
                        "cluster state probe timed out".into(),
                    ))
                }
            };

        if resp.status() == surf::StatusCode::NotFound {
            return Ok(None);
        }

        if !resp.status().is_success() {
            return Err(GatewayError::Upstream(format!(
                "cluster state returned status {}",
                resp.status()
            )));
        }

        let raw: RawTaskTuple = resp
            .body_json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("failed to decode task tuple: {e}")))?;

        Ok(Some(raw.into_canonical(task_id)))
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
struct RawTaskTuple {
    agent_id: String,
    framework_id: String,
    #[serde(default)]
    executor_id: String,
    #[serde(default)]
    container_ids: Vec<String>,
}

impl RawTaskTuple {
    fn into_canonical(self, task_id: &str) -> CanonicalTaskId {
        CanonicalTaskId {
            id: task_id.to_string(),
            agent_id: self.agent_id,
            framework_id: self.framework_id,
            is_pod: !self.executor_id.is_empty(),
            executor_id: self.executor_id,
            container_ids: self.container_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_pod_follows_nonempty_executor() {
        let raw = RawTaskTuple {
            agent_id: "a".to_string(),
            framework_id: "f".to_string(),
            executor_id: "e".to_string(),
            container_ids: vec!["c".to_string()],
        };

        assert!(raw.into_canonical("t").is_pod);
    }

    #[test]
    fn non_pod_when_executor_empty() {
        let raw = RawTaskTuple {
            agent_id: "a".to_string(),
            framework_id: "f".to_string(),
            executor_id: String::new(),
            container_ids: vec!["c".to_string()],
        };

        assert!(!raw.into_canonical("t").is_pod);
    }
}
