// Task-ID Resolver, per spec §4.4.
//
// Given a bare task identifier from a `/v2/task/{taskID}` URL, find the
// canonical (agent, framework, executor, container chain) tuple cluster
// state knows it by, trying a running task first and a completed one
// second, and build the agent-scoped redirect target from it.

use crate::cluster_state::ClusterStateClient;
use crate::error::{GatewayError, Result};
use crate::model::CanonicalTaskId;

/// Which auxiliary variant of the v2 task route produced this resolution,
/// since each appends a different tail to the redirect target.
#[derive(Debug, Clone)]
pub enum TaskRouteVariant {
    File(String),
    Browse,
    Download(String),
}

pub async fn resolve(client: &ClusterStateClient, task_id: &str) -> Result<CanonicalTaskId> {
    if let Some(tuple) = client.find_running_task(task_id).await? {
        return Ok(tuple);
    }

    if let Some(tuple) = client.find_completed_task(task_id).await? {
        return Ok(tuple);
    }

    Err(GatewayError::Internal(format!(
        "task {task_id} not found as running or completed"
    )))
}

/// Build the 303 redirect target described in §4.4.
pub fn redirect_target(task: &CanonicalTaskId, variant: &TaskRouteVariant, query: &str) -> String {
    let container_id = task.innermost_container_id().unwrap_or(&task.id);

    let mut path = format!(
        "/system/v1/agent/{}/logs/v2/task/frameworks/{}/executors/{}/runs/{}",
        task.agent_id, task.framework_id, task.executor_id, container_id
    );

    if task.is_pod {
        path.push_str(&format!("/tasks/{}", task.id));
    }

    match variant {
        TaskRouteVariant::File(file) => {
            path.push('/');
            path.push_str(file);
        }
        TaskRouteVariant::Browse => path.push_str("/files/browse"),
        TaskRouteVariant::Download(file) => {
            path.push('/');
            path.push_str(file);
            path.push_str("/download");
        }
    }

    if query.is_empty() {
        path
    } else {
        format!("{path}?{query}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task(is_pod: bool) -> CanonicalTaskId {
        CanonicalTaskId {
            id: "my-task".to_string(),
            agent_id: "agent-1".to_string(),
            framework_id: "fw-1".to_string(),
            executor_id: "exec-1".to_string(),
            container_ids: vec!["outer".to_string(), "inner".to_string()],
            is_pod,
        }
    }

    #[test]
    fn redirect_uses_innermost_container() {
        let target = redirect_target(&sample_task(false), &TaskRouteVariant::Browse, "");
        assert_eq!(
            target,
            "/system/v1/agent/agent-1/logs/v2/task/frameworks/fw-1/executors/exec-1/runs/inner/files/browse"
        );
    }

    #[test]
    fn pod_task_appends_task_segment() {
        let target = redirect_target(
            &sample_task(true),
            &TaskRouteVariant::File("stdout".to_string()),
            "",
        );
        assert!(target.contains("/tasks/my-task/stdout"));
    }

    #[test]
    fn query_string_is_preserved() {
        let target = redirect_target(&sample_task(false), &TaskRouteVariant::Browse, "foo=bar");
        assert!(target.ends_with("?foo=bar"));
    }
}
