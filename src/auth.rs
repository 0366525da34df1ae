// Authorization Gate, per spec §4.7.
//
// Extracts a bearer token from the request, probes the sandbox's
// `/files/browse` endpoint with it, and either passes through or surfaces
// whatever status the probe returned.

use crate::error::{GatewayError, Result};
use crate::files::FilesApiClient;

/// A bearer token pulled from either the `Authorization` header or the
/// `dcos-acs-auth-cookie` cookie, per §4.5's token table.
#[derive(Debug, Clone)]
pub struct BearerToken(String);

impl BearerToken {
    /// `Authorization: token=<a>.<b>.<c>` or
    /// `Cookie: dcos-acs-auth-cookie=token=<a>.<b>.<c>`: in both cases the
    /// value must start with `token=` and the remainder must be a
    /// three-segment, dot-delimited string.
    pub fn parse(raw: &str) -> Result<Self> {
        let token = raw
            .strip_prefix("token=")
            .ok_or_else(|| GatewayError::Unauthorized("token must start with token=".into()))?;

        if token.split('.').count() != 3 {
            return Err(GatewayError::Unauthorized(
                "token must be a three-segment dot-delimited string".into(),
            ));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_header_value(&self) -> &str {
        &self.0
    }
}

/// Build the sandbox path probed by the gate, per §4.7.
pub fn sandbox_path(
    mesos_id: &str,
    framework_id: &str,
    executor_id: &str,
    container_id: &str,
) -> String {
    format!(
        "/var/lib/mesos/slave/slaves/{mesos_id}/frameworks/{framework_id}/executors/{executor_id}/runs/{container_id}"
    )
}

/// Probe the sandbox's browse endpoint; on success the caller may proceed,
/// otherwise the probe's own status/body are meant to be surfaced to the
/// client (the caller maps this error's variant to that behavior).
pub async fn authorize(client: &FilesApiClient, sandbox_path: &str) -> Result<()> {
    let status = client.probe_browse(sandbox_path).await?;

    if status == surf::StatusCode::Ok {
        return Ok(());
    }

    if status == surf::StatusCode::Unauthorized {
        return Err(GatewayError::Unauthorized(
            "sandbox probe rejected the token".into(),
        ));
    }

    Err(GatewayError::ProbeDenied {
        status: status.into(),
        body: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_token() {
        assert!(BearerToken::parse("token=a.b.c").is_ok());
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(BearerToken::parse("a.b.c").is_err());
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!(BearerToken::parse("token=a.b").is_err());
    }

    #[test]
    fn sandbox_path_matches_expected_shape() {
        let path = sandbox_path("mesos-1", "fw", "exec", "container");
        assert_eq!(
            path,
            "/var/lib/mesos/slave/slaves/mesos-1/frameworks/fw/executors/exec/runs/container"
        );
    }
}
