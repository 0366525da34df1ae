use anyhow::{Context, Result};
use log::{error, info};

mod auth;
mod binder;
mod cluster_state;
mod config;
mod context;
mod cursor;
mod download;
mod error;
mod files;
mod filters;
mod formatter;
mod http_server;
mod journal;
mod model;
mod node_info;
mod streaming;
mod task_resolver;

use config::Config;
use context::AppState;
use http_server::HttpServer;

fn init_logging(verbose: bool) {
    if std::env::var_os("RUST_LOG").is_none() {
        let level = if verbose { "debug" } else { "info" };
        std::env::set_var("RUST_LOG", format!("nodelogd={level}"));
    }

    pretty_env_logger::init();
}

#[async_std::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("{e}"))?;

    init_logging(config.verbose);

    info!(
        "starting nodelogd on port {} as role {:?}",
        config.port, config.role
    );

    let node_id = match config.role {
        config::Role::Master => None,
        config::Role::Agent | config::Role::AgentPublic => {
            let base_url = context::local_base_url(&config);
            match node_info::probe_mesos_id(&base_url, config.timeout).await {
                Ok(id) => Some(id),
                Err(e) => {
                    error!("failed to resolve this node's Mesos agent id: {e}");
                    return Err(anyhow::anyhow!(e)).context("node-info probe failed at startup");
                }
            }
        }
    };

    let port = config.port;
    let state = AppState::new(config, node_id);
    let server = HttpServer::new(state);

    server.listen(port).await.context("HTTP server failed")?;

    info!("nodelogd shutting down cleanly");
    Ok(())
}
