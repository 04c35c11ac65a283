// src/bin/flow_watcher.rs

use anyhow::{Context, Result};
use flowgraph::{
    config::AppConfig,
    data_pipeline::SubgraphClient,
    graph_engine::{FlowGraph, GraphBuildOptions},
    identity::{HttpProfileTransport, IdentityClient, ProfileCache},
    monitoring::logging,
    pipeline::{FlowPoller, write_graph_file},
    rpc::ResilientHttpClient,
    state::{PositionStore, SnapshotCache},
    storage::{FileStore, KeyValueStore},
};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    logging::setup_logging();
    let config = AppConfig::load().context("Configuration invalide")?;
    info!(
        subgraph = %config.subgraph_url,
        token = %config.token_address,
        interval_secs = config.poll_interval_secs,
        "[Watcher] Démarrage."
    );

    let store: Arc<dyn KeyValueStore> = Arc::new(
        FileStore::new(&config.storage_dir)
            .with_context(|| format!("Impossible d'ouvrir le stockage '{}'", config.storage_dir))?,
    );
    let http = ResilientHttpClient::new(config.http_max_retries, config.http_retry_delay_ms);

    let transport = HttpProfileTransport::new(
        http.clone(),
        config.identity_proxy_url.clone(),
        config.identity_direct_url.clone(),
        config.identity_api_key.clone(),
    );
    let identity = IdentityClient::new(
        Box::new(transport),
        ProfileCache::new(store.clone()),
        config.identity_batch_size,
    );

    let poller = FlowPoller::new(
        config.subgraph_config(),
        Arc::new(SubgraphClient::new(http, config.include_balances)),
        Arc::new(identity),
        SnapshotCache::new(store.clone()),
        PositionStore::new(store),
        GraphBuildOptions {
            decimals: config.token_decimals,
            identity_timeout: config.identity_timeout(),
        },
    );

    let output_path = config.graph_output_path.clone();
    let mut export = move |graph: &FlowGraph| {
        match write_graph_file(&output_path, graph) {
            Ok(()) => info!(
                path = %output_path,
                nodes = graph.nodes.len(),
                edges = graph.edges.len(),
                "[Watcher] Graphe exporté."
            ),
            Err(e) => error!(error = ?e, "[Watcher] Export du graphe impossible."),
        }
    };

    if poller.bootstrap().await {
        export(&*poller.graph());
    }

    tokio::select! {
        _ = poller.run(config.poll_interval(), &mut export) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("[Watcher] Arrêt demandé.");
        }
    }
    Ok(())
}
