// src/graph_engine/mod.rs

pub mod builder;
pub mod layout;

use crate::{
    data_pipeline::Pool,
    identity::IdentityResolver,
    math::flow_math::{U256, u256_dec},
    state::NodePosition,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{info, warn};

pub use builder::{apply_identities, build_topology};
pub use layout::place_nodes;

pub const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_millis(4000);

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowStats {
    #[serde(with = "u256_dec")]
    pub total_flow_rate: U256,
    /// Nombre de contreparties distinctes, pas d'arêtes.
    pub user_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSummary {
    pub pool_id: String,
    pub admin: Option<String>,
    #[serde(with = "u256_dec")]
    pub total_units: U256,
    #[serde(with = "u256_dec")]
    pub flow_rate: U256,
    #[serde(with = "u256_dec")]
    pub per_unit_flow_rate: U256,
    pub connected_member_count: usize,
    pub flow_rate_label: String,
    pub per_unit_label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Distributor,
    Member,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserNode {
    /// Adresse en minuscules.
    pub id: String,
    pub label: String,
    pub avatar_url: Option<String>,
    pub kind: NodeKind,
    /// Pools distribués par ce compte (vide pour un membre).
    pub pools: Vec<PoolSummary>,
    pub balance: Option<String>,
    pub incoming_flows: FlowStats,
    pub outgoing_flows: FlowStats,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionEdge {
    pub source: String,
    pub target: String,
    pub pool_id: String,
    #[serde(with = "u256_dec")]
    pub flow_rate: U256,
    #[serde(with = "u256_dec")]
    pub units: U256,
    /// Rang de l'arête parmi celles de la même paire ordonnée (ordre de création).
    pub curve_index: usize,
    pub curvature: f64,
    /// Flux nul : l'arête ne représente que l'appartenance.
    pub dashed: bool,
}

/// Vue dérivée, reconstruite entièrement à chaque changement de la collection de pools.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowGraph {
    pub nodes: Vec<UserNode>,
    pub edges: Vec<DistributionEdge>,
}

impl FlowGraph {
    pub fn node(&self, address: &str) -> Option<&UserNode> {
        let address = address.to_lowercase();
        self.nodes.iter().find(|n| n.id == address)
    }

    pub fn distributor_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Distributor).count()
    }

    pub fn member_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Member).count()
    }

    pub fn total_flow_rate(&self) -> U256 {
        self.edges
            .iter()
            .fold(U256::zero(), |acc, e| acc.saturating_add(e.flow_rate))
    }

    pub fn addresses(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct GraphBuildOptions {
    pub decimals: u8,
    pub identity_timeout: Duration,
}

impl Default for GraphBuildOptions {
    fn default() -> Self {
        Self { decimals: 18, identity_timeout: DEFAULT_IDENTITY_TIMEOUT }
    }
}

/// Résultat d'une construction : le graphe et les positions attribuées aux nouveaux nœuds.
#[derive(Debug, Clone)]
pub struct BuiltGraph {
    pub graph: FlowGraph,
    pub new_positions: HashMap<String, NodePosition>,
    pub identities_resolved: bool,
}

/// Pipeline complet du graphe : topologie, identités (bornées par un timeout), positions.
///
/// La résolution tourne dans sa propre tâche : si le timeout expire, le graphe est
/// construit sans identités mais la recherche continue et remplit le cache pour la
/// construction suivante.
pub async fn build_flow_graph(
    pools: &[Pool],
    resolver: &Arc<dyn IdentityResolver>,
    saved_positions: &HashMap<String, NodePosition>,
    options: &GraphBuildOptions,
) -> BuiltGraph {
    let mut rng = StdRng::from_entropy();
    build_flow_graph_with_rng(pools, resolver, saved_positions, options, &mut rng).await
}

pub async fn build_flow_graph_with_rng<R: Rng + Send + ?Sized>(
    pools: &[Pool],
    resolver: &Arc<dyn IdentityResolver>,
    saved_positions: &HashMap<String, NodePosition>,
    options: &GraphBuildOptions,
    rng: &mut R,
) -> BuiltGraph {
    let mut graph = build_topology(pools, options.decimals);

    // Étape 5 : un timeout ou un échec donne simplement "aucune identité".
    let addresses = graph.addresses();
    let lookup = tokio::spawn({
        let resolver = Arc::clone(resolver);
        async move { resolver.resolve(&addresses).await }
    });
    let (identities, identities_resolved) = match tokio::time::timeout(options.identity_timeout, lookup).await {
        Ok(Ok(identities)) => (identities, true),
        Ok(Err(e)) => {
            warn!(error = %e, "[Graphe] Tâche de résolution d'identité interrompue.");
            (HashMap::new(), false)
        }
        Err(_) => {
            warn!(
                timeout_ms = options.identity_timeout.as_millis() as u64,
                "[Graphe] Résolution d'identité trop lente, on continue sans."
            );
            (HashMap::new(), false)
        }
    };

    apply_identities(&mut graph, &identities);
    let new_positions = place_nodes(&mut graph.nodes, saved_positions, rng);

    info!(
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        distributors = graph.distributor_count(),
        members = graph.member_count(),
        identities = identities.len(),
        new_nodes = new_positions.len(),
        "[Graphe] Graphe reconstruit."
    );

    BuiltGraph { graph, new_positions, identities_resolved }
}
