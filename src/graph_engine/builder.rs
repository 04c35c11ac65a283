// src/graph_engine/builder.rs

use super::{DistributionEdge, FlowGraph, FlowStats, NodeKind, PoolSummary, UserNode};
use crate::{
    data_pipeline::{Pool, normalize_address},
    identity::IdentityProfile,
    math::{
        flow_math::{U256, effective_per_unit_flow_rate, member_flow_rate},
        format::{format_flow_rate, format_token_amount, shorten_address},
    },
};
use std::collections::{HashMap, HashSet};

/// Courbure de base des arêtes ; les arêtes répétées entre la même paire
/// alternent de signe et s'écartent progressivement.
pub const BASE_CURVATURE: f64 = 0.2;

/// Courbure de la n-ième arête (0-indexée) entre une même paire ordonnée.
pub fn curvature_for_index(index: usize) -> f64 {
    let magnitude = BASE_CURVATURE * (1 + index / 2) as f64;
    if index % 2 == 0 { magnitude } else { -magnitude }
}

/// Résumé d'un pool attaché à chacun de ses distributeurs.
pub fn summarize_pool(pool: &Pool, decimals: u8) -> PoolSummary {
    let per_unit = effective_per_unit_flow_rate(
        pool.supplied_per_unit_flow_rate(),
        pool.flow_rate(),
        pool.total_units(),
        pool.pool_members.iter().map(|m| m.units()),
    );
    PoolSummary {
        pool_id: pool.address(),
        admin: pool.admin.as_deref().map(normalize_address),
        total_units: pool.total_units(),
        flow_rate: pool.flow_rate(),
        per_unit_flow_rate: per_unit,
        connected_member_count: pool.connected_member_count(),
        flow_rate_label: format_flow_rate(pool.flow_rate(), decimals),
        per_unit_label: format_token_amount(per_unit, decimals),
    }
}

#[derive(Default)]
struct FlowAccumulator {
    incoming_total: U256,
    senders: HashSet<String>,
    outgoing_total: U256,
    receivers: HashSet<String>,
}

/// Construit les nœuds et les arêtes à partir des pools (sans identité ni positions).
///
/// Les nœuds sont créés paresseusement, dans l'ordre où les pools les référencent ;
/// une adresse apparaît une seule fois. Les arêtes sont dirigées distributeur -> membre,
/// une par (pool, distributeur, membre), jamais de boucle sur soi-même.
pub fn build_topology(pools: &[Pool], decimals: u8) -> FlowGraph {
    // Étape 1 : résumés de pools, indexés par adresse de distributeur.
    let mut summaries_by_distributor: HashMap<String, Vec<PoolSummary>> = HashMap::new();
    for pool in pools {
        let summary = summarize_pool(pool, decimals);
        for distributor in pool.distributors() {
            let entry = summaries_by_distributor.entry(distributor.account.address()).or_default();
            if !entry.iter().any(|s| s.pool_id == summary.pool_id) {
                entry.push(summary.clone());
            }
        }
    }

    let mut nodes: Vec<UserNode> = Vec::new();
    let mut node_index: HashMap<String, usize> = HashMap::new();
    let mut edges: Vec<DistributionEdge> = Vec::new();
    let mut pair_counters: HashMap<(String, String), usize> = HashMap::new();
    let mut flows: HashMap<String, FlowAccumulator> = HashMap::new();

    let mut ensure_node = |address: &str, balance: Option<&String>, nodes: &mut Vec<UserNode>| {
        if let Some(&i) = node_index.get(address) {
            if nodes[i].balance.is_none() {
                nodes[i].balance = balance.cloned();
            }
            return;
        }
        let pools = summaries_by_distributor.get(address).cloned().unwrap_or_default();
        let kind = if pools.is_empty() { NodeKind::Member } else { NodeKind::Distributor };
        node_index.insert(address.to_string(), nodes.len());
        nodes.push(UserNode {
            id: address.to_string(),
            label: shorten_address(address),
            avatar_url: None,
            kind,
            pools,
            balance: balance.cloned(),
            incoming_flows: FlowStats::default(),
            outgoing_flows: FlowStats::default(),
            x: 0.0,
            y: 0.0,
        });
    };

    for pool in pools {
        let pool_id = pool.address();
        let per_unit = effective_per_unit_flow_rate(
            pool.supplied_per_unit_flow_rate(),
            pool.flow_rate(),
            pool.total_units(),
            pool.pool_members.iter().map(|m| m.units()),
        );

        // Étape 2 : nœuds des distributeurs.
        let distributor_addresses: Vec<String> = pool
            .distributors()
            .iter()
            .map(|d| {
                let address = d.account.address();
                ensure_node(&address, d.account.balance.as_ref(), &mut nodes);
                address
            })
            .collect();

        // Étape 3 : membres connectés avec des unités, une arête par distributeur.
        for member in pool.pool_members.iter().filter(|m| m.receives_flow()) {
            let target = member.account.address();
            ensure_node(&target, member.account.balance.as_ref(), &mut nodes);

            let units = member.units();
            let flow_rate = member_flow_rate(per_unit, units);

            for source in &distributor_addresses {
                if *source == target {
                    continue;
                }
                let counter = pair_counters.entry((source.clone(), target.clone())).or_insert(0);
                let curve_index = *counter;
                *counter += 1;

                edges.push(DistributionEdge {
                    source: source.clone(),
                    target: target.clone(),
                    pool_id: pool_id.clone(),
                    flow_rate,
                    units,
                    curve_index,
                    curvature: curvature_for_index(curve_index),
                    dashed: flow_rate.is_zero(),
                });

                // Étape 4 : agrégats par direction, contreparties distinctes.
                let incoming = flows.entry(target.clone()).or_default();
                incoming.incoming_total = incoming.incoming_total.saturating_add(flow_rate);
                incoming.senders.insert(source.clone());

                let outgoing = flows.entry(source.clone()).or_default();
                outgoing.outgoing_total = outgoing.outgoing_total.saturating_add(flow_rate);
                outgoing.receivers.insert(target.clone());
            }
        }
    }

    for node in &mut nodes {
        if let Some(acc) = flows.get(&node.id) {
            node.incoming_flows = FlowStats {
                total_flow_rate: acc.incoming_total,
                user_count: acc.senders.len(),
            };
            node.outgoing_flows = FlowStats {
                total_flow_rate: acc.outgoing_total,
                user_count: acc.receivers.len(),
            };
        }
    }

    FlowGraph { nodes, edges }
}

/// Étape 6 : handle et avatar résolus, sinon adresse raccourcie.
pub fn apply_identities(graph: &mut FlowGraph, identities: &HashMap<String, IdentityProfile>) {
    for node in &mut graph.nodes {
        let profile = identities.get(&node.id);
        node.label = profile
            .and_then(|p| p.username.clone())
            .unwrap_or_else(|| shorten_address(&node.id));
        node.avatar_url = profile.and_then(|p| p.avatar_url.clone());
    }
}
