// src/graph_engine/layout.rs

use super::UserNode;
use crate::state::NodePosition;
use rand::Rng;
use std::{collections::HashMap, f64::consts::TAU};

/// Anneau de placement des nouveaux nœuds, à l'extérieur du cluster existant.
pub const INNER_RADIUS: f64 = 600.0;
pub const OUTER_RADIUS: f64 = 1200.0;

/// Position pseudo-aléatoire uniforme (en surface) sur l'anneau.
pub fn random_annulus_position<R: Rng + ?Sized>(rng: &mut R) -> NodePosition {
    let angle = rng.gen_range(0.0..TAU);
    let inner_sq = INNER_RADIUS * INNER_RADIUS;
    let outer_sq = OUTER_RADIUS * OUTER_RADIUS;
    let radius = rng.gen_range(inner_sq..outer_sq).sqrt();
    NodePosition { x: radius * angle.cos(), y: radius * angle.sin() }
}

/// Étape 7 : réutilise la position sauvegardée de chaque nœud, place les autres
/// sur l'anneau. Renvoie uniquement les positions nouvellement attribuées.
pub fn place_nodes<R: Rng + ?Sized>(
    nodes: &mut [UserNode],
    saved: &HashMap<String, NodePosition>,
    rng: &mut R,
) -> HashMap<String, NodePosition> {
    let mut assigned = HashMap::new();
    for node in nodes {
        let position = match saved.get(&node.id) {
            Some(position) => *position,
            None => {
                let position = random_annulus_position(rng);
                assigned.insert(node.id.clone(), position);
                position
            }
        };
        node.x = position.x;
        node.y = position.y;
    }
    assigned
}
