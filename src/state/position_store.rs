// src/state/position_store.rs

use crate::storage::{KeyValueStore, NODE_POSITIONS_KEY};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
}

/// Coordonnées persistées par adresse de nœud (adresse en minuscules).
/// Les clones partagent le même verrou d'écriture.
#[derive(Clone)]
pub struct PositionStore {
    store: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

impl PositionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store, write_lock: Arc::new(Mutex::new(())) }
    }

    /// Carte vide si absente ou corrompue.
    pub fn load(&self) -> HashMap<String, NodePosition> {
        let Some(bytes) = self.store.get(NODE_POSITIONS_KEY) else {
            return HashMap::new();
        };
        match serde_json::from_slice::<HashMap<String, NodePosition>>(&bytes) {
            Ok(positions) => positions
                .into_iter()
                .filter(|(_, p)| p.x.is_finite() && p.y.is_finite())
                .map(|(k, p)| (k.to_lowercase(), p))
                .collect(),
            Err(e) => {
                warn!(error = %e, "[Positions] Carte illisible, ignorée.");
                HashMap::new()
            }
        }
    }

    /// Fusionne les positions fournies dans la carte persistée et renvoie la carte
    /// complète. La lecture et l'écriture se font sous le même verrou. N'échoue jamais.
    pub fn upsert(&self, positions: &HashMap<String, NodePosition>) -> HashMap<String, NodePosition> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all = self.load();
        if positions.is_empty() {
            return all;
        }
        for (address, position) in positions {
            all.insert(address.to_lowercase(), *position);
        }
        self.save(&all);
        all
    }

    pub fn save(&self, positions: &HashMap<String, NodePosition>) {
        let result = serde_json::to_vec(positions)
            .map_err(crate::error::StorageError::from)
            .and_then(|bytes| self.store.set(NODE_POSITIONS_KEY, &bytes));
        if let Err(e) = result {
            warn!(error = %e, "[Positions] Échec de la sauvegarde, ignoré.");
        }
    }
}
