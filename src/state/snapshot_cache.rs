// src/state/snapshot_cache.rs

use crate::{
    config::SubgraphConfig,
    data_pipeline::Pool,
    error::StorageError,
    storage::{KeyValueStore, SNAPSHOT_KEY, SNAPSHOT_TIMESTAMP_KEY},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Le dernier jeu de pools connu, avec la configuration sous laquelle il a été récupéré.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSnapshot {
    pub pools: Vec<Pool>,
    /// Millisecondes Unix.
    pub cached_at: i64,
    pub config: SubgraphConfig,
}

/// Persistance du snapshot de pools. Toute erreur de stockage est absorbée :
/// une lecture ratée vaut "pas de cache", une écriture ratée est ignorée.
#[derive(Clone)]
pub struct SnapshotCache {
    store: Arc<dyn KeyValueStore>,
}

impl SnapshotCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Renvoie le snapshot si présent, lisible et récupéré sous la même paire
    /// (subgraph, token), comparée sans tenir compte de la casse.
    pub fn load_cached_snapshot(&self, config: &SubgraphConfig) -> Option<CachedSnapshot> {
        let bytes = self.store.get(SNAPSHOT_KEY)?;
        let snapshot: CachedSnapshot = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "[Cache] Snapshot illisible, ignoré.");
                return None;
            }
        };

        if !snapshot.config.matches(config) {
            info!(
                cached_token = %snapshot.config.token_address,
                requested_token = %config.token_address,
                "[Cache] Snapshot d'une autre configuration, ignoré."
            );
            return None;
        }

        debug!(pool_count = snapshot.pools.len(), cached_at = snapshot.cached_at, "[Cache] HIT snapshot.");
        Some(snapshot)
    }

    /// Persiste les pools avec l'horodatage courant. N'échoue jamais.
    pub fn save_snapshot(&self, pools: &[Pool], config: &SubgraphConfig) {
        let snapshot = CachedSnapshot {
            pools: pools.to_vec(),
            cached_at: Utc::now().timestamp_millis(),
            config: config.clone(),
        };
        if let Err(e) = self.write(&snapshot) {
            warn!(error = %e, "[Cache] Échec de la sauvegarde du snapshot, ignoré.");
        }
    }

    /// Horodatage de la dernière sauvegarde réussie, s'il est lisible.
    pub fn last_saved_at(&self) -> Option<i64> {
        let bytes = self.store.get(SNAPSHOT_TIMESTAMP_KEY)?;
        std::str::from_utf8(&bytes).ok()?.trim().parse().ok()
    }

    fn write(&self, snapshot: &CachedSnapshot) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(snapshot)?;
        self.store.set(SNAPSHOT_KEY, &bytes)?;
        self.store
            .set(SNAPSHOT_TIMESTAMP_KEY, snapshot.cached_at.to_string().as_bytes())?;
        debug!(pool_count = snapshot.pools.len(), "[Cache] Snapshot sauvegardé.");
        Ok(())
    }
}
