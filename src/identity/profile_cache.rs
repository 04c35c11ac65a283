// src/identity/profile_cache.rs

use super::{IdentityProfile, NormalizedEntry};
use crate::storage::{IDENTITY_PROFILES_KEY, KeyValueStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{debug, warn};

/// Durée de vie d'un profil en cache : ~30 jours.
pub const PROFILE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
    profile: IdentityProfile,
    /// Millisecondes Unix.
    cached_at: i64,
}

impl CacheEntry {
    fn is_valid(&self, ttl: Duration, now_ms: i64) -> bool {
        let age = now_ms.saturating_sub(self.cached_at);
        age >= 0 && (age as u128) < ttl.as_millis()
    }
}

/// Cache persistant adresse -> profil, avec TTL.
#[derive(Clone)]
pub struct ProfileCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl ProfileCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_ttl(store, PROFILE_TTL)
    }

    pub fn with_ttl(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn read_all(&self) -> HashMap<String, CacheEntry> {
        let Some(bytes) = self.store.get(IDENTITY_PROFILES_KEY) else {
            return HashMap::new();
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(error = %e, "[Identité] Cache de profils illisible, ignoré.");
            HashMap::new()
        })
    }

    /// Sépare les adresses en (profils valides en cache, adresses à résoudre).
    pub fn lookup(&self, addresses: &[String]) -> (HashMap<String, IdentityProfile>, Vec<String>) {
        self.lookup_at(addresses, Utc::now().timestamp_millis())
    }

    pub fn lookup_at(
        &self,
        addresses: &[String],
        now_ms: i64,
    ) -> (HashMap<String, IdentityProfile>, Vec<String>) {
        let entries = self.read_all();
        let mut found = HashMap::new();
        let mut missing = Vec::new();
        for address in addresses {
            match entries.get(address) {
                Some(entry) if entry.is_valid(self.ttl, now_ms) => {
                    found.insert(address.clone(), entry.profile.clone());
                }
                _ => missing.push(address.clone()),
            }
        }
        debug!(hits = found.len(), misses = missing.len(), "[Identité] Lecture du cache.");
        (found, missing)
    }

    /// Enregistre chaque profil sous toutes ses adresses. N'échoue jamais.
    pub fn store_entries(&self, new_entries: &[NormalizedEntry]) {
        self.store_entries_at(new_entries, Utc::now().timestamp_millis());
    }

    pub fn store_entries_at(&self, new_entries: &[NormalizedEntry], now_ms: i64) {
        if new_entries.is_empty() {
            return;
        }
        let mut entries = self.read_all();
        // On profite de l'écriture pour purger les entrées expirées.
        entries.retain(|_, entry| entry.is_valid(self.ttl, now_ms));
        for entry in new_entries {
            for address in &entry.addresses {
                entries.insert(
                    address.to_lowercase(),
                    CacheEntry { profile: entry.profile.clone(), cached_at: now_ms },
                );
            }
        }
        let result = serde_json::to_vec(&entries)
            .map_err(crate::error::StorageError::from)
            .and_then(|bytes| self.store.set(IDENTITY_PROFILES_KEY, &bytes));
        if let Err(e) = result {
            warn!(error = %e, "[Identité] Échec de la sauvegarde du cache, ignoré.");
        }
    }
}
