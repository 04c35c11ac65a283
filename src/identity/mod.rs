// src/identity/mod.rs

//! Résolution adresse -> identité sociale (handle, avatar).
//! Aucune erreur ne remonte à l'appelant : une identité introuvable est simplement absente.

pub mod client;
pub mod normalize;
pub mod profile_cache;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use client::{HttpProfileTransport, IdentityClient, ProfileTransport};
pub use normalize::{NormalizedEntry, normalize_profiles};
pub use profile_cache::ProfileCache;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl IdentityProfile {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.avatar_url.is_none()
    }
}

/// Le graphe ne dépend que de ce trait : tests et binaire injectent leur implémentation.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Carte adresse (minuscules) -> profil. Les adresses non résolues sont absentes.
    async fn resolve(&self, addresses: &[String]) -> HashMap<String, IdentityProfile>;
}

/// Résolveur qui ne résout rien (identité désactivée).
pub struct NoIdentity;

#[async_trait]
impl IdentityResolver for NoIdentity {
    async fn resolve(&self, _addresses: &[String]) -> HashMap<String, IdentityProfile> {
        HashMap::new()
    }
}
