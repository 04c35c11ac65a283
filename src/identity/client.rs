// src/identity/client.rs

use super::{IdentityProfile, IdentityResolver, NormalizedEntry, ProfileCache, normalize_profiles};
use crate::rpc::ResilientHttpClient;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_BATCH_SIZE: usize = 100;
const SINGLE_LOOKUP_CONCURRENCY: usize = 8;

/// Les appels réseau vers l'API d'identité. Chaque méthode renvoie le JSON brut ;
/// la normalisation est faite par le client.
#[async_trait]
pub trait ProfileTransport: Send + Sync {
    /// Recherche groupée via le proxy (la clé d'API est injectée côté serveur).
    async fn proxy_batch(&self, addresses: &[String]) -> Result<Value>;
    /// Recherche groupée directe, avec la clé détenue par le client.
    async fn direct_batch(&self, addresses: &[String]) -> Result<Value>;
    /// Recherche directe d'une seule adresse.
    async fn direct_single(&self, address: &str) -> Result<Value>;
    /// Recherche d'un utilisateur par son handle.
    async fn user_by_handle(&self, handle: &str) -> Result<Value>;
    /// Faux si aucune clé n'est disponible : les replis directs sont alors sautés.
    fn has_direct_access(&self) -> bool;
}

/// Transport HTTP : proxy d'abord, API tierce ensuite.
pub struct HttpProfileTransport {
    http: ResilientHttpClient,
    proxy_url: Option<String>,
    direct_url: String,
    api_key: Option<String>,
}

impl HttpProfileTransport {
    pub fn new(
        http: ResilientHttpClient,
        proxy_url: Option<String>,
        direct_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            http,
            proxy_url: proxy_url.map(|u| u.trim_end_matches('/').to_string()),
            direct_url: direct_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| anyhow!("Aucune clé d'API d'identité configurée"))
    }

    fn parse_body(status: reqwest::StatusCode, body: &str, endpoint: &str) -> Result<Value> {
        if !status.is_success() {
            return Err(anyhow!("Erreur API identité ({}): {} - {}", endpoint, status, body));
        }
        serde_json::from_str(body)
            .with_context(|| format!("Erreur de décodage JSON ({})", endpoint))
    }
}

#[async_trait]
impl ProfileTransport for HttpProfileTransport {
    async fn proxy_batch(&self, addresses: &[String]) -> Result<Value> {
        let proxy = self
            .proxy_url
            .as_deref()
            .ok_or_else(|| anyhow!("Aucun proxy d'identité configuré"))?;
        let url = format!("{}/user/bulk-by-address", proxy);
        let response = self
            .http
            .post_json(&url, &json!({ "addresses": addresses }), &[])
            .await?;
        Self::parse_body(response.status, &response.body, "proxy")
    }

    async fn direct_batch(&self, addresses: &[String]) -> Result<Value> {
        let key = self.api_key()?;
        let url = format!("{}/user/bulk-by-address", self.direct_url);
        let response = self
            .http
            .post_json(&url, &json!({ "addresses": addresses }), &[("x-api-key", key)])
            .await?;
        Self::parse_body(response.status, &response.body, "direct")
    }

    async fn direct_single(&self, address: &str) -> Result<Value> {
        let key = self.api_key()?;
        let url = format!("{}/user/bulk-by-address", self.direct_url);
        let response = self
            .http
            .get(&url, &[("addresses", address)], &[("x-api-key", key)])
            .await?;
        Self::parse_body(response.status, &response.body, "direct-single")
    }

    async fn user_by_handle(&self, handle: &str) -> Result<Value> {
        let handle = handle.trim_start_matches('@');
        if let Some(proxy) = self.proxy_url.as_deref() {
            let url = format!("{}/user/by_username", proxy);
            match self.http.get(&url, &[("username", handle)], &[]).await {
                Ok(response) if response.is_success() => {
                    return Self::parse_body(response.status, &response.body, "proxy-handle");
                }
                Ok(response) => debug!(status = %response.status, "[Identité] Proxy handle en échec."),
                Err(e) => debug!(error = %e, "[Identité] Proxy handle injoignable."),
            }
        }
        let key = self.api_key()?;
        let url = format!("{}/user/by_username", self.direct_url);
        let response = self
            .http
            .get(&url, &[("username", handle)], &[("x-api-key", key)])
            .await?;
        Self::parse_body(response.status, &response.body, "direct-handle")
    }

    fn has_direct_access(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Client de résolution d'identité : cache persistant, lots via le proxy,
/// repli sur l'API directe puis sur des recherches unitaires.
/// Ne renvoie jamais d'erreur.
pub struct IdentityClient {
    transport: Box<dyn ProfileTransport>,
    cache: ProfileCache,
    batch_size: usize,
}

impl IdentityClient {
    pub fn new(transport: Box<dyn ProfileTransport>, cache: ProfileCache, batch_size: usize) -> Self {
        Self { transport, cache, batch_size: batch_size.max(1) }
    }

    /// Résout une liste d'adresses. Les adresses inconnues sont absentes du résultat.
    #[instrument(skip_all, fields(requested = addresses.len()))]
    pub async fn resolve_addresses(&self, addresses: &[String]) -> HashMap<String, IdentityProfile> {
        let mut seen = HashSet::new();
        let requested: Vec<String> = addresses
            .iter()
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty() && seen.insert(a.clone()))
            .collect();
        if requested.is_empty() {
            return HashMap::new();
        }

        let (mut resolved, missing) = self.cache.lookup(&requested);
        if missing.is_empty() {
            return resolved;
        }

        let mut needs_single_lookup: Vec<String> = Vec::new();
        for chunk in missing.chunks(self.batch_size) {
            let (entries, proxy_failed) = self.lookup_batch(chunk).await;
            self.absorb(&entries, &mut resolved);
            if proxy_failed {
                needs_single_lookup.extend(chunk.iter().filter(|a| !resolved.contains_key(*a)).cloned());
            }
        }

        if !needs_single_lookup.is_empty() && self.transport.has_direct_access() {
            let entries = self.lookup_singles(&needs_single_lookup).await;
            self.absorb(&entries, &mut resolved);
        }

        resolved.retain(|address, _| seen.contains(address));
        info!(
            resolved = resolved.len(),
            requested = requested.len(),
            "[Identité] Résolution terminée."
        );
        resolved
    }

    /// Un lot : proxy, puis API directe si le proxy échoue.
    /// Renvoie les profils trouvés et si le proxy a échoué.
    async fn lookup_batch(&self, chunk: &[String]) -> (Vec<NormalizedEntry>, bool) {
        match self.transport.proxy_batch(chunk).await {
            Ok(payload) => return (normalize_profiles(&payload), false),
            Err(e) => warn!(error = %e, size = chunk.len(), "[Identité] Proxy en échec, repli direct."),
        }

        if !self.transport.has_direct_access() {
            return (Vec::new(), true);
        }

        match self.transport.direct_batch(chunk).await {
            Ok(payload) => (normalize_profiles(&payload), true),
            Err(e) => {
                warn!(error = %e, size = chunk.len(), "[Identité] API directe en échec.");
                (Vec::new(), true)
            }
        }
    }

    async fn lookup_singles(&self, addresses: &[String]) -> Vec<NormalizedEntry> {
        stream::iter(addresses.iter().cloned())
            .map(|address| async move {
                match self.transport.direct_single(&address).await {
                    Ok(payload) => normalize_profiles(&payload),
                    Err(e) => {
                        debug!(%address, error = %e, "[Identité] Recherche unitaire en échec.");
                        Vec::new()
                    }
                }
            })
            .buffer_unordered(SINGLE_LOOKUP_CONCURRENCY)
            .concat()
            .await
    }

    fn absorb(&self, entries: &[NormalizedEntry], resolved: &mut HashMap<String, IdentityProfile>) {
        if entries.is_empty() {
            return;
        }
        for entry in entries {
            for address in &entry.addresses {
                resolved.insert(address.clone(), entry.profile.clone());
            }
        }
        self.cache.store_entries(entries);
    }

    /// Recherche par handle (`@alice` ou `alice`). `None` si introuvable ou en cas d'erreur.
    pub async fn lookup_by_handle(&self, handle: &str) -> Option<IdentityProfile> {
        match self.transport.user_by_handle(handle).await {
            Ok(payload) => {
                let entries = normalize_profiles(&payload);
                self.cache.store_entries(&entries);
                entries.into_iter().next().map(|e| e.profile)
            }
            Err(e) => {
                warn!(handle, error = %e, "[Identité] Recherche par handle en échec.");
                None
            }
        }
    }
}

#[async_trait]
impl IdentityResolver for IdentityClient {
    async fn resolve(&self, addresses: &[String]) -> HashMap<String, IdentityProfile> {
        self.resolve_addresses(addresses).await
    }
}
