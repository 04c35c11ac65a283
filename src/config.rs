// src/config.rs

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_token_decimals() -> u8 { 18 }
fn default_identity_direct_url() -> String { "https://api.neynar.com/v2/farcaster".to_string() }
fn default_identity_batch_size() -> usize { 100 }
fn default_identity_timeout_ms() -> u64 { 4000 }
fn default_poll_interval_secs() -> u64 { 30 }
fn default_storage_dir() -> String { ".flowgraph".to_string() }
fn default_graph_output_path() -> String { "flow_graph.json".to_string() }
fn default_include_balances() -> bool { true }
fn default_http_max_retries() -> u8 { 2 }
fn default_http_retry_delay_ms() -> u64 { 500 }

/// Configuration complète du processus, lue depuis l'environnement (et `.env`).
#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub subgraph_url: String,
    pub token_address: String,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,

    pub identity_proxy_url: Option<String>,
    #[serde(default = "default_identity_direct_url")]
    pub identity_direct_url: String,
    pub identity_api_key: Option<String>,
    #[serde(default = "default_identity_batch_size")]
    pub identity_batch_size: usize,
    #[serde(default = "default_identity_timeout_ms")]
    pub identity_timeout_ms: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
    #[serde(default = "default_graph_output_path")]
    pub graph_output_path: String,
    #[serde(default = "default_include_balances")]
    pub include_balances: bool,

    #[serde(default = "default_http_max_retries")]
    pub http_max_retries: u8,
    #[serde(default = "default_http_retry_delay_ms")]
    pub http_retry_delay_ms: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<AppConfig>()?;
        config.validated()
    }

    /// Variante testable : lit les paires (clé, valeur) au lieu de l'environnement.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, AppConfig>(pairs)?;
        config.validated()
    }

    fn validated(mut self) -> Result<Self> {
        if self.subgraph_url.trim().is_empty() {
            bail!("SUBGRAPH_URL est vide");
        }
        if !is_hex_address(&self.token_address) {
            bail!("TOKEN_ADDRESS invalide: {}", self.token_address);
        }
        self.identity_batch_size = self.identity_batch_size.max(1);
        Ok(self)
    }

    pub fn subgraph_config(&self) -> SubgraphConfig {
        SubgraphConfig {
            subgraph_url: self.subgraph_url.clone(),
            token_address: self.token_address.clone(),
        }
    }

    pub fn identity_timeout(&self) -> Duration {
        Duration::from_millis(self.identity_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// La paire (subgraph, token) sous laquelle un jeu de pools a été récupéré.
/// Un snapshot n'est valide que pour la même paire.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphConfig {
    pub subgraph_url: String,
    pub token_address: String,
}

impl SubgraphConfig {
    pub fn new(subgraph_url: impl Into<String>, token_address: impl Into<String>) -> Self {
        Self {
            subgraph_url: subgraph_url.into(),
            token_address: token_address.into(),
        }
    }

    /// Comparaison insensible à la casse sur les deux champs.
    pub fn matches(&self, other: &SubgraphConfig) -> bool {
        self.subgraph_url.eq_ignore_ascii_case(&other.subgraph_url)
            && self.token_address.eq_ignore_ascii_case(&other.token_address)
    }
}

/// `0x` suivi de 40 caractères hexadécimaux.
pub fn is_hex_address(address: &str) -> bool {
    match address.strip_prefix("0x").or_else(|| address.strip_prefix("0X")) {
        Some(body) => body.len() == 40 && hex::decode(body).is_ok(),
        None => false,
    }
}
