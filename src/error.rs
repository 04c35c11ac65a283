// src/error.rs

use thiserror::Error;

/// Erreurs de la couche de fetch du subgraph. Ce sont les seules erreurs
/// qui remontent jusqu'à l'appelant du cycle de polling.
#[derive(Error, Debug)]
pub enum SubgraphError {
    #[error("Erreur HTTP du subgraph: {status} - {body}")]
    Transport { status: u16, body: String },

    #[error("Erreur réseau vers le subgraph: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Erreur GraphQL du subgraph: {}", .0.join("; "))]
    Query(Vec<String>),

    #[error("Réponse du subgraph sans `data`")]
    EmptyResponse,

    #[error("Erreur de décodage JSON du subgraph: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Erreurs du stockage clé/valeur. Toujours absorbées par les appelants.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Erreur IO du stockage: {0}")]
    Io(#[from] std::io::Error),

    #[error("Erreur de sérialisation du stockage: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Stockage indisponible: {0}")]
    Unavailable(String),
}
