// src/data_pipeline/mod.rs

// Couche de fetch : le modèle canonique des pools et le client du subgraph.
pub mod subgraph;
pub mod types;

pub use subgraph::{PoolSource, SubgraphClient};
pub use types::{Account, Pool, PoolDistributor, PoolMember, normalize_address};
