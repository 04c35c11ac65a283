// src/lib.rs

// On déclare tous nos modules principaux pour les rendre publics et
// utilisables par le binaire (flow_watcher.rs) et les tests d'intégration.
pub mod config;
pub mod data_pipeline;
pub mod error;
pub mod graph_engine;
pub mod identity;
pub mod math;
pub mod monitoring;
pub mod pipeline;
pub mod rpc;
pub mod state;
pub mod storage;
