// src/pipeline/mod.rs

pub mod export;
pub mod poller;

pub use export::write_graph_file;
pub use poller::{FlowPoller, PollOutcome};
