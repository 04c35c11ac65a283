// src/pipeline/export.rs

use crate::graph_engine::FlowGraph;
use anyhow::{Context, Result};
use std::{fs, path::Path};

/// Écrit le graphe en JSON pour la couche de rendu.
pub fn write_graph_file(path: impl AsRef<Path>, graph: &FlowGraph) -> Result<()> {
    let path = path.as_ref();
    let json_data = serde_json::to_string_pretty(graph)
        .context("Échec de la sérialisation du graphe en JSON")?;
    fs::write(path, json_data)
        .with_context(|| format!("Échec de l'écriture du fichier '{}'", path.display()))?;
    Ok(())
}
