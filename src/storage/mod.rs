// src/storage/mod.rs

//! Stockage clé/valeur persistant, injecté dans le cache de snapshots,
//! le store de positions et le cache d'identité.

use crate::error::StorageError;
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::RwLock,
};
use tracing::debug;

pub const SNAPSHOT_KEY: &str = "flow_graph.snapshot";
pub const SNAPSHOT_TIMESTAMP_KEY: &str = "flow_graph.snapshot_timestamp";
pub const NODE_POSITIONS_KEY: &str = "flow_graph.node_positions";
pub const IDENTITY_PROFILES_KEY: &str = "flow_graph.identity_profiles";

/// Contrat minimal d'un stockage persistant. Chaque lecture/écriture peut échouer
/// indépendamment ; les appelants traitent toute erreur comme "pas de valeur".
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
}

/// Stockage en mémoire, utilisé par les tests et comme repli sans disque.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let reader = self.entries.read().ok()?;
        reader.get(key).cloned()
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut writer = self
            .entries
            .write()
            .map_err(|_| StorageError::Unavailable("verrou empoisonné".to_string()))?;
        writer.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Stockage sur disque : un fichier par clé dans un répertoire dédié.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Crée le répertoire si besoin.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!(key, error = %e, "[Stockage] Lecture impossible, valeur absente.");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        // Écriture atomique : fichier temporaire puis renommage.
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(value)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip_and_absence() {
        let store = MemoryStore::new();
        assert!(store.get("missing").is_none());
        store.set("k", b"value").unwrap();
        assert_eq!(store.get("k").unwrap(), b"value".to_vec());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::new(dir.path()).unwrap();
            store.set(SNAPSHOT_KEY, b"{\"pools\":[]}").unwrap();
        }
        let reopened = FileStore::new(dir.path()).unwrap();
        assert_eq!(reopened.get(SNAPSHOT_KEY).unwrap(), b"{\"pools\":[]}".to_vec());
        assert!(reopened.get(NODE_POSITIONS_KEY).is_none());
    }

    #[test]
    fn test_file_store_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.set("a/b:c", b"1").unwrap();
        assert!(dir.path().join("a_b_c.json").exists());
        assert_eq!(store.get("a/b:c").unwrap(), b"1".to_vec());
    }
}
