// src/state/mod.rs

// État persistant entre les cycles : snapshot des pools, fusion, positions des nœuds.
pub mod pool_merge;
pub mod position_store;
pub mod snapshot_cache;

pub use pool_merge::{has_changes, merge, pools_equal};
pub use position_store::{NodePosition, PositionStore};
pub use snapshot_cache::{CachedSnapshot, SnapshotCache};
