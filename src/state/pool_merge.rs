// src/state/pool_merge.rs

//! Réconciliation entre la collection de pools en mémoire et le dernier fetch.
//!
//! Le subgraph n'expose pas de delta : chaque cycle renvoie tout. On compare
//! pool par pool et on ne remplace que ce qui a changé, sans jamais retirer
//! un pool absent du fetch. La collection ne fait que croître sur une session.

use crate::data_pipeline::{Pool, PoolDistributor, PoolMember, normalize_address};
use std::collections::HashMap;

/// Forme comparable d'un pool : adresses en minuscules, sous-collections triées par id.
/// `None` et une liste vide de distributeurs sont équivalents, tout comme
/// `isConnected` absent et `true`.
fn canonical(pool: &Pool) -> Pool {
    let mut members: Vec<PoolMember> = pool
        .pool_members
        .iter()
        .map(|m| {
            let mut m = m.clone();
            m.id = normalize_address(&m.id);
            m.account.id = normalize_address(&m.account.id);
            m.is_connected = Some(m.is_connected());
            m
        })
        .collect();
    members.sort_by(|a, b| a.id.cmp(&b.id));

    let mut distributors: Vec<PoolDistributor> = pool
        .distributors()
        .iter()
        .map(|d| {
            let mut d = d.clone();
            d.id = normalize_address(&d.id);
            d.account.id = normalize_address(&d.account.id);
            d
        })
        .collect();
    distributors.sort_by(|a, b| a.id.cmp(&b.id));

    Pool {
        id: normalize_address(&pool.id),
        admin: pool.admin.as_deref().map(normalize_address),
        total_units: pool.total_units.clone(),
        flow_rate: pool.flow_rate.clone(),
        per_unit_flow_rate: pool.per_unit_flow_rate.clone(),
        pool_members: members,
        pool_distributors: Some(distributors),
    }
}

/// Égalité structurelle, insensible à la casse des adresses et à l'ordre
/// des membres/distributeurs (le subgraph peut les réordonner entre deux polls).
pub fn pools_equal(a: &Pool, b: &Pool) -> bool {
    if !a.id.eq_ignore_ascii_case(&b.id) {
        return false;
    }
    canonical(a) == canonical(b)
}

/// Vrai si un pool entrant est nouveau ou différent de son homologue existant.
/// Un pool qui disparaît du fetch n'est pas un changement.
pub fn has_changes(existing: &[Pool], incoming: &[Pool]) -> bool {
    let index: HashMap<String, &Pool> = existing.iter().map(|p| (p.address(), p)).collect();
    incoming.iter().any(|pool| match index.get(&pool.address()) {
        Some(current) => !pools_equal(current, pool),
        None => true,
    })
}

/// Fusion additive : les pools existants gardent leur position, ceux qui ont changé
/// sont remplacés sur place, les nouveaux sont ajoutés à la fin dans l'ordre du fetch.
/// Les pools absents de `incoming` sont conservés tels quels.
pub fn merge(existing: &[Pool], incoming: &[Pool]) -> Vec<Pool> {
    let mut merged: Vec<Pool> = existing.to_vec();
    let mut positions: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, p)| (p.address(), i))
        .collect();

    for pool in incoming {
        let key = pool.address();
        match positions.get(&key) {
            Some(&i) => {
                if !pools_equal(&merged[i], pool) {
                    merged[i] = pool.clone();
                }
            }
            None => {
                positions.insert(key, merged.len());
                merged.push(pool.clone());
            }
        }
    }

    merged
}
