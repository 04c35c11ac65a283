// src/data_pipeline/types.rs

use crate::math::flow_math::{U256, parse_flow_amount, parse_optional_amount};
use serde::{Deserialize, Serialize};

/// Un compte tel que référencé par un pool, avec son dernier solde connu
/// (uniquement renseigné par la requête enrichie).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at_timestamp: Option<String>,
}

impl Account {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), balance: None, updated_at_timestamp: None }
    }

    pub fn address(&self) -> String {
        normalize_address(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMember {
    pub id: String,
    pub account: Account,
    pub units: String,
    /// Absent côté subgraph = connecté.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_connected: Option<bool>,
}

impl PoolMember {
    pub fn units(&self) -> U256 {
        parse_flow_amount(&self.units)
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected != Some(false)
    }

    /// Seuls les membres connectés avec des unités positives reçoivent un flux.
    pub fn receives_flow(&self) -> bool {
        self.is_connected() && !self.units().is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDistributor {
    pub id: String,
    pub account: Account,
    pub flow_rate: String,
}

impl PoolDistributor {
    pub fn flow_rate(&self) -> U256 {
        parse_flow_amount(&self.flow_rate)
    }
}

/// Entité de distribution : un ou plusieurs distributeurs streament vers des membres
/// au prorata de leurs unités.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_unit_flow_rate: Option<String>,
    #[serde(default)]
    pub pool_members: Vec<PoolMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_distributors: Option<Vec<PoolDistributor>>,
}

impl Pool {
    pub fn address(&self) -> String {
        normalize_address(&self.id)
    }

    pub fn total_units(&self) -> U256 {
        parse_optional_amount(self.total_units.as_deref())
    }

    pub fn flow_rate(&self) -> U256 {
        parse_optional_amount(self.flow_rate.as_deref())
    }

    pub fn supplied_per_unit_flow_rate(&self) -> U256 {
        parse_optional_amount(self.per_unit_flow_rate.as_deref())
    }

    pub fn distributors(&self) -> &[PoolDistributor] {
        self.pool_distributors.as_deref().unwrap_or(&[])
    }

    /// Nombre de membres connectés avec des unités positives.
    pub fn connected_member_count(&self) -> usize {
        self.pool_members.iter().filter(|m| m.receives_flow()).count()
    }
}

/// Forme canonique d'une adresse : minuscules, sans espaces.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}
