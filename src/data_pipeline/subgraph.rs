// src/data_pipeline/subgraph.rs

use super::types::{Account, Pool, PoolDistributor, PoolMember};
use crate::{config::SubgraphConfig, error::SubgraphError, rpc::ResilientHttpClient};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

/// Requête de base : tous les pools du token avec un flux par unité positif,
/// leurs distributeurs et leurs membres.
pub const POOLS_QUERY: &str = r#"
query FlowPools($token: String!) {
  pools(first: 1000, where: { token: $token, perUnitFlowRate_gt: "0" }) {
    id
    totalUnits
    flowRate
    perUnitFlowRate
    admin { id }
    poolDistributors(first: 1000) {
      id
      flowRate
      account { id }
    }
    poolMembers(first: 1000) {
      id
      units
      isConnected
      account { id }
    }
  }
}
"#;

/// Variante enrichie : chaque compte embarque son snapshot de solde le plus récent.
pub const POOLS_WITH_BALANCES_QUERY: &str = r#"
query FlowPoolsWithBalances($token: String!) {
  pools(first: 1000, where: { token: $token, perUnitFlowRate_gt: "0" }) {
    id
    totalUnits
    flowRate
    perUnitFlowRate
    admin { id }
    poolDistributors(first: 1000) {
      id
      flowRate
      account {
        id
        accountTokenSnapshots(first: 1, orderBy: updatedAtTimestamp, orderDirection: desc, where: { token: $token }) {
          balanceUntilUpdatedAt
          updatedAtTimestamp
        }
      }
    }
    poolMembers(first: 1000) {
      id
      units
      isConnected
      account {
        id
        accountTokenSnapshots(first: 1, orderBy: updatedAtTimestamp, orderDirection: desc, where: { token: $token }) {
          balanceUntilUpdatedAt
          updatedAtTimestamp
        }
      }
    }
  }
}
"#;

// --- Structures brutes de la réponse GraphQL ---

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<PoolsData>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PoolsData {
    #[serde(default)]
    pools: Vec<RawPool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPool {
    id: String,
    total_units: Option<String>,
    flow_rate: Option<String>,
    per_unit_flow_rate: Option<String>,
    admin: Option<RawId>,
    pool_distributors: Option<Vec<RawDistributor>>,
    #[serde(default)]
    pool_members: Vec<RawMember>,
}

#[derive(Debug, Deserialize)]
struct RawId {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDistributor {
    id: String,
    flow_rate: String,
    account: RawAccount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMember {
    id: String,
    units: String,
    is_connected: Option<bool>,
    account: RawAccount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAccount {
    id: String,
    #[serde(default)]
    account_token_snapshots: Option<Vec<RawBalanceSnapshot>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBalanceSnapshot {
    balance_until_updated_at: Option<String>,
    updated_at_timestamp: Option<String>,
}

impl From<RawAccount> for Account {
    /// Aplatit le snapshot de solde : on garde `balance` / `updatedAtTimestamp`
    /// et on jette l'enveloppe.
    fn from(raw: RawAccount) -> Self {
        let latest = raw
            .account_token_snapshots
            .and_then(|snapshots| snapshots.into_iter().next());
        let (balance, updated_at_timestamp) = match latest {
            Some(s) => (s.balance_until_updated_at, s.updated_at_timestamp),
            None => (None, None),
        };
        Account { id: raw.id, balance, updated_at_timestamp }
    }
}

impl From<RawPool> for Pool {
    fn from(raw: RawPool) -> Self {
        Pool {
            id: raw.id,
            admin: raw.admin.map(|a| a.id),
            total_units: raw.total_units,
            flow_rate: raw.flow_rate,
            per_unit_flow_rate: raw.per_unit_flow_rate,
            pool_members: raw
                .pool_members
                .into_iter()
                .map(|m| PoolMember {
                    id: m.id,
                    account: m.account.into(),
                    units: m.units,
                    is_connected: m.is_connected,
                })
                .collect(),
            pool_distributors: raw.pool_distributors.map(|distributors| {
                distributors
                    .into_iter()
                    .map(|d| PoolDistributor {
                        id: d.id,
                        account: d.account.into(),
                        flow_rate: d.flow_rate,
                    })
                    .collect()
            }),
        }
    }
}

/// Interprète une réponse HTTP du subgraph.
///
/// - statut non 2xx => `Transport`
/// - `errors` non vide (même en 200) => `Query` avec tous les messages
/// - pas de `data` => `EmptyResponse`
pub fn parse_subgraph_response(status: u16, body: &str) -> Result<Vec<Pool>, SubgraphError> {
    if !(200..300).contains(&status) {
        return Err(SubgraphError::Transport { status, body: body.to_string() });
    }

    let response: GraphQlResponse = serde_json::from_str(body)?;

    if let Some(errors) = response.errors.filter(|errors| !errors.is_empty()) {
        return Err(SubgraphError::Query(errors.into_iter().map(|e| e.message).collect()));
    }

    let data = response.data.ok_or(SubgraphError::EmptyResponse)?;
    Ok(data.pools.into_iter().map(Pool::from).collect())
}

/// Construit le corps JSON de la requête GraphQL.
pub fn build_request_body(token_address: &str, include_balances: bool) -> serde_json::Value {
    let query = if include_balances { POOLS_WITH_BALANCES_QUERY } else { POOLS_QUERY };
    json!({
        "query": query,
        "variables": { "token": token_address.to_lowercase() },
    })
}

/// Source de pools pour le cycle de polling. Le trait permet de substituer
/// le subgraph par une source en mémoire dans les tests.
#[async_trait]
pub trait PoolSource: Send + Sync {
    async fn fetch_pools(&self, config: &SubgraphConfig) -> Result<Vec<Pool>, SubgraphError>;
}

/// Client du subgraph : une seule requête POST par cycle, pas de pagination.
#[derive(Clone)]
pub struct SubgraphClient {
    http: ResilientHttpClient,
    include_balances: bool,
}

impl SubgraphClient {
    pub fn new(http: ResilientHttpClient, include_balances: bool) -> Self {
        Self { http, include_balances }
    }
}

#[async_trait]
impl PoolSource for SubgraphClient {
    #[instrument(skip(self, config), fields(token = %config.token_address))]
    async fn fetch_pools(&self, config: &SubgraphConfig) -> Result<Vec<Pool>, SubgraphError> {
        let body = build_request_body(&config.token_address, self.include_balances);
        let response = self.http.post_json(&config.subgraph_url, &body, &[]).await?;

        match parse_subgraph_response(response.status.as_u16(), &response.body) {
            Ok(pools) => {
                info!(pool_count = pools.len(), "[Subgraph] Pools récupérés.");
                Ok(pools)
            }
            Err(e) => {
                warn!(error = %e, "[Subgraph] Échec de la requête.");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY_WITH_BALANCES: &str = r#"{
        "data": {
            "pools": [{
                "id": "0xPool1",
                "totalUnits": "100",
                "flowRate": "1000",
                "perUnitFlowRate": "10",
                "admin": {"id": "0xAdmin"},
                "poolDistributors": [{
                    "id": "d1",
                    "flowRate": "1000",
                    "account": {
                        "id": "0xDist",
                        "accountTokenSnapshots": [
                            {"balanceUntilUpdatedAt": "5000", "updatedAtTimestamp": "1700000000"}
                        ]
                    }
                }],
                "poolMembers": [{
                    "id": "m1",
                    "units": "100",
                    "isConnected": true,
                    "account": {"id": "0xMember", "accountTokenSnapshots": []}
                }]
            }]
        }
    }"#;

    #[test]
    fn test_parse_reshapes_balance_snapshots() {
        let pools = parse_subgraph_response(200, BODY_WITH_BALANCES).unwrap();
        assert_eq!(pools.len(), 1);
        let pool = &pools[0];
        assert_eq!(pool.admin.as_deref(), Some("0xAdmin"));

        let distributor = &pool.distributors()[0];
        assert_eq!(distributor.account.balance.as_deref(), Some("5000"));
        assert_eq!(distributor.account.updated_at_timestamp.as_deref(), Some("1700000000"));

        let member = &pool.pool_members[0];
        assert_eq!(member.account.balance, None);
        assert_eq!(member.is_connected, Some(true));

        // L'enveloppe du snapshot disparaît de la forme canonique.
        let serialized = serde_json::to_string(pool).unwrap();
        assert!(!serialized.contains("accountTokenSnapshots"));
        assert!(serialized.contains("\"balance\":\"5000\""));
    }

    #[test]
    fn test_non_success_status_is_transport_error() {
        let err = parse_subgraph_response(502, "bad gateway").unwrap_err();
        assert!(matches!(err, SubgraphError::Transport { status: 502, .. }));
    }

    #[test]
    fn test_graphql_errors_win_over_status_200() {
        let body = r#"{"data": {"pools": []}, "errors": [{"message": "first"}, {"message": "second"}]}"#;
        match parse_subgraph_response(200, body).unwrap_err() {
            SubgraphError::Query(messages) => assert_eq!(messages, vec!["first", "second"]),
            other => panic!("erreur inattendue: {other:?}"),
        }
    }

    #[test]
    fn test_empty_errors_array_is_ignored() {
        let body = r#"{"data": {"pools": []}, "errors": []}"#;
        assert!(parse_subgraph_response(200, body).unwrap().is_empty());
    }

    #[test]
    fn test_missing_data_is_empty_response() {
        let err = parse_subgraph_response(200, r#"{"data": null}"#).unwrap_err();
        assert!(matches!(err, SubgraphError::EmptyResponse));
        let err = parse_subgraph_response(200, "{}").unwrap_err();
        assert!(matches!(err, SubgraphError::EmptyResponse));
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        let err = parse_subgraph_response(200, "<html>").unwrap_err();
        assert!(matches!(err, SubgraphError::Decode(_)));
    }

    #[test]
    fn test_request_body_lowercases_token() {
        let body = build_request_body("0xABCDEF", false);
        assert_eq!(body["variables"]["token"], "0xabcdef");
        assert!(body["query"].as_str().unwrap().contains("perUnitFlowRate_gt"));
        assert!(!body["query"].as_str().unwrap().contains("accountTokenSnapshots"));

        let enriched = build_request_body("0xABCDEF", true);
        assert!(enriched["query"].as_str().unwrap().contains("accountTokenSnapshots"));
    }
}
