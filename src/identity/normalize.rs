// src/identity/normalize.rs

//! L'API d'identité renvoie selon l'endpoint (et la version) trois formes différentes :
//! - une carte indexée par adresse : `{ "0xabc": [user, ...] }`
//! - un tableau `users` ou `users_by_address`
//! - l'ancienne enveloppe `{ "result": { ... } }`
//!
//! On teste chaque forme dans un ordre fixe et on renvoie une liste vide
//! si aucune ne correspond.

use super::IdentityProfile;
use crate::config::is_hex_address;
use serde_json::{Map, Value};

/// Un profil et toutes les adresses vérifiées qui y mènent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEntry {
    pub addresses: Vec<String>,
    pub profile: IdentityProfile,
}

enum ProfilePayload<'a> {
    Users(&'a [Value]),
    UsersByAddress(&'a [Value]),
    LegacyResult(&'a Value),
    AddressMap(&'a Map<String, Value>),
    Unrecognized,
}

fn classify(payload: &Value) -> ProfilePayload<'_> {
    let Some(object) = payload.as_object() else {
        return ProfilePayload::Unrecognized;
    };
    if let Some(users) = object.get("users").and_then(Value::as_array) {
        return ProfilePayload::Users(users);
    }
    if let Some(users) = object.get("users_by_address").and_then(Value::as_array) {
        return ProfilePayload::UsersByAddress(users);
    }
    if let Some(result) = object.get("result").filter(|r| r.is_object()) {
        return ProfilePayload::LegacyResult(result);
    }
    if !object.is_empty() && object.keys().all(|k| is_hex_address(k)) {
        return ProfilePayload::AddressMap(object);
    }
    ProfilePayload::Unrecognized
}

/// Normalise une réponse de l'API d'identité. Ne panique pas, n'échoue pas.
pub fn normalize_profiles(payload: &Value) -> Vec<NormalizedEntry> {
    normalize_with_depth(payload, 0)
}

fn normalize_with_depth(payload: &Value, depth: u8) -> Vec<NormalizedEntry> {
    match classify(payload) {
        ProfilePayload::Users(users) => users.iter().filter_map(|u| parse_user(u, &[])).collect(),
        ProfilePayload::UsersByAddress(items) => items.iter().filter_map(parse_address_item).collect(),
        ProfilePayload::LegacyResult(result) => {
            // Une seule enveloppe est tolérée.
            if depth > 0 {
                return Vec::new();
            }
            if let Some(user) = result.get("user").filter(|u| u.is_object()) {
                return parse_user(user, &[]).into_iter().collect();
            }
            normalize_with_depth(result, depth + 1)
        }
        ProfilePayload::AddressMap(map) => map
            .iter()
            .flat_map(|(address, value)| {
                let users: Vec<&Value> = match value {
                    Value::Array(items) => items.iter().collect(),
                    Value::Object(_) => vec![value],
                    _ => Vec::new(),
                };
                users
                    .into_iter()
                    .filter_map(|u| parse_user(u, &[address.as_str()]))
                    .collect::<Vec<_>>()
            })
            .collect(),
        ProfilePayload::Unrecognized => Vec::new(),
    }
}

/// Élément de `users_by_address` : soit un user directement, soit `{ address, user }`.
fn parse_address_item(item: &Value) -> Option<NormalizedEntry> {
    match item.get("user") {
        Some(user) if user.is_object() => {
            let address = item.get("address").and_then(Value::as_str);
            parse_user(user, address.as_slice())
        }
        _ => parse_user(item, &[]),
    }
}

fn parse_user(user: &Value, known_addresses: &[&str]) -> Option<NormalizedEntry> {
    let object = user.as_object()?;

    let username = non_empty_str(object.get("username"));
    let avatar_url = non_empty_str(object.get("pfp_url"))
        .or_else(|| non_empty_str(object.get("avatar_url")))
        .or_else(|| non_empty_str(object.get("pfp").and_then(|p| p.get("url"))));
    let profile = IdentityProfile { username, avatar_url };
    if profile.is_empty() {
        return None;
    }

    let mut addresses: Vec<String> = Vec::new();
    let mut push = |raw: &str| {
        let address = raw.trim().to_lowercase();
        if is_hex_address(&address) && !addresses.contains(&address) {
            addresses.push(address);
        }
    };

    for address in known_addresses {
        push(*address);
    }
    if let Some(custody) = object.get("custody_address").and_then(Value::as_str) {
        push(custody);
    }
    if let Some(eth) = object
        .get("verified_addresses")
        .and_then(|v| v.get("eth_addresses"))
        .and_then(Value::as_array)
    {
        eth.iter().filter_map(Value::as_str).for_each(&mut push);
    }
    if let Some(verifications) = object.get("verifications").and_then(Value::as_array) {
        verifications.iter().filter_map(Value::as_str).for_each(&mut push);
    }

    if addresses.is_empty() {
        return None;
    }
    Some(NormalizedEntry { addresses, profile })
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ADDR_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const ADDR_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const ADDR_C: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

    #[test]
    fn test_address_keyed_map() {
        let checksummed = ADDR_A.to_uppercase().replace("0X", "0x");
        let payload = json!({
            checksummed: [
                {"username": "alice", "pfp_url": "https://img/alice.png",
                 "verified_addresses": {"eth_addresses": [ADDR_B]}}
            ]
        });
        let entries = normalize_profiles(&payload);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].addresses, vec![ADDR_A.to_string(), ADDR_B.to_string()]);
        assert_eq!(entries[0].profile.username.as_deref(), Some("alice"));
        assert_eq!(entries[0].profile.avatar_url.as_deref(), Some("https://img/alice.png"));
    }

    #[test]
    fn test_users_array() {
        let payload = json!({
            "users": [
                {"username": "bob", "custody_address": ADDR_C, "verifications": [ADDR_B]},
                {"username": "ghost"}
            ]
        });
        let entries = normalize_profiles(&payload);
        // "ghost" n'a aucune adresse : ignoré.
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].addresses, vec![ADDR_C.to_string(), ADDR_B.to_string()]);
    }

    #[test]
    fn test_users_by_address_with_wrapped_items() {
        let payload = json!({
            "users_by_address": [
                {"address": ADDR_A, "user": {"username": "carol", "avatar_url": "https://img/c.png"}}
            ]
        });
        let entries = normalize_profiles(&payload);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].addresses, vec![ADDR_A.to_string()]);
        assert_eq!(entries[0].profile.avatar_url.as_deref(), Some("https://img/c.png"));
    }

    #[test]
    fn test_legacy_result_wrapper() {
        let payload = json!({
            "result": {
                "users": [{"username": "dave", "pfp": {"url": "https://img/d.png"}, "custody_address": ADDR_A}]
            }
        });
        let entries = normalize_profiles(&payload);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].profile.avatar_url.as_deref(), Some("https://img/d.png"));

        let single = json!({"result": {"user": {"username": "erin", "custody_address": ADDR_B}}});
        assert_eq!(normalize_profiles(&single)[0].profile.username.as_deref(), Some("erin"));
    }

    #[test]
    fn test_unrecognized_shapes_are_empty() {
        assert!(normalize_profiles(&json!(null)).is_empty());
        assert!(normalize_profiles(&json!([1, 2])).is_empty());
        assert!(normalize_profiles(&json!({"message": "rate limited"})).is_empty());
        assert!(normalize_profiles(&json!({})).is_empty());
        // Enveloppes imbriquées au-delà d'un niveau : refusées.
        assert!(normalize_profiles(&json!({"result": {"result": {"users": []}}})).is_empty());
    }

    #[test]
    fn test_profile_without_name_or_avatar_is_skipped() {
        let payload = json!({ADDR_A: [{"fid": 3}]});
        assert!(normalize_profiles(&payload).is_empty());
    }
}
