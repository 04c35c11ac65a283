// src/math/flow_math.rs

use uint::construct_uint;

construct_uint! { pub struct U256(4); }

/// Nombre de secondes dans un "mois" de flux (30 jours), base des labels `/mo`.
pub const SECONDS_PER_MONTH: u64 = 30 * 24 * 60 * 60;

/// Parse un montant entier (flow rate, unités, balance) tel que renvoyé par le subgraph.
/// Ne panique jamais : une chaîne vide, négative ou malformée vaut zéro.
pub fn parse_flow_amount(raw: &str) -> U256 {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return U256::zero();
    }
    U256::from_dec_str(trimmed).unwrap_or_else(|_| U256::zero())
}

/// Variante pour les champs optionnels du subgraph.
pub fn parse_optional_amount(raw: Option<&str>) -> U256 {
    raw.map(parse_flow_amount).unwrap_or_else(U256::zero)
}

/// Division entière qui renvoie zéro au lieu de paniquer sur un dénominateur nul.
pub fn safe_div(numerator: U256, denominator: U256) -> U256 {
    if denominator.is_zero() {
        return U256::zero();
    }
    numerator / denominator
}

/// Multiplication saturée à `U256::MAX`.
pub fn saturating_mul(a: U256, b: U256) -> U256 {
    a.checked_mul(b).unwrap_or(U256::MAX)
}

/// Calcule le flow rate par unité effectif d'un pool.
///
/// Ordre de résolution :
/// 1. la valeur fournie directement par le subgraph si elle est non nulle ;
/// 2. `flow_rate / total_units` si `total_units > 0` ;
/// 3. `flow_rate / somme(units des membres)` sinon ;
/// 4. zéro si aucune base n'est disponible.
pub fn effective_per_unit_flow_rate(
    supplied_per_unit: U256,
    flow_rate: U256,
    total_units: U256,
    member_units: impl IntoIterator<Item = U256>,
) -> U256 {
    if !supplied_per_unit.is_zero() {
        return supplied_per_unit;
    }
    if !total_units.is_zero() {
        return safe_div(flow_rate, total_units);
    }
    let units_sum = member_units
        .into_iter()
        .fold(U256::zero(), |acc, units| acc.saturating_add(units));
    safe_div(flow_rate, units_sum)
}

/// Flow rate reçu par un membre : `per_unit * units`.
pub fn member_flow_rate(per_unit_flow_rate: U256, units: U256) -> U256 {
    saturating_mul(per_unit_flow_rate, units)
}

/// Convertit un flow rate (par seconde) en flux mensuel.
pub fn flow_rate_per_month(flow_rate: U256) -> U256 {
    saturating_mul(flow_rate, U256::from(SECONDS_PER_MONTH))
}

/// Sérialise un `U256` en chaîne décimale (le format des montants côté subgraph et rendu).
pub mod u256_dec {
    use super::{U256, parse_flow_amount};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        Ok(parse_flow_amount(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flow_amount_defaults_to_zero() {
        assert_eq!(parse_flow_amount("1000"), U256::from(1000u64));
        assert_eq!(parse_flow_amount("  42 "), U256::from(42u64));
        assert_eq!(parse_flow_amount(""), U256::zero());
        assert_eq!(parse_flow_amount("-5"), U256::zero());
        assert_eq!(parse_flow_amount("12abc"), U256::zero());
        assert_eq!(parse_flow_amount("1e18"), U256::zero());
        // Plus grand que 2^256 : on retombe sur zéro plutôt que de tronquer.
        let too_big = "9".repeat(90);
        assert_eq!(parse_flow_amount(&too_big), U256::zero());
    }

    #[test]
    fn test_parse_handles_values_beyond_u128() {
        let raw = "340282366920938463463374607431768211456"; // 2^128
        let parsed = parse_flow_amount(raw);
        assert_eq!(parsed.to_string(), raw);
    }

    #[test]
    fn test_safe_div_by_zero() {
        assert_eq!(safe_div(U256::from(10u64), U256::zero()), U256::zero());
        assert_eq!(safe_div(U256::from(10u64), U256::from(3u64)), U256::from(3u64));
    }

    #[test]
    fn test_per_unit_from_member_sum_when_total_units_zero() {
        let per_unit = effective_per_unit_flow_rate(
            U256::zero(),
            U256::from(1000u64),
            U256::zero(),
            vec![U256::from(30u64), U256::from(70u64)],
        );
        assert_eq!(per_unit, U256::from(10u64));
        assert_eq!(member_flow_rate(per_unit, U256::from(30u64)), U256::from(300u64));
        assert_eq!(member_flow_rate(per_unit, U256::from(70u64)), U256::from(700u64));
    }

    #[test]
    fn test_per_unit_prefers_supplied_then_total_units() {
        let supplied = effective_per_unit_flow_rate(
            U256::from(7u64),
            U256::from(1000u64),
            U256::from(10u64),
            Vec::new(),
        );
        assert_eq!(supplied, U256::from(7u64));

        let from_total = effective_per_unit_flow_rate(
            U256::zero(),
            U256::from(1000u64),
            U256::from(10u64),
            vec![U256::from(1u64)],
        );
        assert_eq!(from_total, U256::from(100u64));
    }

    #[test]
    fn test_per_unit_without_any_units_is_zero() {
        let per_unit = effective_per_unit_flow_rate(
            U256::zero(),
            U256::from(1000u64),
            U256::zero(),
            Vec::new(),
        );
        assert!(per_unit.is_zero());
    }

    #[test]
    fn test_multiplication_saturates() {
        assert_eq!(saturating_mul(U256::MAX, U256::from(2u64)), U256::MAX);
    }
}
